use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use wallet_runtime::WalletError;

/// Wallet failure rendered as `{kind, message, detail}` with a status per kind.
#[derive(Debug)]
pub struct ApiError(pub WalletError);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WalletError::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::UserRejected(_) => StatusCode::FORBIDDEN,
            WalletError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            WalletError::NetworkMismatch { .. } => StatusCode::CONFLICT,
            WalletError::ContractNotConfigured(_) => StatusCode::NOT_FOUND,
            WalletError::NotConnected => StatusCode::UNAUTHORIZED,
            WalletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WalletError::Rpc { .. }
            | WalletError::InvalidResponse(_)
            | WalletError::HttpError(_) => StatusCode::BAD_GATEWAY,
            WalletError::ConfigError(_)
            | WalletError::StorageError(_)
            | WalletError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "{}", self.0);
        }
        (status, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_status_for_user_facing_kinds() {
        let statuses = [
            ApiError(WalletError::ProviderUnavailable).status(),
            ApiError(WalletError::UserRejected("no".into())).status(),
            ApiError(WalletError::ProviderTimeout {
                method: "eth_requestAccounts".into(),
                secs: 30,
            })
            .status(),
            ApiError(WalletError::NetworkMismatch {
                expected: 296,
                actual: 1,
                reason: "switch failed".into(),
            })
            .status(),
            ApiError(WalletError::ContractNotConfigured("GreenPoints".into())).status(),
        ];
        let unique: std::collections::HashSet<_> = statuses.iter().collect();
        assert_eq!(unique.len(), statuses.len());
    }
}
