use std::sync::Arc;

use alloy::primitives::{Address, U256};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use wallet_runtime::contracts::GREEN_POINTS;
use wallet_runtime::rewards::{self, PointsReason};
use wallet_runtime::WalletError;

use crate::{ApiError, ApiResult, WalletApiState};

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub balance: String,
}

#[derive(Deserialize)]
pub struct IssueRequest {
    pub user: Address,
    /// Decimal string; points are whole units.
    pub amount: String,
    pub reason: PointsReason,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize)]
pub struct IssueResponse {
    pub tx_hash: String,
    pub reason_code: u8,
    pub contract_url: String,
}

pub fn router() -> Router<Arc<WalletApiState>> {
    Router::new()
        .route("/rewards/balance/{address}", get(balance))
        .route("/rewards/issue", post(issue))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError(WalletError::InvalidInput(format!("Invalid address '{raw}': {e}"))))
}

async fn balance(
    State(state): State<Arc<WalletApiState>>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let address = parse_address(&address)?;
    let green_points = state.context.try_get_contract(GREEN_POINTS)?;
    let balance = rewards::points_balance(&green_points, address).await?;
    Ok(Json(BalanceResponse {
        address,
        balance: balance.to_string(),
    }))
}

async fn issue(
    State(state): State<Arc<WalletApiState>>,
    Json(request): Json<IssueRequest>,
) -> ApiResult<IssueResponse> {
    let amount: U256 = request.amount.parse().map_err(|e| {
        ApiError(WalletError::InvalidInput(format!(
            "Invalid amount '{}': {e}",
            request.amount
        )))
    })?;
    let green_points = state.context.try_get_contract(GREEN_POINTS)?;
    let tx_hash = rewards::issue_points(
        &green_points,
        request.user,
        amount,
        request.reason,
        &request.description,
    )
    .await?;

    Ok(Json(IssueResponse {
        tx_hash: tx_hash.to_string(),
        reason_code: request.reason.code(),
        contract_url: state.context.network().contract_url(&green_points.address()),
    }))
}
