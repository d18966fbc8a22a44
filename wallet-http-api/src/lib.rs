pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use wallet_runtime::SessionContext;

pub use error::{ApiError, ApiResult};

pub struct WalletApiState {
    pub context: Arc<SessionContext>,
}

impl WalletApiState {
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }
}

/// `CORS_ALLOWED_ORIGINS`: comma-separated origins, `*` or unset for any.
pub fn cors_layer() -> CorsLayer {
    let origins = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default();
    if origins == "*" || origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<_> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn build_router(state: Arc<WalletApiState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::session::router())
        .merge(routes::contracts::router())
        .merge(routes::rewards::router())
        .layer(cors_layer())
        .with_state(state)
}
