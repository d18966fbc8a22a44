use axum::{Router, routing::get, extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use crate::WalletApiState;

pub fn router() -> Router<Arc<WalletApiState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<WalletApiState>>) -> Json<Value> {
    let network = state.context.network();
    Json(json!({
        "status": "ok",
        "provider_detected": state.context.provider_detected(),
        "network": network.name,
        "chain_id": network.chain_id,
    }))
}
