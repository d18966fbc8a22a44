use axum::{Router, routing::get, extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use crate::WalletApiState;

#[derive(Serialize)]
pub struct ContractInfo {
    pub name: String,
    pub address: String,
    pub explorer_url: String,
    pub functions: Vec<String>,
}

#[derive(Serialize)]
pub struct ContractsResponse {
    pub network: String,
    pub chain_id: u64,
    pub contracts: Vec<ContractInfo>,
}

pub fn router() -> Router<Arc<WalletApiState>> {
    Router::new().route("/contracts", get(list_contracts))
}

async fn list_contracts(State(state): State<Arc<WalletApiState>>) -> Json<ContractsResponse> {
    let network = state.context.network();
    let contracts = state
        .context
        .registry()
        .iter()
        .map(|c| ContractInfo {
            name: c.logical_name.clone(),
            address: c.address.to_string(),
            explorer_url: network.contract_url(&c.address),
            functions: c.interface.functions().map(|f| f.signature()).collect(),
        })
        .collect();

    Json(ContractsResponse {
        network: network.name.clone(),
        chain_id: network.chain_id,
        contracts,
    })
}
