use std::convert::Infallible;
use std::sync::Arc;

use alloy::primitives::Address;
use axum::{
    Json, Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use wallet_runtime::rewards::{
    mint_authorization_message, now_millis, transfer_authorization_message, verify_signature,
};
use wallet_runtime::{NetworkOutcome, Session, SessionState, WalletError};

use crate::{ApiError, ApiResult, WalletApiState};

pub fn router() -> Router<Arc<WalletApiState>> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
        .route("/session/network", post(ensure_network))
        .route("/session/sign", post(sign))
        .route("/session/events", get(session_events))
}

async fn get_session(State(state): State<Arc<WalletApiState>>) -> Json<Session> {
    Json(state.context.session())
}

async fn connect(State(state): State<Arc<WalletApiState>>) -> ApiResult<Session> {
    Ok(Json(state.context.connect().await?))
}

async fn disconnect(State(state): State<Arc<WalletApiState>>) -> Json<Session> {
    state.context.disconnect();
    Json(state.context.session())
}

#[derive(Serialize)]
pub struct NetworkResponse {
    pub outcome: NetworkOutcome,
    pub session: Session,
}

async fn ensure_network(State(state): State<Arc<WalletApiState>>) -> ApiResult<NetworkResponse> {
    let outcome = state.context.ensure_network().await?;
    Ok(Json(NetworkResponse {
        outcome,
        session: state.context.session(),
    }))
}

// ── Signing ─────────────────────────────────────────────────────────────

/// What to sign. Authorization messages are built server-side with the
/// connected account and the current time.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignRequest {
    Message {
        message: String,
    },
    Mint {
        token_id: String,
        amount: u64,
        recipient: Address,
    },
    Transfer {
        token_id: String,
        to: Address,
        amount: u64,
    },
}

#[derive(Serialize)]
pub struct SignResponse {
    pub address: Address,
    pub message: String,
    pub signature: String,
    pub verified: bool,
}

async fn sign(
    State(state): State<Arc<WalletApiState>>,
    Json(request): Json<SignRequest>,
) -> ApiResult<SignResponse> {
    let signer = state.context.try_signer()?;
    let address = signer.address();
    let message = match request {
        SignRequest::Message { message } => {
            if message.is_empty() {
                return Err(ApiError(WalletError::InvalidInput("Message is empty".into())));
            }
            message
        }
        SignRequest::Mint {
            token_id,
            amount,
            recipient,
        } => mint_authorization_message(&token_id, amount, recipient, now_millis()),
        SignRequest::Transfer {
            token_id,
            to,
            amount,
        } => transfer_authorization_message(&token_id, address, to, amount, now_millis()),
    };

    let signature = signer.sign_message(&message).await?;
    let verified = verify_signature(&message, &signature, address)?;
    if !verified {
        tracing::warn!(%address, "Wallet signature does not recover to the connected account");
    }
    Ok(Json(SignResponse {
        address,
        message,
        signature,
        verified,
    }))
}

// ── SSE ─────────────────────────────────────────────────────────────────

async fn session_events(
    State(state): State<Arc<WalletApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.context.subscribe())
        .map(|session| Ok::<_, Infallible>(session_event(&session)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn session_event(state: &SessionState) -> Event {
    let event = Event::default().event("session");
    match serde_json::to_string(&state.snapshot()) {
        Ok(data) => event.data(data),
        Err(e) => {
            tracing::error!("Failed to serialize session snapshot: {e}");
            event.data("{}")
        }
    }
}
