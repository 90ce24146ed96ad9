//! Chat completions endpoint handler

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap};
use tracing::info;
use uuid::Uuid;

use crate::api::gate::{client_metadata, GateRequest, GateResponse, Handled};
use crate::api::middleware::bearer_credential;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ChatCompletionRequest, ChatCompletionResponse};
use crate::domain::api_key::{ApiKeyPermissions, VerifiedIdentity};
use crate::domain::Clock;
use crate::infrastructure::completion::CompletionBackend;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// POST /v1/chat/completions
///
/// The body is parsed inside the gate so that malformed requests from
/// authenticated callers are rate limited and recorded like any other.
pub async fn create_chat_completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> GateResponse {
    let request = GateRequest::new("POST", CHAT_COMPLETIONS_PATH)
        .with_credential(bearer_credential(&headers))
        .requiring(ApiKeyPermissions::CHAT)
        .with_client(client_metadata(&headers));

    let backend = state.completions.clone();
    let clock = state.clock.clone();

    state
        .gate
        .run(request, move |identity| {
            complete_chat(backend, clock, identity, body)
        })
        .await
}

async fn complete_chat(
    backend: Arc<dyn CompletionBackend>,
    clock: Arc<dyn Clock>,
    identity: VerifiedIdentity,
    body: Bytes,
) -> Result<Handled, ApiError> {
    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;

    if request.messages.is_empty() {
        return Err(ApiError::bad_request("Messages cannot be empty").with_param("messages"));
    }
    if request.stream {
        return Err(ApiError::bad_request("Streaming is not supported").with_param("stream"));
    }

    let request_id = Uuid::new_v4().to_string();
    info!(
        request_id = %request_id,
        owner_id = %identity.owner_id,
        key_id = %identity.key_id,
        model = %request.model,
        backend = backend.name(),
        "Processing chat completion"
    );

    let completion = backend.complete(request.to_completion_request()).await?;
    let response = ChatCompletionResponse::from_completion(
        &completion,
        &request_id,
        clock.now().timestamp(),
        request.max_tokens,
    );
    let body = serde_json::to_value(&response).map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Handled::ok(body).with_tokens(completion.total_tokens()))
}
