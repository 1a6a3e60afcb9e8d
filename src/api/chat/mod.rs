use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;

use crate::error::{into_axum_response, GatewayError};
use crate::observability::token_counter::estimate_prompt_tokens;
use crate::protocol::openai::ChatRequest;
use crate::protocol::upstream::UpstreamRequest;
use crate::state::AppState;

pub(crate) mod non_streaming;
pub(crate) mod streaming;

pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    match handler_inner(state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err),
    }
}

pub(crate) fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid JSON request body: {e}")))
}

async fn handler_inner(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, GatewayError> {
    state.authenticate(headers)?;
    let request = parse_chat_request(body)?;
    let model = state.resolve_model(request.model.as_deref())?;
    let request_id = state.next_request_id();

    let payload = UpstreamRequest::from_chat(&state.config.upstream.agent_id, &request);
    let stream = payload.stream;
    let prompt_tokens = estimate_prompt_tokens(payload.message_texts());
    let upstream_body = serde_json::to_vec(&payload)
        .map(Bytes::from)
        .map_err(|e| GatewayError::Internal(format!("failed to encode upstream request: {e}")))?;
    tracing::debug!(
        request_id = request_id.as_str(),
        model = model.as_str(),
        stream,
        messages = payload.messages.len(),
        "dispatching chat completion"
    );

    if stream {
        Ok(streaming::respond(state, upstream_body, request_id, model))
    } else {
        non_streaming::respond(&state, upstream_body, request_id, model, prompt_tokens).await
    }
}
