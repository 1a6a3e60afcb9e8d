use std::time::Instant;

use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;

use crate::error::GatewayError;
use crate::observability::log_request_complete;
use crate::observability::token_counter::approximate_usage;
use crate::protocol::openai::{ChatCompletionResponse, Usage};
use crate::protocol::upstream::extract_message_content;
use crate::state::AppState;

/// Make one upstream call and wrap its message in a completion response.
///
/// A body that is not JSON, or has no `choices[0].message`, still yields a
/// 200 whose content describes the problem.
pub(crate) async fn respond(
    state: &AppState,
    upstream_body: Bytes,
    request_id: String,
    model: String,
    prompt_tokens: u64,
) -> Result<Response, GatewayError> {
    let start = Instant::now();
    let response = state.transport.send_checked(upstream_body).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Transport(format!("failed to read upstream body: {e}")))?;

    let (content, usage) = completion_from_body(&body, prompt_tokens);
    log_request_complete(&request_id, &model, &usage, start);
    Ok(Json(ChatCompletionResponse::assistant(request_id, model, content, usage)).into_response())
}

pub(crate) fn completion_from_body(body: &[u8], prompt_tokens: u64) -> (String, Usage) {
    match extract_message_content(body) {
        Ok(content) => {
            let usage = approximate_usage(prompt_tokens, Some(&content));
            (content, usage)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to decode upstream JSON response");
            (
                format!("Error: failed to decode upstream JSON response. {err}"),
                approximate_usage(prompt_tokens, None),
            )
        }
    }
}
