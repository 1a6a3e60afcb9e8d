use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::state::AppState;
use crate::stream::{spawn_chunk_stream, StreamOrchestrator};

/// Start the upstream stream on its own task and answer with its SSE body.
///
/// Headers are committed as 200 before the upstream responds; upstream
/// failures travel in-band as an error chunk.
pub(crate) fn respond(
    state: Arc<AppState>,
    upstream_body: Bytes,
    request_id: String,
    model: String,
) -> Response {
    let capacity = state.config.server.stream_channel_capacity;
    let orchestrator = StreamOrchestrator::new(request_id, model);
    let open = async move {
        state
            .transport
            .send_checked(upstream_body)
            .await
            .map(reqwest::Response::bytes_stream)
    };
    let frames = spawn_chunk_stream(open, orchestrator, capacity);
    sse_ok_response(Body::from_stream(frames.map(Ok::<Bytes, Infallible>)))
}

#[inline]
pub(crate) fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
