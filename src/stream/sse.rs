/// Outbound SSE framing for OpenAI-style chunk streams.
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// The literal termination frame as bytes.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

/// Serialize `payload` straight into a `data: <json>\n\n` frame.
///
/// Returns `None` (after logging) if serialization fails.
#[must_use]
pub fn json_sse_frame<T: Serialize>(payload: &T) -> Option<Bytes> {
    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(b"data: ");
    let mut writer = buf.writer();
    if let Err(err) = serde_json::to_writer(&mut writer, payload) {
        tracing::error!(error = %err, "failed to serialize stream chunk");
        return None;
    }
    let mut buf = writer.into_inner();
    buf.put_slice(b"\n\n");
    Some(buf.freeze())
}
