use crate::protocol::upstream::UpstreamEvent;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Decode one upstream line.
///
/// Blank lines, comments and anything without the `data: ` prefix are
/// ignored. Malformed JSON is logged and ignored; it never ends the stream.
#[must_use]
pub fn decode_line(line: &str) -> Option<UpstreamEvent> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return Some(UpstreamEvent::Terminated);
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => Some(UpstreamEvent::from_json(&value)),
        Err(err) => {
            tracing::warn!(error = %err, line = payload, "skipping malformed upstream stream line");
            None
        }
    }
}
