//! CodeGPT agent wire shapes: the outbound request payload, the streaming
//! event union and non-streaming content extraction.
//!
//! The upstream schema is loose, so events are read field by field from a
//! `serde_json::Value` rather than through a strict derive. Missing or
//! mistyped fields are treated as absent.

use serde::Serialize;
use serde_json::Value;

use super::openai::ChatRequest;

pub const UPSTREAM_FORMAT: &str = "json";

/// Content substituted when a non-streaming body has no `choices[0].message`.
pub const MISSING_CONTENT_PLACEHOLDER: &str =
    "Error: unable to extract content from upstream response.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage<'a> {
    pub role: &'a str,
    pub content: String,
}

/// Body POSTed to the agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamRequest<'a> {
    #[serde(rename = "agentId")]
    pub agent_id: &'a str,
    pub messages: Vec<UpstreamMessage<'a>>,
    pub format: &'static str,
    pub stream: bool,
}

impl<'a> UpstreamRequest<'a> {
    /// Build the agent payload, flattening every message to plain text.
    #[must_use]
    pub fn from_chat(agent_id: &'a str, request: &'a ChatRequest) -> Self {
        Self {
            agent_id,
            messages: request
                .messages
                .iter()
                .map(|m| UpstreamMessage {
                    role: m.role.as_str(),
                    content: m.text_content(),
                })
                .collect(),
            format: UPSTREAM_FORMAT,
            stream: request.is_stream(),
        }
    }

    pub fn message_texts(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.content.as_str())
    }
}

/// One element of `delta.contents`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentItem {
    pub kind: Option<String>,
    pub content: Option<String>,
}

impl ContentItem {
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind.as_deref() == Some("text")
    }
}

/// A single upstream stream choice with only the fields translation reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamChoice {
    pub contents: Vec<ContentItem>,
    /// `delta.content`, kept only when it is a string.
    pub content: Option<String>,
    /// `finish_reason` exactly as sent; only `null` counts as absent.
    pub finish_reason: Option<Value>,
}

impl UpstreamChoice {
    /// Whether the finish reason should force a chunk out. Empty strings,
    /// `false` and zero carry no reason.
    #[must_use]
    pub fn has_finish_reason(&self) -> bool {
        self.finish_reason.as_ref().is_some_and(is_truthy)
    }

    fn from_value(value: &Value) -> Self {
        let delta = value.get("delta");
        let contents = delta
            .and_then(|d| d.get("contents"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| ContentItem {
                        kind: string_field(item, "type"),
                        content: item.get("content").and_then(scalar_text),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let content = delta.and_then(|d| string_field(d, "content"));
        let finish_reason = value.get("finish_reason").filter(|r| !r.is_null()).cloned();
        Self {
            contents,
            content,
            finish_reason,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text of a content item. Numbers and `true` are rendered as text; falsy
/// scalars, objects and arrays contribute nothing.
fn scalar_text(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(_) => Some("true".to_string()),
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// A decoded upstream stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// The upstream signalled completion (`[DONE]` or `{"done": true}`).
    Terminated,
    Delta(Vec<UpstreamChoice>),
    Unrecognized,
}

impl UpstreamEvent {
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        if value.get("done").and_then(Value::as_bool) == Some(true) {
            return Self::Terminated;
        }
        match value.get("choices").and_then(Value::as_array) {
            Some(choices) => Self::Delta(choices.iter().map(UpstreamChoice::from_value).collect()),
            None => Self::Unrecognized,
        }
    }
}

/// Pull `choices[0].message.content` out of a non-streaming body.
///
/// A body that decodes but lacks a first choice with a message yields
/// [`MISSING_CONTENT_PLACEHOLDER`]; a present message with no string content
/// yields an empty string.
///
/// # Errors
///
/// Returns the decode error when `body` is not JSON.
pub fn extract_message_content(body: &[u8]) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;
    let message = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .filter(|message| !message.is_null());
    Ok(match message {
        Some(message) => message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        None => MISSING_CONTENT_PLACEHOLDER.to_owned(),
    })
}
