//! OpenAI chat-completion wire types exposed to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::unix_now_secs;

pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";
pub const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const ASSISTANT_ROLE: &str = "assistant";

/// A single conversation message as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// `content` is either a plain string or an array of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ChatMessage {
    /// Flatten the message content into plain text.
    ///
    /// Array content keeps only `text` parts, concatenated in order.
    #[must_use]
    pub fn text_content(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter(|part| part.type_ == "text")
                .filter_map(|part| part.text.as_deref())
                .collect(),
        }
    }
}

/// `OpenAI` Chat Completion request wire type.
///
/// Tuning fields are accepted with whatever JSON the client sends; the
/// upstream agent does not take them, so they are never read or forwarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatRequest {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Token usage. Counts are whitespace-split word estimates, not tokenizer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Assistant message in a non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// `OpenAI` Chat Completion response wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    #[must_use]
    pub fn assistant(id: String, model: String, content: String, usage: Usage) -> Self {
        Self {
            id,
            object: CHAT_COMPLETION_OBJECT.to_string(),
            created: unix_now_secs(),
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: ASSISTANT_ROLE.to_string(),
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A choice within a stream chunk. `finish_reason` always serializes,
/// as `null` when absent. It is a raw value so an upstream reason passes
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<Value>,
}

/// One outbound streaming chunk, borrowing the per-request id and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatCompletionChunk<'a> {
    pub id: &'a str,
    pub object: &'static str,
    pub created: u64,
    pub model: &'a str,
    pub choices: Vec<ChunkChoice>,
}

impl<'a> ChatCompletionChunk<'a> {
    #[must_use]
    pub fn new(
        id: &'a str,
        model: &'a str,
        delta: ChunkDelta,
        finish_reason: Option<Value>,
    ) -> Self {
        Self {
            id,
            object: CHAT_COMPLETION_CHUNK_OBJECT,
            created: unix_now_secs(),
            model,
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// The leading chunk announcing the assistant role.
    #[must_use]
    pub fn role_announcement(id: &'a str, model: &'a str) -> Self {
        Self::new(
            id,
            model,
            ChunkDelta {
                role: Some(ASSISTANT_ROLE),
                content: None,
            },
            None,
        )
    }

    /// An empty-delta chunk carrying only a finish reason.
    #[must_use]
    pub fn finish(id: &'a str, model: &'a str, reason: &str) -> Self {
        Self::new(id, model, ChunkDelta::default(), Some(reason.into()))
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

impl ModelList {
    #[must_use]
    pub fn from_catalog(models: &[String], created: u64) -> Self {
        Self {
            object: "list".to_string(),
            data: models
                .iter()
                .map(|id| ModelEntry {
                    id: id.clone(),
                    object: "model".to_string(),
                    created,
                    owned_by: "system".to_string(),
                })
                .collect(),
        }
    }
}
