use crate::protocol::openai::{ChatCompletionChunk, ChunkDelta};
use crate::protocol::upstream::{UpstreamChoice, UpstreamEvent};

pub const STOP_FINISH_REASON: &str = "stop";
pub const ERROR_FINISH_REASON: &str = "error";

/// Per-request identity stamped onto every outbound chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub request_id: &'a str,
    pub model: &'a str,
}

/// Text carried by one upstream choice.
///
/// Concatenates every `text` item of `delta.contents`; when that is empty,
/// falls back to a string `delta.content`.
#[must_use]
pub fn extract_text(choice: &UpstreamChoice) -> String {
    let text: String = choice
        .contents
        .iter()
        .filter(|item| item.is_text())
        .filter_map(|item| item.content.as_deref())
        .collect();
    if text.is_empty() {
        if let Some(content) = &choice.content {
            return content.clone();
        }
    }
    text
}

/// Map one upstream event onto at most one outbound chunk.
///
/// Events with neither text nor a meaningful finish reason produce nothing.
/// When a chunk is emitted its `finish_reason` is the upstream value as sent,
/// so an empty string next to text goes out as `""`.
#[must_use]
pub fn translate<'a>(event: &UpstreamEvent, ctx: ChunkContext<'a>) -> Option<ChatCompletionChunk<'a>> {
    match event {
        UpstreamEvent::Terminated => Some(ChatCompletionChunk::finish(
            ctx.request_id,
            ctx.model,
            STOP_FINISH_REASON,
        )),
        UpstreamEvent::Delta(choices) => {
            let choice = choices.first()?;
            let text = extract_text(choice);
            if text.is_empty() && !choice.has_finish_reason() {
                return None;
            }
            let delta = ChunkDelta {
                role: None,
                content: (!text.is_empty()).then_some(text),
            };
            Some(ChatCompletionChunk::new(
                ctx.request_id,
                ctx.model,
                delta,
                choice.finish_reason.clone(),
            ))
        }
        UpstreamEvent::Unrecognized => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::upstream::ContentItem;

    const CTX: ChunkContext<'static> = ChunkContext {
        request_id: "chatcmpl-test",
        model: "gpt-4o",
    };

    fn text_item(content: &str) -> ContentItem {
        ContentItem {
            kind: Some("text".into()),
            content: Some(content.into()),
        }
    }

    #[test]
    fn test_terminated_becomes_stop() {
        let chunk = translate(&UpstreamEvent::Terminated, CTX).unwrap();
        assert_eq!(chunk.choices[0].finish_reason, Some("stop".into()));
        assert_eq!(chunk.choices[0].delta, ChunkDelta::default());
        assert_eq!(chunk.id, "chatcmpl-test");
        assert_eq!(chunk.model, "gpt-4o");
    }

    #[test]
    fn test_text_content_without_finish_reason() {
        let event = UpstreamEvent::Delta(vec![UpstreamChoice {
            contents: vec![text_item("hi")],
            ..UpstreamChoice::default()
        }]);
        let chunk = translate(&event, CTX).unwrap();
        assert_eq!(chunk.content(), Some("hi"));
        assert_eq!(chunk.choices[0].finish_reason, None);
        assert_eq!(chunk.choices[0].delta.role, None);
    }

    #[test]
    fn test_empty_event_is_dropped() {
        let event = UpstreamEvent::Delta(vec![UpstreamChoice::default()]);
        assert!(translate(&event, CTX).is_none());
        assert!(translate(&UpstreamEvent::Delta(Vec::new()), CTX).is_none());
        assert!(translate(&UpstreamEvent::Unrecognized, CTX).is_none());
    }

    #[test]
    fn test_non_text_items_are_skipped_and_concatenated() {
        let choice = UpstreamChoice {
            contents: vec![
                text_item("a"),
                ContentItem {
                    kind: Some("tool".into()),
                    content: Some("ignored".into()),
                },
                ContentItem {
                    kind: Some("text".into()),
                    content: None,
                },
                text_item("b"),
            ],
            ..UpstreamChoice::default()
        };
        assert_eq!(extract_text(&choice), "ab");
    }

    #[test]
    fn test_plain_content_fallback() {
        let choice = UpstreamChoice {
            content: Some("plain".into()),
            ..UpstreamChoice::default()
        };
        assert_eq!(extract_text(&choice), "plain");

        let choice = UpstreamChoice {
            contents: vec![text_item("rich")],
            content: Some("plain".into()),
            ..UpstreamChoice::default()
        };
        assert_eq!(extract_text(&choice), "rich");
    }

    #[test]
    fn test_finish_reason_alone_is_emitted() {
        let event = UpstreamEvent::Delta(vec![UpstreamChoice {
            finish_reason: Some("length".into()),
            ..UpstreamChoice::default()
        }]);
        let chunk = translate(&event, CTX).unwrap();
        assert_eq!(chunk.choices[0].finish_reason, Some("length".into()));
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn test_finish_reason_passes_through_verbatim() {
        let event = UpstreamEvent::Delta(vec![UpstreamChoice {
            contents: vec![text_item("tail")],
            finish_reason: Some(serde_json::json!("")),
            ..UpstreamChoice::default()
        }]);
        let chunk = translate(&event, CTX).unwrap();
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "");
        assert_eq!(value["choices"][0]["delta"]["content"], "tail");

        let event = UpstreamEvent::Delta(vec![UpstreamChoice {
            finish_reason: Some(serde_json::json!("")),
            ..UpstreamChoice::default()
        }]);
        assert!(translate(&event, CTX).is_none());
    }

    #[test]
    fn test_only_first_choice_is_used() {
        let event = UpstreamEvent::Delta(vec![
            UpstreamChoice::default(),
            UpstreamChoice {
                contents: vec![text_item("second")],
                ..UpstreamChoice::default()
            },
        ]);
        assert!(translate(&event, CTX).is_none());
    }
}
