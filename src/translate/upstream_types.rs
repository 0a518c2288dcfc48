//! Wire types for the GPT-OSS chatkit API.
//!
//! Outbound: the `threads.create` envelope. The upstream schema insists on
//! receiving the user text in three redundant shapes at once (plain `text`,
//! structured `content` parts, and empty `quoted_text`/`attachments`
//! placeholders), so the envelope carries all of them.
//!
//! Inbound: the SSE event payloads. Only `thread.item_updated` events whose
//! entry is an `assistant_message.content_part.text_delta` carry usable text;
//! every other shape deserializes into a catch-all variant and is ignored.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Outbound request envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ThreadCreateEnvelope {
    pub op: &'static str,
    pub params: ThreadParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadParams {
    pub input: ThreadInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadInput {
    pub text: String,
    pub content: Vec<InputContentPart>,
    pub quoted_text: String,
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InputContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
}

impl ThreadCreateEnvelope {
    pub fn from_user_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            op: "threads.create",
            params: ThreadParams {
                input: ThreadInput {
                    text: text.clone(),
                    content: vec![InputContentPart::InputText { text }],
                    quoted_text: String::new(),
                    attachments: Vec::new(),
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound SSE event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "thread.item_updated")]
    ThreadItemUpdated {
        #[serde(default)]
        update: Option<ItemUpdate>,
    },
    #[serde(other)]
    Other,
}

/// The upstream sends item updates in two shapes: the entry nested under an
/// `entry` key, or the entry object directly as the update itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemUpdate {
    Wrapped { entry: UpdateEntry },
    Direct(UpdateEntry),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpdateEntry {
    #[serde(rename = "assistant_message.content_part.text_delta")]
    TextDelta { delta: String },
    #[serde(other)]
    Other,
}

impl UpstreamEvent {
    /// The text delta carried by this event, if it is a content event.
    pub fn into_text_delta(self) -> Option<String> {
        match self {
            UpstreamEvent::ThreadItemUpdated {
                update: Some(update),
            } => update.into_entry().into_text_delta(),
            _ => None,
        }
    }
}

impl ItemUpdate {
    fn into_entry(self) -> UpdateEntry {
        match self {
            ItemUpdate::Wrapped { entry } => entry,
            ItemUpdate::Direct(entry) => entry,
        }
    }
}

impl UpdateEntry {
    fn into_text_delta(self) -> Option<String> {
        match self {
            UpdateEntry::TextDelta { delta } => Some(delta),
            UpdateEntry::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = ThreadCreateEnvelope::from_user_text("hello");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["op"], "threads.create");
        assert_eq!(json["params"]["input"]["text"], "hello");
        assert_eq!(json["params"]["input"]["content"][0]["type"], "input_text");
        assert_eq!(json["params"]["input"]["content"][0]["text"], "hello");
        assert_eq!(json["params"]["input"]["quoted_text"], "");
        assert_eq!(
            json["params"]["input"]["attachments"],
            serde_json::json!([])
        );
    }

    #[test]
    fn test_wrapped_text_delta() {
        let event: UpstreamEvent = serde_json::from_str(
            r#"{"type":"thread.item_updated","update":{"entry":{"type":"assistant_message.content_part.text_delta","delta":"Hi"}}}"#,
        )
        .unwrap();
        assert_eq!(event.into_text_delta().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_direct_text_delta() {
        let event: UpstreamEvent = serde_json::from_str(
            r#"{"type":"thread.item_updated","update":{"type":"assistant_message.content_part.text_delta","delta":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(event.into_text_delta().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_non_delta_entry_ignored() {
        let event: UpstreamEvent = serde_json::from_str(
            r#"{"type":"thread.item_updated","update":{"entry":{"type":"assistant_message.reasoning","text":"thinking"}}}"#,
        )
        .unwrap();
        assert_eq!(event.into_text_delta(), None);
    }

    #[test]
    fn test_other_event_type_ignored() {
        let event: UpstreamEvent =
            serde_json::from_str(r#"{"type":"thread.created","thread":{"id":"t_1"}}"#).unwrap();
        assert_eq!(event.into_text_delta(), None);
    }

    #[test]
    fn test_update_missing_is_ignored() {
        let event: UpstreamEvent =
            serde_json::from_str(r#"{"type":"thread.item_updated"}"#).unwrap();
        assert_eq!(event.into_text_delta(), None);
    }
}
