//! Buffered (non-streaming) response construction.

use super::openai_types::{AssistantMessage, ChatCompletion, ChatUsage, Choice};
use crate::error::Result;
use crate::upstream::DeltaStream;

use futures::StreamExt;

/// Drain the delta stream and wrap the concatenated text in a completion.
///
/// Suspends until the upstream sequence is exhausted; there is no partial
/// result visibility in this mode. Any stream error fails the whole response
/// and discards text accumulated so far.
///
/// # Errors
/// Propagates the first `GatewayError` item the stream yields.
pub async fn aggregate(mut deltas: DeltaStream, model: &str) -> Result<ChatCompletion> {
    let mut full_text = String::new();
    while let Some(delta) = deltas.next().await {
        full_text.push_str(&delta?);
    }
    Ok(completion(full_text, model))
}

fn completion(content: String, model: &str) -> ChatCompletion {
    ChatCompletion {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: "stop".to_string(),
        }],
        usage: ChatUsage::default(),
    }
}
