//! Streaming response encoding.
//!
//! [`ChunkEncoder`] turns text deltas into OpenAI `chat.completion.chunk`
//! objects; [`stream_chunks`] drives it over a delta stream and appends the
//! terminal stop chunk and the `[DONE]` sentinel.

use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use crate::error::Result;
use crate::logging::SharedLogger;
use crate::upstream::DeltaStream;

use futures::{Stream, StreamExt};

/// The sentinel data payload ending every streamed response.
pub const DONE_FRAME: &str = "[DONE]";

/// Builds the chunk frames for one response. The id and timestamp are
/// generated once and reused across every frame of the response.
#[derive(Debug)]
pub struct ChunkEncoder {
    id: String,
    created: i64,
    model: String,
}

impl ChunkEncoder {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
        }
    }

    /// One chunk carrying a content delta, `finish_reason: null`.
    pub fn content_chunk(&self, content: &str) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                content: Some(content.to_string()),
            },
            None,
        )
    }

    /// The terminal chunk: empty delta, `finish_reason: "stop"`.
    pub fn finish_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some("stop".to_string()))
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

/// Translate a delta stream into SSE data payloads: one serialized chunk per
/// delta, then the stop chunk, then `[DONE]`.
///
/// An error from the source terminates the output with an `Err` item; no
/// further frames (and no `[DONE]`) follow it.
pub fn stream_chunks(
    deltas: DeltaStream,
    model: &str,
    logger: SharedLogger,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    let encoder = ChunkEncoder::new(model);

    async_stream::stream! {
        let mut deltas = deltas;

        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    match serde_json::to_string(&encoder.content_chunk(&delta)) {
                        Ok(json) => yield Ok(json),
                        Err(e) => {
                            logger.error("stream", format!("Chunk serialization failed: {}", e));
                            yield Err(e.into());
                            return;
                        }
                    }
                }
                Err(e) => {
                    logger.error("stream", format!("Upstream failed mid-stream: {}", e));
                    yield Err(e);
                    return;
                }
            }
        }

        match serde_json::to_string(&encoder.finish_chunk()) {
            Ok(json) => yield Ok(json),
            Err(e) => {
                logger.error("stream", format!("Chunk serialization failed: {}", e));
                yield Err(e.into());
                return;
            }
        }
        yield Ok(DONE_FRAME.to_string());

        logger.info("stream", "Stream completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use futures::stream;

    fn test_logger() -> SharedLogger {
        let dir = tempfile::tempdir().unwrap();
        SharedLogger::new(dir.path().join("test.log")).unwrap()
    }

    fn delta_stream(items: Vec<Result<String>>) -> DeltaStream {
        Box::pin(stream::iter(items))
    }

    fn collect(deltas: DeltaStream, model: &str) -> Vec<Result<String>> {
        let s = stream_chunks(deltas, model, test_logger());
        tokio_test::block_on(s.collect::<Vec<_>>())
    }

    #[test]
    fn test_one_frame_per_delta_then_stop_then_done() {
        let frames = collect(
            delta_stream(vec![Ok("Hel".to_string()), Ok("lo".to_string())]),
            "gpt-oss-120b",
        );

        assert_eq!(frames.len(), 4);
        let payloads: Vec<String> = frames.into_iter().map(|f| f.unwrap()).collect();

        let first: ChatCompletionChunk = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("Hel"));
        assert_eq!(first.choices[0].finish_reason, None);
        assert_eq!(first.model, "gpt-oss-120b");

        let second: ChatCompletionChunk = serde_json::from_str(&payloads[1]).unwrap();
        assert_eq!(second.choices[0].delta.content.as_deref(), Some("lo"));

        let stop: ChatCompletionChunk = serde_json::from_str(&payloads[2]).unwrap();
        assert_eq!(stop.choices[0].delta.content, None);
        assert_eq!(stop.choices[0].finish_reason.as_deref(), Some("stop"));

        assert_eq!(payloads[3], DONE_FRAME);
    }

    #[test]
    fn test_id_is_stable_across_frames() {
        let frames = collect(
            delta_stream(vec![Ok("a".to_string()), Ok("b".to_string())]),
            "gpt-oss-20b",
        );

        let ids: Vec<String> = frames[..3]
            .iter()
            .map(|f| {
                let chunk: ChatCompletionChunk =
                    serde_json::from_str(f.as_ref().unwrap()).unwrap();
                chunk.id
            })
            .collect();

        assert!(ids[0].starts_with("chatcmpl-"));
        assert!(ids.iter().all(|id| id == &ids[0]));
    }

    #[test]
    fn test_empty_stream_still_terminates() {
        let frames = collect(delta_stream(vec![]), "gpt-oss-120b");
        assert_eq!(frames.len(), 2);

        let stop: ChatCompletionChunk =
            serde_json::from_str(frames[0].as_ref().unwrap()).unwrap();
        assert_eq!(stop.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(frames[1].as_ref().unwrap(), DONE_FRAME);
    }

    #[test]
    fn test_error_ends_stream_without_done() {
        let frames = collect(
            delta_stream(vec![
                Ok("partial".to_string()),
                Err(GatewayError::upstream("reset")),
            ]),
            "gpt-oss-120b",
        );

        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(GatewayError::Upstream { .. })));
    }
}
