//! Client for the GPT-OSS chatkit streaming API.
//!
//! [`UpstreamClient::chat_completion`] sends a `threads.create` request and
//! returns the assistant output as an ordered stream of text deltas. A
//! spawned reader task decodes the SSE byte stream and feeds a bounded
//! channel, so a slow inbound client applies backpressure upstream and a
//! dropped receiver cancels the read and closes the connection.

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};
use crate::logging::SharedLogger;
use crate::translate::openai_types::ChatMessage;
use crate::translate::upstream_types::{ThreadCreateEnvelope, UpstreamEvent};

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Ordered sequence of assistant text fragments. A terminal `Err` item means
/// the upstream failed mid-stream; already-yielded fragments stand.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Guard against unbounded buffering on a malformed endless SSE line.
const MAX_LINE_BYTES: usize = 64 * 1024;

const DELTA_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    config: UpstreamConfig,
    logger: SharedLogger,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig, logger: SharedLogger) -> Result<Self> {
        let client = reqwest::Client::builder()
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            logger,
        })
    }

    /// Send the last user message to the upstream and stream back text deltas.
    ///
    /// # Errors
    /// Returns `GatewayError::Upstream` if the request cannot be sent or the
    /// upstream answers with a non-success status. Failures after streaming
    /// has started surface as the final item of the returned stream instead.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream> {
        let user_text = last_user_text(messages);
        let envelope = ThreadCreateEnvelope::from_user_text(user_text);

        self.logger.info(
            "upstream",
            format!("POST {} model={}", self.config.endpoint, model),
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("accept", "text/event-stream")
            .header("x-selected-model", model)
            .header("x-reasoning-effort", "high")
            .header("x-show-reasoning", "true")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| GatewayError::upstream(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            self.logger.warn(
                "upstream",
                format!("Upstream status {}: {}", status, truncate(&body, 300)),
            );
            return Err(GatewayError::upstream(format!(
                "Upstream returned status {}",
                status
            )));
        }

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        let logger = self.logger.clone();
        tokio::spawn(read_deltas(response.bytes_stream(), tx, logger));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Reader task: decode the upstream byte stream line by line and forward
/// text deltas in arrival order. Runs until end-of-stream, a transport
/// error, or the receiver going away.
async fn read_deltas(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>>,
    tx: mpsc::Sender<Result<String>>,
    logger: SharedLogger,
) {
    tokio::pin!(byte_stream);
    let mut lines = LineBuffer::new(MAX_LINE_BYTES);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                logger.error("upstream", format!("Byte stream error: {}", e));
                let _ = tx
                    .send(Err(GatewayError::upstream(format!(
                        "Upstream stream failed: {}",
                        e
                    ))))
                    .await;
                return;
            }
        };

        let complete_lines = match lines.extend(&chunk) {
            Ok(l) => l,
            Err(e) => {
                logger.error("upstream", format!("{}", e));
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for line in complete_lines {
            let Some(delta) = parse_delta_line(&line, &logger) else {
                continue;
            };
            if tx.send(Ok(delta)).await.is_err() {
                // Inbound client disconnected; stop reading. Dropping the
                // byte stream closes the upstream connection.
                logger.info("upstream", "Receiver dropped, aborting read");
                return;
            }
        }
    }

    logger.info("upstream", "Stream completed");
}

/// Extract the text delta from one SSE line, if it carries one.
///
/// Non-`data:` lines, the `[DONE]` sentinel, unparsable JSON, and event
/// shapes without a text delta all return `None`. A parse failure is logged
/// and skipped; it never aborts the stream.
fn parse_delta_line(line: &str, logger: &SharedLogger) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return None;
    }

    let event: UpstreamEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(e) => {
            logger.debug("upstream", format!("Skipping unparseable event: {}", e));
            return None;
        }
    };

    event.into_text_delta()
}

/// SSE frames are newline-delimited but byte chunks may split mid-line, so
/// complete lines are handed out and the trailing fragment is held back.
///
/// The fragment is kept as raw bytes and only complete lines are decoded:
/// a multibyte character split across two network chunks must not be
/// decoded until both halves have arrived.
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl LineBuffer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
        }
    }

    /// Append a byte chunk and return the complete lines it finished,
    /// trimmed, with empty lines dropped.
    ///
    /// # Errors
    /// Fails when the held-back fragment exceeds the line-length bound.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..newline_pos])
                .trim()
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.buf.len() > self.max_line_bytes {
            return Err(GatewayError::upstream(format!(
                "SSE line exceeded {} bytes",
                self.max_line_bytes
            )));
        }

        Ok(lines)
    }
}

fn last_user_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Cut to at most `max` bytes, backing up to a character boundary so the
/// slice never lands inside a multibyte character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> SharedLogger {
        let dir = tempfile::tempdir().unwrap();
        SharedLogger::new(dir.path().join("test.log")).unwrap()
    }

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_last_user_text_picks_last() {
        let messages = vec![
            msg("user", "first"),
            msg("assistant", "reply"),
            msg("user", "second"),
        ];
        assert_eq!(last_user_text(&messages), "second");
    }

    #[test]
    fn test_last_user_text_empty_without_user() {
        let messages = vec![msg("system", "be brief"), msg("assistant", "ok")];
        assert_eq!(last_user_text(&messages), "");
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::new(1024);

        let lines = buf.extend(b"data: {\"a\"").unwrap();
        assert!(lines.is_empty());

        let lines = buf.extend(b":1}\ndata: next\npartial").unwrap();
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: next"]);

        let lines = buf.extend(b" end\n").unwrap();
        assert_eq!(lines, vec!["partial end"]);
    }

    #[test]
    fn test_line_buffer_reassembles_chars_split_across_chunks() {
        let mut buf = LineBuffer::new(1024);
        let bytes = "data: €\n".as_bytes();

        // Split inside the three-byte '€' (bytes 6..9).
        let lines = buf.extend(&bytes[..8]).unwrap();
        assert!(lines.is_empty());

        let lines = buf.extend(&bytes[8..]).unwrap();
        assert_eq!(lines, vec!["data: €"]);
    }

    #[test]
    fn test_line_buffer_drops_blank_lines_and_trims_crlf() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.extend(b"data: x\r\n\r\ndata: y\n").unwrap();
        assert_eq!(lines, vec!["data: x", "data: y"]);
    }

    #[test]
    fn test_line_buffer_bounds_fragment_growth() {
        let mut buf = LineBuffer::new(8);
        assert!(buf.extend(b"short\n").is_ok());

        let err = buf.extend(b"this fragment never ends").unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { .. }));
    }

    #[test]
    fn test_parse_delta_line_extracts_delta() {
        let logger = test_logger();
        let line = r#"data: {"type":"thread.item_updated","update":{"entry":{"type":"assistant_message.content_part.text_delta","delta":"Hel"}}}"#;
        assert_eq!(parse_delta_line(line, &logger).as_deref(), Some("Hel"));
    }

    #[test]
    fn test_parse_delta_line_skips_noise() {
        let logger = test_logger();
        assert_eq!(parse_delta_line("data: [DONE]", &logger), None);
        assert_eq!(parse_delta_line("data: {not json", &logger), None);
        assert_eq!(parse_delta_line(": keep-alive comment", &logger), None);
        assert_eq!(
            parse_delta_line(r#"data: {"type":"thread.created"}"#, &logger),
            None
        );
    }

    #[test]
    fn test_truncate_backs_up_to_char_boundary() {
        // 'a' then 100 three-byte chars puts byte 300 mid-character.
        let body = format!("a{}", "€".repeat(100));
        let cut = truncate(&body, 300);
        assert_eq!(cut.len(), 298);
        assert_eq!(cut.chars().filter(|&c| c == '€').count(), 99);

        assert_eq!(truncate("short", 300), "short");
        assert_eq!(truncate("abcdef", 3), "abc");
    }

    #[test]
    fn test_parse_delta_line_accepts_bare_prefix() {
        let logger = test_logger();
        let line = r#"data:{"type":"thread.item_updated","update":{"type":"assistant_message.content_part.text_delta","delta":"x"}}"#;
        assert_eq!(parse_delta_line(line, &logger).as_deref(), Some("x"));
    }
}
