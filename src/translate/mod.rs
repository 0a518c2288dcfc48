//! Translation between the OpenAI chat-completions format and the GPT-OSS
//! chatkit wire format.
//!
//! `upstream_types` and `openai_types` define the two wire formats;
//! `response` builds the buffered completion object and `streaming` encodes
//! the chunked SSE form.

pub mod openai_types;
pub mod response;
pub mod streaming;
pub mod upstream_types;
