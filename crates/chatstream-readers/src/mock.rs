#![allow(dead_code)]
//! Scriptable byte streams and a recording delegate for exercising the read
//! loop without a live provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use chatstream_readers::mock::{RecordingDelegate, StreamScript};
//!
//! let source = StreamScript::new()
//!     .sse(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#)
//!     .sse(r#"{"choices":[{"delta":{"content":" world"}}]}"#)
//!     .done()
//!     .into_stream();
//! ```

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures_util::stream;

use crate::{ReadDelegate, ReadError};

/// Builder for a scripted byte stream: raw blocks, SSE `data:` lines,
/// newline-delimited JSON lines, and injected transport errors, delivered in
/// script order.
#[derive(Debug, Default)]
pub struct StreamScript {
    blocks: Vec<Result<Bytes>>,
}

impl StreamScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte block exactly as given, no framing added.
    pub fn block(mut self, text: &str) -> Self {
        self.blocks.push(Ok(Bytes::copy_from_slice(text.as_bytes())));
        self
    }

    /// Append a block of raw bytes, for exercising UTF-8 boundary handling.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.blocks.push(Ok(Bytes::copy_from_slice(bytes)));
        self
    }

    /// Append one SSE `data:` line carrying `payload`.
    pub fn sse(self, payload: &str) -> Self {
        self.block(&format!("data: {payload}\n\n"))
    }

    /// Append one newline-delimited JSON line.
    pub fn ndjson(self, payload: &str) -> Self {
        self.block(&format!("{payload}\n"))
    }

    /// Append the `[DONE]` sentinel frame.
    pub fn done(self) -> Self {
        self.sse("[DONE]")
    }

    /// Inject a transport error at this point in the script.
    pub fn error(mut self, message: &str) -> Self {
        self.blocks.push(Err(anyhow!("{message}")));
        self
    }

    pub fn into_stream(self) -> stream::Iter<std::vec::IntoIter<Result<Bytes>>> {
        stream::iter(self.blocks)
    }
}

/// Captures delegate callbacks in arrival order for assertions.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    pub progress: Vec<String>,
    pub tools: Vec<String>,
    pub errors: Vec<ReadError>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// All progress increments joined, for comparing against a final result.
    pub fn content(&self) -> String {
        self.progress.concat()
    }
}

impl ReadDelegate for RecordingDelegate {
    fn on_progress(&mut self, content: &str) {
        self.progress.push(content.to_string());
    }

    fn on_tool_call(&mut self, name: &str) {
        self.tools.push(name.to_string());
    }

    fn on_error(&mut self, error: &ReadError) {
        self.errors.push(error.clone());
    }
}
