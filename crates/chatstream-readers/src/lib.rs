//! Normalization of streaming chat-completion responses.
//!
//! LLM endpoints stream their responses in materially different wire
//! protocols: OpenAI-compatible servers emit one SSE `data:` frame per delta,
//! while Ollama emits newline-delimited whole-message objects with a distinct
//! tool-call encoding. This crate consumes the raw byte stream of either and
//! produces a single provider-agnostic sequence of content increments plus at
//! most one assembled tool invocation, tolerating frames cut mid-JSON and
//! tool arguments fragmented across many frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatstream_readers::{ChatStreamReader, Dialect, ReadDelegate, ReadError};
//!
//! struct Printer;
//!
//! impl ReadDelegate for Printer {
//!     fn on_progress(&mut self, content: &str) {
//!         print!("{content}");
//!     }
//!     fn on_tool_call(&mut self, name: &str) {
//!         eprintln!("tool requested: {name}");
//!     }
//!     fn on_error(&mut self, error: &ReadError) {
//!         eprintln!("read failed: {error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let response = reqwest::Client::new()
//!         .post("http://localhost:11434/api/chat")
//!         .send()
//!         .await?;
//!     let source = chatstream_readers::response_byte_stream(response);
//!     let reader = ChatStreamReader::new(Dialect::for_provider("ollama"));
//!     let result = reader.read(source, &mut Printer).await;
//!     println!("\n[{} in / {} out]", result.input_tokens, result.output_tokens);
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod events;
pub mod framing;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod reader;

pub use assembler::ToolCallAssembler;
pub use events::{read_events, ReadEvent};
pub use framing::ChunkRecombiner;
pub use reader::{response_byte_stream, ChatStreamReader, END_SENTINEL};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire protocol family a provider speaks.
///
/// The variant is chosen once, at construction time, from the configured
/// provider name; everything downstream of [`Dialect::parse_frame`] is
/// provider-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// One SSE `data:` frame per delta, `choices[].delta` shaped, terminated
    /// by the out-of-band `[DONE]` sentinel. Spoken by OpenAI and the many
    /// compatible endpoints (Azure, Mistral, Deepseek, ...).
    OpenAi,
    /// One newline-delimited JSON object per frame carrying the message so
    /// far; `done: true` marks the last frame and carries final usage counts
    /// and any completed tool calls.
    Ollama,
}

impl Dialect {
    /// Map a configured provider name to the dialect it speaks.
    pub fn for_provider(provider: &str) -> Self {
        match provider.trim().to_ascii_lowercase().as_str() {
            "ollama" => Dialect::Ollama,
            // Everything else observed so far serves the OpenAI-compatible
            // delta protocol.
            _ => Dialect::OpenAi,
        }
    }

    /// Interpret one complete frame as a normalized delta.
    ///
    /// Fails closed: text this dialect cannot make sense of yields an empty
    /// delta rather than an error, so one malformed frame cannot abort the
    /// stream.
    pub fn parse_frame(&self, frame: &str) -> ResponseChunk {
        match self {
            Dialect::OpenAi => openai::parse_frame(frame),
            Dialect::Ollama => ollama::parse_frame(frame),
        }
    }

    /// Extract the identity of the first tool call on a delta, if any.
    pub fn parse_tool(&self, chunk: &ResponseChunk) -> Option<ToolCall> {
        match self {
            Dialect::OpenAi => openai::parse_tool(chunk),
            Dialect::Ollama => ollama::parse_tool(chunk),
        }
    }

    /// Extract the incremental argument text the delta carries for the first
    /// tool call, if any.
    pub fn parse_tool_args(&self, chunk: &ResponseChunk) -> Option<ArgumentFragment> {
        match self {
            Dialect::OpenAi => openai::parse_tool_args(chunk),
            Dialect::Ollama => ollama::parse_tool_args(chunk),
        }
    }

    /// Whether `frame` can stand alone as one structured payload, or must be
    /// recombined with its neighbors first.
    pub fn frame_is_complete(&self, frame: &str) -> bool {
        // Both known dialects frame payloads as single JSON documents.
        framing::is_complete_payload(frame)
    }
}

/// Provider-independent increment of a streaming response.
#[derive(Debug, Clone, Default)]
pub struct ResponseChunk {
    /// Content text carried by this delta. `None` when the frame had no
    /// content field at all (role-only deltas and the like).
    pub content: Option<String>,
    /// Partial tool-call information attached to this delta.
    pub tool_calls: Vec<ToolCallFragment>,
    /// Whether the provider marked this frame as the end of the response.
    pub is_end: bool,
    /// Latest-known absolute prompt token count, when reported.
    pub input_tokens: Option<u32>,
    /// Completion tokens attributed to this delta, when reported.
    pub output_tokens: Option<u32>,
}

impl ResponseChunk {
    /// True when the delta carries nothing to route.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tool_calls.is_empty()
    }
}

/// Partial information about one tool call, as attached to a single delta.
#[derive(Debug, Clone, Default)]
pub struct ToolCallFragment {
    /// Which accumulating argument buffer this fragment extends.
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument payload as it appeared on the wire: JSON text for delta-style
    /// providers, possibly an already-structured object for whole-object
    /// providers.
    pub arguments: Option<Value>,
}

/// Incremental argument text for the in-progress tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentFragment {
    /// Positional buffer the text extends; defaults to 0 when the protocol
    /// exposes no ordering.
    pub index: usize,
    pub text: String,
}

/// A fully identified tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Always a JSON object once exposed to callers, never a bare string.
    pub args: Value,
}

/// Terminal outcome of consuming one stream. Returned exactly once per read,
/// on both success and failure paths.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub content: String,
    pub tool: Option<ToolCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Unrecoverable conditions a read can report. Everything else degrades
/// gracefully inside the loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    /// The underlying byte stream failed or was aborted mid-read.
    #[error("chat stream transport failed: {0}")]
    Transport(String),
    /// Accumulated tool-call argument text was not valid JSON at stream end.
    #[error("arguments for tool call '{name}' are not valid JSON: {detail}")]
    ToolArguments { name: String, detail: String },
}

/// Receives the side effects of a stream read, in frame-arrival order.
pub trait ReadDelegate: Send {
    /// Fired for every content-bearing delta while no tool call is active.
    fn on_progress(&mut self, content: &str);
    /// Fired exactly once per stream, the moment a tool call is identified.
    fn on_tool_call(&mut self, name: &str);
    /// Fired at most once per stream, when the read fails irrecoverably.
    fn on_error(&mut self, error: &ReadError);
}
