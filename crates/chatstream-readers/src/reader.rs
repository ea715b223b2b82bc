//! The stream read loop: pulls byte blocks, extracts frames, recombines
//! split payloads, adapts them through the configured dialect, and routes
//! each normalized delta into content or tool accumulation.

use anyhow::Result;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, error, trace};

use crate::assembler::ToolCallAssembler;
use crate::framing::{decode_utf8_block, split_frames, ChunkRecombiner};
use crate::{Dialect, ReadDelegate, ReadError, ReadResult, ResponseChunk};

/// Literal frame that ends a delta-style stream, independent of any dialect.
pub const END_SENTINEL: &str = "[DONE]";

/// Drives reads of streaming chat responses for a fixed dialect.
///
/// The reader itself holds no per-stream state; every [`ChatStreamReader::read`]
/// call owns a fresh working set, so one reader can serve concurrent reads.
#[derive(Debug, Clone, Copy)]
pub struct ChatStreamReader {
    dialect: Dialect,
}

/// Working set of a single read call.
struct ReaderState {
    content: String,
    input_tokens: u32,
    output_tokens: u32,
    assembler: ToolCallAssembler,
    recombiner: ChunkRecombiner,
    frame_index: usize,
}

impl ReaderState {
    fn new() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            assembler: ToolCallAssembler::new(),
            recombiner: ChunkRecombiner::new(),
            frame_index: 0,
        }
    }
}

impl ChatStreamReader {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn for_provider(provider: &str) -> Self {
        Self::new(Dialect::for_provider(provider))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Consume `source` to exhaustion and return the assembled result.
    ///
    /// Never fails past this boundary: transport errors and argument
    /// corruption are reported once through `delegate.on_error` and reflected
    /// in a best-effort partial result.
    pub async fn read<S>(&self, mut source: S, delegate: &mut dyn ReadDelegate) -> ReadResult
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        let mut state = ReaderState::new();

        if let Err(err) = self.pump(&mut source, &mut state, delegate).await {
            error!("stream read failed: {}", err);
            delegate.on_error(&err);
            // No argument finalization on the failure path; the tool is
            // returned as identified.
            return ReadResult {
                tool: state.assembler.partial(),
                content: state.content,
                input_tokens: state.input_tokens,
                output_tokens: state.output_tokens,
            };
        }

        let tool = match state.assembler.finalize() {
            Ok(tool) => tool,
            Err(failure) => {
                error!("tool argument finalization failed: {}", failure.error);
                delegate.on_error(&failure.error);
                Some(failure.partial)
            }
        };

        ReadResult {
            tool,
            content: state.content,
            input_tokens: state.input_tokens,
            output_tokens: state.output_tokens,
        }
    }

    /// Pull loop. Returns on sentinel, source exhaustion, or transport error.
    async fn pump<S>(
        &self,
        source: &mut S,
        state: &mut ReaderState,
        delegate: &mut dyn ReadDelegate,
    ) -> Result<(), ReadError>
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        let mut byte_buffer: Vec<u8> = Vec::new();

        while let Some(block) = source.next().await {
            let block = block.map_err(|e| ReadError::Transport(e.to_string()))?;
            byte_buffer.extend_from_slice(&block);

            let Some(text) = decode_utf8_block(&mut byte_buffer) else {
                continue;
            };

            for frame in split_frames(&text) {
                if frame == END_SENTINEL {
                    debug!("received end-of-stream sentinel");
                    return Ok(());
                }

                let recombined;
                let frame = if !self.dialect.frame_is_complete(frame) {
                    let (combined, complete) = state.recombiner.recombine(frame);
                    if !complete {
                        continue;
                    }
                    recombined = combined;
                    recombined.as_str()
                } else {
                    frame
                };

                let chunk = self.dialect.parse_frame(frame);
                self.route(chunk, state, delegate);
            }
        }

        debug!(frames = state.frame_index, "byte stream exhausted");
        Ok(())
    }

    /// Route one normalized delta: token accounting for every delta, then
    /// either the tool path or the content path, never both.
    fn route(&self, chunk: ResponseChunk, state: &mut ReaderState, delegate: &mut dyn ReadDelegate) {
        // Input counts are reported as the latest absolute value; output
        // counts are incremental and summed.
        if let Some(input) = chunk.input_tokens {
            state.input_tokens = input;
        }
        if let Some(output) = chunk.output_tokens {
            state.output_tokens += output;
        }

        if chunk.is_empty() {
            return;
        }

        if !state.assembler.is_active() {
            if let Some(tool) = self.dialect.parse_tool(&chunk) {
                delegate.on_tool_call(&tool.name);
                state.assembler.begin(tool);
            }
        }

        if state.assembler.is_active() {
            if let Some(fragment) = self.dialect.parse_tool_args(&chunk) {
                trace!(
                    frame = state.frame_index,
                    position = fragment.index,
                    "tool argument fragment"
                );
                state.assembler.push_fragment(fragment.index, &fragment.text);
            }
        } else if let Some(content) = &chunk.content {
            state.content.push_str(content);
            delegate.on_progress(content);
        }

        state.frame_index += 1;
    }
}

/// Adapt an HTTP response body into the byte-block stream [`ChatStreamReader::read`]
/// consumes. Building and authenticating the request stays with the caller.
pub fn response_byte_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Bytes>> + Unpin {
    response
        .bytes_stream()
        .map(|block| block.map_err(anyhow::Error::from))
}
