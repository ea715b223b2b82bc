//! Accumulates the single in-progress tool invocation of a response stream
//! and merges its fragmented argument text at stream end.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{ReadError, ToolCall};

/// Tracks at most one tool invocation per stream.
///
/// Providers can report several parallel tool calls in one payload; only the
/// first is tracked. Argument text is appended to positional buffers and
/// parsed exactly once, at finalization, since fragments are rarely valid
/// JSON on their own.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    current: Option<ToolCall>,
    buffers: Vec<String>,
}

/// Finalization failure: the accumulated argument text could not be parsed.
/// Carries the tool as identified so callers can still report best-effort
/// state.
#[derive(Debug)]
pub struct ToolFinalizeError {
    pub partial: ToolCall,
    pub error: ReadError,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tool call has been identified on this stream.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// The tool as identified so far, args not yet finalized.
    pub fn partial(&self) -> Option<ToolCall> {
        self.current.clone()
    }

    /// Begin tracking an identified tool call. Later identifications are
    /// ignored; the first tool call per stream wins.
    pub fn begin(&mut self, tool: ToolCall) {
        if self.current.is_none() {
            debug!(tool = %tool.name, "tool call identified");
            self.current = Some(tool);
        }
    }

    /// Append incremental argument text to the buffer at `index`, creating
    /// intermediate buffers on first reference.
    pub fn push_fragment(&mut self, index: usize, text: &str) {
        if index >= self.buffers.len() {
            self.buffers.resize(index + 1, String::new());
        }
        self.buffers[index].push_str(text);
    }

    /// Parse each non-empty positional buffer and deep-merge the results into
    /// the tool's arguments, later positions winning on overlapping keys.
    ///
    /// Accumulated text that is not valid JSON at this point is surfaced as
    /// an error, never silently defaulted.
    pub fn finalize(self) -> Result<Option<ToolCall>, ToolFinalizeError> {
        let Some(mut tool) = self.current else {
            return Ok(None);
        };

        let mut merged: Option<Value> = None;
        for buffer in self.buffers.iter().filter(|b| !b.is_empty()) {
            let parsed: Value = match serde_json::from_str(buffer) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let error = ReadError::ToolArguments {
                        name: tool.name.clone(),
                        detail: e.to_string(),
                    };
                    return Err(ToolFinalizeError {
                        partial: tool,
                        error,
                    });
                }
            };
            merged = Some(match merged {
                Some(base) => merge_values(base, parsed),
                None => parsed,
            });
        }

        if let Some(args) = merged {
            // Exposed args are always an object; a scalar payload collapses
            // to empty rather than leaking a bare value.
            tool.args = match args {
                Value::Object(map) => Value::Object(map),
                other => {
                    debug!(tool = %tool.name, "non-object argument payload: {}", other);
                    Value::Object(Map::new())
                }
            };
        }

        if tool.args.as_object().map_or(true, |map| map.is_empty()) {
            warn!(tool = %tool.name, "tool call finalized with empty arguments");
        }
        Ok(Some(tool))
    }
}

/// Recursive object merge; `overlay` wins on conflicts. Non-object values,
/// arrays included, replace wholesale.
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
