//! Delta-style dialect: OpenAI-compatible chat completion streams, one SSE
//! frame per `choices[].delta` increment. Stream end is signaled out-of-band
//! by the `[DONE]` sentinel, so frames here never mark `is_end` themselves.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{ArgumentFragment, ResponseChunk, ToolCall, ToolCallFragment};

pub(crate) fn parse_frame(frame: &str) -> ResponseChunk {
    let parsed: OpenAIStreamFrame = match serde_json::from_str(frame) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("unparseable delta frame: {} - data: {}", e, frame);
            return ResponseChunk::default();
        }
    };

    let mut chunk = ResponseChunk::default();

    // Usage arrives once, on a trailing frame, when the caller asked for
    // `stream_options.include_usage`.
    if let Some(usage) = parsed.usage {
        chunk.input_tokens = Some(usage.prompt_tokens);
        chunk.output_tokens = Some(usage.completion_tokens);
    }

    let Some(choice) = parsed.choices.into_iter().next() else {
        return chunk;
    };

    chunk.content = choice.delta.content;
    if let Some(calls) = choice.delta.tool_calls {
        chunk.tool_calls = calls
            .into_iter()
            .map(|call| ToolCallFragment {
                index: call.index.unwrap_or(0),
                id: call.id,
                name: call.function.as_ref().and_then(|f| f.name.clone()),
                arguments: call
                    .function
                    .and_then(|f| f.arguments)
                    .map(Value::String),
            })
            .collect();
    }

    chunk
}

/// The first delta of a tool call carries its id and name; later deltas only
/// extend the argument text. Identification waits for a fragment with a name.
pub(crate) fn parse_tool(chunk: &ResponseChunk) -> Option<ToolCall> {
    let first = chunk.tool_calls.first()?;
    let name = first.name.clone()?;
    Some(ToolCall {
        id: first.id.clone().unwrap_or_default(),
        name,
        // Arguments stream in separately; start from an empty object.
        args: Value::Object(serde_json::Map::new()),
    })
}

pub(crate) fn parse_tool_args(chunk: &ResponseChunk) -> Option<ArgumentFragment> {
    if chunk.is_end {
        return None;
    }
    let first = chunk.tool_calls.first()?;
    let text = match &first.arguments {
        Some(Value::String(text)) => text.clone(),
        Some(structured) => structured.to_string(),
        None => String::new(),
    };
    Some(ArgumentFragment {
        index: first.index,
        text,
    })
}

// Streaming wire structures
#[derive(Debug, Deserialize)]
struct OpenAIStreamFrame {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAIDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta() {
        let chunk =
            parse_frame(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#);
        assert_eq!(chunk.content.as_deref(), Some("Hello"));
        assert!(chunk.tool_calls.is_empty());
        assert!(!chunk.is_end);
    }

    #[test]
    fn role_only_delta_is_empty() {
        let chunk = parse_frame(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#);
        assert!(chunk.is_empty());
    }

    #[test]
    fn first_tool_call_delta_identifies_the_tool() {
        let chunk = parse_frame(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"search","arguments":""}}]}}]}"#,
        );
        let tool = parse_tool(&chunk).unwrap();
        assert_eq!(tool.id, "call_9");
        assert_eq!(tool.name, "search");
        assert_eq!(tool.args, serde_json::json!({}));
    }

    #[test]
    fn continuation_delta_yields_argument_text_but_no_identity() {
        let chunk = parse_frame(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]}}]}"#,
        );
        assert!(parse_tool(&chunk).is_none());
        let fragment = parse_tool_args(&chunk).unwrap();
        assert_eq!(fragment.index, 0);
        assert_eq!(fragment.text, "{\"q\":");
    }

    #[test]
    fn usage_frame_carries_token_counts() {
        let chunk = parse_frame(
            r#"{"choices":[],"usage":{"prompt_tokens":120,"completion_tokens":48,"total_tokens":168}}"#,
        );
        assert_eq!(chunk.input_tokens, Some(120));
        assert_eq!(chunk.output_tokens, Some(48));
        assert!(chunk.is_empty());
    }

    #[test]
    fn garbage_fails_closed() {
        let chunk = parse_frame("not json at all");
        assert!(chunk.is_empty());
        assert!(!chunk.is_end);
    }

    #[test]
    fn wrong_shape_fails_closed() {
        let chunk = parse_frame(r#"{"unrelated":true}"#);
        assert!(chunk.is_empty());
    }
}
