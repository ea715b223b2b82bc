//! Whole-object dialect: Ollama chat streams, one newline-delimited JSON
//! object per frame carrying the entire message so far. The final frame sets
//! `done: true` and carries usage counts plus any completed tool calls,
//! either as a `tool_calls` array or the older single `function` field.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{ArgumentFragment, ResponseChunk, ToolCall, ToolCallFragment};

pub(crate) fn parse_frame(frame: &str) -> ResponseChunk {
    let parsed: OllamaStreamFrame = match serde_json::from_str(frame) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("unparseable chat frame: {} - data: {}", e, frame);
            return ResponseChunk::default();
        }
    };

    let content = Some(
        parsed
            .message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap_or_default(),
    );

    if !parsed.done {
        return ResponseChunk {
            content,
            ..Default::default()
        };
    }

    ResponseChunk {
        content,
        tool_calls: parsed.message.map(completed_tool_calls).unwrap_or_default(),
        is_end: true,
        input_tokens: parsed.prompt_eval_count,
        output_tokens: parsed.eval_count,
    }
}

/// Tool calls only appear on the `done` frame, already complete. The wire
/// format carries no call ids, so one is synthesized per call.
fn completed_tool_calls(message: OllamaMessage) -> Vec<ToolCallFragment> {
    if let Some(calls) = message.tool_calls {
        calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCallFragment {
                index,
                id: Some(format!("{}-{}", Uuid::new_v4(), index)),
                name: Some(call.function.name),
                arguments: call.function.arguments.map(decode_text_arguments),
            })
            .collect()
    } else if let Some(function) = message.function {
        vec![ToolCallFragment {
            index: 0,
            id: Some(Uuid::new_v4().to_string()),
            name: Some(function.name),
            arguments: function.arguments,
        }]
    } else {
        Vec::new()
    }
}

/// String-encoded argument payloads are decoded where parseable; anything
/// already structured (or unparseable) passes through unchanged.
fn decode_text_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("tool arguments are not valid JSON, keeping raw text: {}", e);
                Value::String(text)
            }
        },
        structured => structured,
    }
}

pub(crate) fn parse_tool(chunk: &ResponseChunk) -> Option<ToolCall> {
    let first = chunk.tool_calls.first()?;
    let name = first.name.clone()?;
    let args = match &first.arguments {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    };
    Some(ToolCall {
        id: first.id.clone().unwrap_or_default(),
        name,
        args,
    })
}

/// Accumulation is always over strings, so structured argument values are
/// re-encoded to text here and parsed back once at finalization.
pub(crate) fn parse_tool_args(chunk: &ResponseChunk) -> Option<ArgumentFragment> {
    let first = chunk.tool_calls.first()?;
    let text = match &first.arguments {
        Some(Value::String(text)) => text.clone(),
        Some(structured) => structured.to_string(),
        None => String::new(),
    };
    Some(ArgumentFragment { index: 0, text })
}

// Streaming wire structures
#[derive(Debug, Deserialize)]
struct OllamaStreamFrame {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OllamaToolCall>>,
    function: Option<OllamaFunction>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    arguments: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interim_frame_is_content_only() {
        let chunk = parse_frame(r#"{"message":{"content":"Hi"},"done":false}"#);
        assert_eq!(chunk.content.as_deref(), Some("Hi"));
        assert!(!chunk.is_end);
        assert!(chunk.tool_calls.is_empty());
        assert_eq!(chunk.input_tokens, None);
    }

    #[test]
    fn done_frame_carries_usage() {
        let chunk = parse_frame(
            r#"{"message":{"content":""},"done":true,"prompt_eval_count":37,"eval_count":128}"#,
        );
        assert!(chunk.is_end);
        assert_eq!(chunk.input_tokens, Some(37));
        assert_eq!(chunk.output_tokens, Some(128));
    }

    #[test]
    fn done_frame_with_structured_tool_arguments() {
        let chunk = parse_frame(
            r#"{"message":{"content":"","tool_calls":[{"function":{"name":"get_weather","arguments":{"city":"Oslo"}}}]},"done":true}"#,
        );
        let tool = parse_tool(&chunk).unwrap();
        assert_eq!(tool.name, "get_weather");
        assert_eq!(tool.args, json!({"city": "Oslo"}));
        assert!(!tool.id.is_empty());

        let fragment = parse_tool_args(&chunk).unwrap();
        assert_eq!(fragment.index, 0);
        assert_eq!(
            serde_json::from_str::<Value>(&fragment.text).unwrap(),
            json!({"city": "Oslo"})
        );
    }

    #[test]
    fn string_encoded_arguments_are_decoded() {
        let chunk = parse_frame(
            r#"{"message":{"tool_calls":[{"function":{"name":"lookup","arguments":"{\"id\":7}"}}]},"done":true}"#,
        );
        let tool = parse_tool(&chunk).unwrap();
        assert_eq!(tool.args, json!({"id": 7}));
    }

    #[test]
    fn legacy_function_field_is_normalized() {
        let chunk = parse_frame(
            r#"{"message":{"function":{"name":"ping","arguments":{}}},"done":true}"#,
        );
        let tool = parse_tool(&chunk).unwrap();
        assert_eq!(tool.name, "ping");
        assert_eq!(tool.args, json!({}));
    }

    #[test]
    fn tool_without_arguments_keeps_empty_object() {
        let chunk = parse_frame(
            r#"{"message":{"tool_calls":[{"function":{"name":"noop"}}]},"done":true}"#,
        );
        let tool = parse_tool(&chunk).unwrap();
        assert_eq!(tool.args, json!({}));
        let fragment = parse_tool_args(&chunk).unwrap();
        assert!(fragment.text.is_empty());
    }

    #[test]
    fn garbage_fails_closed() {
        let chunk = parse_frame("}{");
        assert!(chunk.is_empty());
        assert!(!chunk.is_end);
    }
}
