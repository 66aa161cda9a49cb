//! OpenAI-compatible streaming chat-completion client.
//!
//! Grounded in the teacher's `fae_llm::providers::openai::OpenAiAdapter`
//! (request building, `reqwest` streaming, incremental SSE parsing via
//! [`crate::clients::sse`]) combined with `internal/chat/llm.go`'s wire
//! contract: each emitted chunk is either a plain text delta, or — when the
//! upstream streams a tool-call fragment — a JSON array shaped
//! `[{"id","type","function":{"name","arguments"}}]`, reproduced verbatim so
//! the orchestrator's `"[{"`-prefix dual-path check (spec'd, not an
//! implementation accident) has something to check against.

use std::pin::Pin;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::clients::sse::SseLineParser;
use crate::config::FunctionDefinition;
use crate::conversation::WireMessage;
use crate::error::{Result, VuiError};

pub struct ChatClient {
    http: reqwest::Client,
    server_url: String,
    api_key: String,
}

/// Per-request parameters threaded straight onto the wire, matching
/// `LLM.ChatCompletion`'s fields in the original.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub max_tokens: Option<u32>,
}

impl ChatClient {
    #[must_use]
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        ChatClient { http: reqwest::Client::new(), server_url: server_url.into(), api_key: api_key.into() }
    }

    /// Issue a streaming chat completion and return a stream of raw chunk
    /// strings ready for the orchestrator's dual-path interpretation.
    pub async fn stream_completion(
        &self,
        model: &str,
        messages: &[WireMessage],
        functions: &[FunctionDefinition],
        params: CompletionParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String>> + Send>>> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "temperature": params.temperature,
            "frequency_penalty": params.frequency_penalty,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !functions.is_empty() {
            body["functions"] = json!(functions.iter().map(function_to_wire).collect::<Vec<_>>());
        }

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.server_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let byte_stream = response.bytes_stream();

        let stream = try_stream! {
            tokio::pin!(byte_stream);
            let mut parser = SseLineParser::new();

            while let Some(bytes) = byte_stream.next().await {
                let bytes = bytes.map_err(VuiError::from)?;
                for event in parser.push(&bytes) {
                    if event.is_done() {
                        return;
                    }
                    if let Some(chunk) = parse_completion_chunk(&event.data)? {
                        yield chunk;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

fn function_to_wire(f: &FunctionDefinition) -> WireFunction<'_> {
    WireFunction { name: &f.name, description: &f.description, parameters: &f.parameters }
}

/// Interpret one `data:` payload of an OpenAI-compatible completion chunk,
/// returning either plain text (from `delta.content`) or a re-serialized
/// `[{id,type,function}]` array (from `delta.tool_calls`). `None` when the
/// chunk carries neither (e.g. a role-only opening delta).
fn parse_completion_chunk(data: &str) -> Result<Option<String>> {
    let parsed: Value = serde_json::from_str(data).map_err(|e| VuiError::Schema(format!("parse completion chunk: {e}")))?;
    let delta = &parsed["choices"][0]["delta"];

    if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
        if tool_calls.is_empty() {
            return Ok(None);
        }
        let rendered: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.get("id").and_then(Value::as_str).unwrap_or(""),
                    "type": tc.get("type").and_then(Value::as_str).unwrap_or("function"),
                    "function": {
                        "name": tc["function"].get("name").and_then(Value::as_str).unwrap_or(""),
                        "arguments": tc["function"].get("arguments").and_then(Value::as_str).unwrap_or(""),
                    }
                })
            })
            .collect();
        return Ok(Some(serde_json::to_string(&rendered).expect("tool call array serializes")));
    }

    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_content_delta_is_forwarded_as_is() {
        let chunk = parse_completion_chunk(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#).unwrap();
        assert_eq!(chunk, Some("Hello".to_string()));
    }

    #[test]
    fn empty_content_delta_yields_nothing() {
        let chunk = parse_completion_chunk(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert_eq!(chunk, None);
    }

    #[test]
    fn role_only_delta_yields_nothing() {
        let chunk = parse_completion_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(chunk, None);
    }

    #[test]
    fn tool_call_delta_is_rendered_as_bracket_prefixed_json_array() {
        let chunk = parse_completion_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"c1","type":"function","function":{"name":"getWeather","arguments":"{}"}}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert!(chunk.starts_with("[{"));
        let parsed: Value = serde_json::from_str(&chunk).unwrap();
        assert_eq!(parsed[0]["function"]["name"], "getWeather");
    }

    #[test]
    fn tool_call_argument_only_fragment_carries_empty_name() {
        let chunk = parse_completion_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"{\"loc"}}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        let parsed: Value = serde_json::from_str(&chunk).unwrap();
        assert_eq!(parsed[0]["function"]["name"], "");
        assert_eq!(parsed[0]["function"]["arguments"], "{\"loc");
    }

    #[test]
    fn malformed_json_chunk_surfaces_a_schema_error() {
        let err = parse_completion_chunk("not json").unwrap_err();
        assert!(matches!(err, VuiError::Schema(_)));
    }
}
