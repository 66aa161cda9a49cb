//! The chat orchestrator: drives one admitted turn through as many
//! streaming-completion/tool-call rounds as it takes for the model to
//! produce a terminal text answer, a per-turn maximum to be hit, or an
//! agent to delegate the response.
//!
//! Grounded in `internal/chat/llm.go` (`LLM.ChatCompletion` /
//! `createChatCompletion` / `handleToolCall` / `mergeToolCalls`) plus
//! `internal/chat/completion.go`'s `Completer.Run`, which is the source of
//! the `ChatRequest`-consuming outer loop and the `end` sentinel emission
//! this module's [`ChatOrchestrator::run`] reproduces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::callguard::CallGuard;
use crate::clients::chat::{ChatClient, CompletionParams};
use crate::config::FunctionDefinition;
use crate::conversation::Conversation;
use crate::error::{Result, VuiError};
use crate::pipeline::agent::AgentTool;
use crate::pipeline::messages::{ChatRequest, ResponseChunk};
use crate::pipeline::sentence::split_into_sentences;
use crate::pipeline::tool_runner::ToolRegistry;

/// The tools available to one conversation for one turn: sandboxed
/// functions plus agent-as-tool delegates. `agents` is checked first so an
/// agent can share a name with no container tool without ambiguity.
pub struct ToolContext {
    pub registry: ToolRegistry,
    pub agents: Vec<AgentTool>,
}

impl ToolContext {
    #[must_use]
    pub fn none() -> Self {
        ToolContext { registry: ToolRegistry::noop(), agents: Vec::new() }
    }

    fn all_definitions(&self) -> Vec<FunctionDefinition> {
        let mut defs: Vec<FunctionDefinition> = self.registry.definitions().to_vec();
        defs.extend(self.agents.iter().map(AgentTool::wire_definition));
        defs
    }

    fn visible_definitions(&self, guard: &CallGuard) -> Vec<FunctionDefinition> {
        self.all_definitions().into_iter().filter(|d| !guard.is_banned(&d.name)).collect()
    }

    async fn dispatch(&self, name: &str, args: &Value, request_num: i64, output: &mpsc::Sender<ResponseChunk>) -> Result<String> {
        if let Some(agent) = self.agents.iter().find(|a| a.name() == name) {
            return agent.call(args, request_num, output).await;
        }
        self.registry.call(name, args).await
    }
}

pub struct ChatOrchestrator {
    chat_client: Arc<ChatClient>,
    model: String,
    temperature: f32,
    frequency_penalty: f32,
    max_tokens: Option<u32>,
    max_turns: u32,
    strip_response_prefix: String,
}

enum RoundOutcome {
    Superseded,
    Done,
    ToolCalls(Vec<AccumulatedCall>),
}

#[derive(Debug, Clone, Default)]
struct AccumulatedCall {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct RawToolCallFragment {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: RawFunctionFragment,
}

#[derive(Debug, Deserialize)]
struct RawFunctionFragment {
    name: String,
    arguments: String,
}

/// Accumulate streamed tool-call fragments by id, concatenating argument
/// fragments and keeping the first non-empty name/type seen for each id, in
/// first-seen order.
fn merge_tool_call_fragments(fragments: Vec<RawToolCallFragment>) -> Vec<AccumulatedCall> {
    let mut order = Vec::new();
    let mut by_id: std::collections::HashMap<String, AccumulatedCall> = std::collections::HashMap::new();

    for f in fragments {
        let entry = by_id.entry(f.id.clone()).or_insert_with(|| {
            order.push(f.id.clone());
            AccumulatedCall { id: f.id.clone(), ..Default::default() }
        });
        if entry.call_type.is_empty() && !f.call_type.is_empty() {
            entry.call_type = f.call_type;
        }
        if entry.name.is_empty() && !f.function.name.is_empty() {
            entry.name = f.function.name;
        }
        entry.arguments.push_str(&f.function.arguments);
    }

    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

impl ChatOrchestrator {
    #[must_use]
    pub fn new(
        chat_client: Arc<ChatClient>,
        model: impl Into<String>,
        temperature: f32,
        frequency_penalty: f32,
        max_tokens: Option<u32>,
        max_turns: u32,
        strip_response_prefix: impl Into<String>,
    ) -> Self {
        ChatOrchestrator {
            chat_client,
            model: model.into(),
            temperature,
            frequency_penalty,
            max_tokens,
            max_turns,
            strip_response_prefix: strip_response_prefix.into(),
        }
    }

    /// Consume admitted `ChatRequest`s one at a time, driving each to
    /// completion and always emitting a trailing `end` sentinel (matching
    /// `Completer.Run`, which emits `end` unconditionally after
    /// `LLM.ChatCompletion` returns, success or failure).
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<ChatRequest>,
        conversation: Arc<Conversation>,
        tool_context: Arc<ToolContext>,
        output: mpsc::Sender<ResponseChunk>,
    ) {
        while let Some(req) = requests.recv().await {
            if let Err(e) = self.complete_turn(req.request_num, &conversation, &tool_context, &output).await {
                if !e.is_cancelled() {
                    tracing::warn!(request_num = req.request_num, error = %e, "chat completion failed");
                    let _ = self.emit_text(req.request_num, &format!("ERROR: Chat completion failed: {e}"), &output).await;
                }
            }
            if output.send(ResponseChunk::End { request_num: req.request_num }).await.is_err() {
                break;
            }
        }
    }

    /// Drive one `requestNum` through rounds of streaming completion and
    /// tool execution until the model stops calling tools, the turn is
    /// superseded, or an agent delegates the response.
    pub async fn complete_turn(
        &self,
        request_num: i64,
        conversation: &Conversation,
        tool_context: &ToolContext,
        output: &mpsc::Sender<ResponseChunk>,
    ) -> Result<()> {
        let mut guard = CallGuard::new();
        let mut turn = 0u32;

        loop {
            turn += 1;
            if conversation.request_counter() > request_num {
                return Ok(());
            }

            let tools_enabled = !(self.max_turns > 0 && turn > self.max_turns);
            if !tools_enabled {
                tracing::warn!(request_num, max_turns = self.max_turns, "maximum chat turns exceeded, disabling tools");
            }
            let active = if tools_enabled { tool_context.visible_definitions(&guard) } else { Vec::new() };

            let calls = match self.stream_round(request_num, conversation, &active, output).await? {
                RoundOutcome::Superseded | RoundOutcome::Done => return Ok(()),
                RoundOutcome::ToolCalls(calls) => calls,
            };

            let mut handled = 0usize;
            let mut errored = 0usize;
            let mut delegated = false;

            for call in &calls {
                if conversation.request_counter() > request_num {
                    return Ok(());
                }
                match self.handle_tool_call(request_num, call, &mut guard, conversation, tool_context, output).await {
                    Ok(failed) => {
                        handled += 1;
                        if failed {
                            errored += 1;
                        }
                    }
                    Err(VuiError::ResponseDelegated) => {
                        delegated = true;
                        break;
                    }
                    Err(VuiError::DuplicateCall(name)) => {
                        tracing::warn!(tool = %name, "repeating tool call is not allowed, reconciling");
                        break;
                    }
                    Err(e) if e.is_cancelled() => return Ok(()),
                    Err(e) => return Err(e),
                }
            }

            if delegated {
                return Ok(());
            }

            if handled > 0 && handled == errored {
                self.emit_text(
                    request_num,
                    &format!("ERROR: Chat completion failed: all {handled} tool call(s) in this round failed"),
                    output,
                )
                .await?;
                return Ok(());
            }
            // otherwise loop again, giving the model a chance to respond with tool results folded in
        }
    }

    async fn stream_round(
        &self,
        request_num: i64,
        conversation: &Conversation,
        active: &[FunctionDefinition],
        output: &mpsc::Sender<ResponseChunk>,
    ) -> Result<RoundOutcome> {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let cancelled = cancelled.clone();
            conversation.add_cancel_callback(move || cancelled.store(true, Ordering::SeqCst));
        }

        let messages = conversation.wire_messages();
        let params = CompletionParams { temperature: self.temperature, frequency_penalty: self.frequency_penalty, max_tokens: self.max_tokens };
        let mut stream = self.chat_client.stream_completion(&self.model, &messages, active, params).await?;

        let mut fragments = Vec::new();

        while let Some(item) = stream.next().await {
            if cancelled.load(Ordering::SeqCst) || conversation.request_counter() > request_num {
                return Ok(RoundOutcome::Superseded);
            }

            let chunk = item?;
            if chunk.is_empty() {
                continue;
            }
            tracing::debug!(chunk = %chunk, "received chunk");

            if chunk.starts_with("[{") {
                match serde_json::from_str::<Vec<RawToolCallFragment>>(&chunk) {
                    Ok(parsed) => fragments.extend(parsed),
                    Err(e) => {
                        tracing::warn!(error = %e, chunk = %chunk, "failed to parse tool calls from chunk");
                        self.emit_text(request_num, &chunk, output).await?;
                    }
                }
                continue;
            }

            self.emit_text(request_num, &chunk, output).await?;
        }

        if cancelled.load(Ordering::SeqCst) || conversation.request_counter() > request_num {
            return Ok(RoundOutcome::Superseded);
        }

        let merged = merge_tool_call_fragments(fragments);
        let calls: Vec<AccumulatedCall> = merged
            .into_iter()
            .filter(|c| {
                let ok = c.call_type == "function" && !c.name.is_empty();
                if !ok {
                    tracing::warn!(?c, "ignoring unsupported tool call");
                }
                ok
            })
            .collect();

        Ok(if calls.is_empty() { RoundOutcome::Done } else { RoundOutcome::ToolCalls(calls) })
    }

    /// Handle one resolved tool call: CallGuard, optional rationale chunk,
    /// dispatch, transcript append. Returns whether the tool invocation
    /// itself failed (still appended as an error-description result).
    async fn handle_tool_call(
        &self,
        request_num: i64,
        call: &AccumulatedCall,
        guard: &mut CallGuard,
        conversation: &Conversation,
        tool_context: &ToolContext,
        output: &mpsc::Sender<ResponseChunk>,
    ) -> Result<bool> {
        let args: Value = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| VuiError::Schema(format!("parse tool call arguments: {e}")))?
        };

        if !guard.is_allowed(&call.name, &args) {
            return Err(VuiError::DuplicateCall(call.name.clone()));
        }

        if let Some(rationale) = args.get("rationale").and_then(Value::as_str).filter(|s| !s.trim().is_empty()) {
            if let Some(first) = split_into_sentences(rationale).into_iter().next() {
                tracing::debug!(rationale = %first, tool = %call.name, "tool call rationale");
            }
            let sentence = format!("Let me use my {:?} tool.", call.name);
            if output.send(ResponseChunk::Chunk { request_num, text: sentence, user_only: true }).await.is_err() {
                return Err(VuiError::Cancelled);
            }
        }

        let (result, failed) = match tool_context.dispatch(&call.name, &args, request_num, output).await {
            Ok(r) => (r, false),
            Err(VuiError::ResponseDelegated) => return Err(VuiError::ResponseDelegated),
            Err(e) => {
                let msg = format!("ERROR: failed to call tool {:?}: {e}", call.name);
                tracing::warn!("{msg}");
                (msg, true)
            }
        };

        conversation.add_tool_call_response(request_num, &call.id, &call.name, &call.arguments, &result);
        Ok(failed)
    }

    async fn emit_text(&self, request_num: i64, text: &str, output: &mpsc::Sender<ResponseChunk>) -> Result<()> {
        let stripped = text.strip_prefix(&self.strip_response_prefix).unwrap_or(text);
        if output.send(ResponseChunk::Chunk { request_num, text: stripped.to_string(), user_only: false }).await.is_err() {
            return Err(VuiError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_argument_fragments_by_id() {
        let fragments = vec![
            RawToolCallFragment { id: "c1".into(), call_type: "function".into(), function: RawFunctionFragment { name: "getWeather".into(), arguments: "{\"loc".into() } },
            RawToolCallFragment { id: "c1".into(), call_type: String::new(), function: RawFunctionFragment { name: String::new(), arguments: "ation\":\"Berlin\"}".into() } },
        ];
        let merged = merge_tool_call_fragments(fragments);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "getWeather");
        assert_eq!(merged[0].arguments, "{\"location\":\"Berlin\"}");
    }

    #[test]
    fn merge_preserves_first_seen_id_order() {
        let fragments = vec![
            RawToolCallFragment { id: "b".into(), call_type: "function".into(), function: RawFunctionFragment { name: "second".into(), arguments: String::new() } },
            RawToolCallFragment { id: "a".into(), call_type: "function".into(), function: RawFunctionFragment { name: "first".into(), arguments: String::new() } },
        ];
        let merged = merge_tool_call_fragments(fragments);
        assert_eq!(merged[0].id, "b");
        assert_eq!(merged[1].id, "a");
    }
}
