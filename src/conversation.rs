//! The conversation state machine: the ordered transcript, the monotonic
//! request generation counter, turn cancellation, and the pruning rule that
//! keeps tool-call/tool-result pairs coherent.
//!
//! Grounded in `internal/model/conversation.go` from the original
//! implementation: a single mutex-guarded struct owns `requestCounter`, the
//! message list, and a list of cancel callbacks invoked and cleared whenever
//! a new user turn is admitted.

use std::sync::Mutex;

use serde_json::Value;

/// One role a transcript message can carry, matching the OpenAI-compatible
/// wire roles this crate's chat client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single piece of message content. Tagged-variant rather than a
/// trait-object chain per §9's re-architecture note.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    Binary { mime_type: String, bytes: Vec<u8> },
    ToolCall { id: String, name: String, arguments_json: String },
    ToolResult { tool_call_id: String, name: String, content: String },
}

impl ContentPart {
    /// Best-effort plain-text rendering, used for log lines and prompt
    /// assembly (the wire mapping to provider JSON is a separate function).
    pub fn display(&self) -> String {
        match self {
            ContentPart::Text(s) => s.clone(),
            ContentPart::Binary { mime_type, bytes } => format!("[binary {mime_type}, {} bytes]", bytes.len()),
            ContentPart::ToolCall { id, name, arguments_json } => {
                format!("{{{}… {name}({arguments_json})}}", &id[..id.len().min(5)])
            }
            ContentPart::ToolResult { tool_call_id, content, .. } => {
                format!("&{}… {content:?}", &tool_call_id[..tool_call_id.len().min(5)])
            }
        }
    }
}

/// One message in the transcript, tagged with the `requestNum` of the turn
/// that produced it.
#[derive(Debug, Clone)]
pub struct TranscriptMessage {
    pub request_num: i64,
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl TranscriptMessage {
    pub fn text(role: Role, request_num: i64, text: impl Into<String>) -> Self {
        TranscriptMessage { request_num, role, parts: vec![ContentPart::Text(text.into())] }
    }

    fn display(&self) -> String {
        let parts: String = self.parts.iter().map(ContentPart::display).collect();
        format!("{}: {parts}", self.role.wire_name())
    }
}

/// Wire-format chat message rendered from a [`TranscriptMessage`], ready to
/// serialize into an OpenAI-compatible `messages` array entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

/// Render a transcript message to its OpenAI-compatible wire form. A flat
/// match, not a dynamic-dispatch chain (§9).
pub fn render_wire_message(msg: &TranscriptMessage) -> WireMessage {
    match msg.role {
        Role::Tool => {
            let (tool_call_id, name, content) = msg
                .parts
                .iter()
                .find_map(|p| match p {
                    ContentPart::ToolResult { tool_call_id, name, content } => {
                        Some((tool_call_id.clone(), name.clone(), content.clone()))
                    }
                    _ => None,
                })
                .unwrap_or_default();
            WireMessage {
                role: "tool",
                content: Some(content),
                tool_call_id: Some(tool_call_id),
                name: Some(name),
                tool_calls: None,
            }
        }
        Role::Assistant => {
            let tool_calls: Vec<Value> = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolCall { id, name, arguments_json } => Some(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": arguments_json },
                    })),
                    _ => None,
                })
                .collect();
            let text: String = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("");
            WireMessage {
                role: "assistant",
                content: if text.is_empty() && !tool_calls.is_empty() { None } else { Some(text) },
                tool_call_id: None,
                name: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            }
        }
        role => {
            let text: String = msg
                .parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text(t) => t.clone(),
                    other => other.display(),
                })
                .collect::<Vec<_>>()
                .join("");
            WireMessage { role: role.wire_name(), content: Some(text), tool_call_id: None, name: None, tool_calls: None }
        }
    }
}

struct Inner {
    request_counter: i64,
    messages: Vec<TranscriptMessage>,
    cancel_callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

/// The shared, mutex-guarded conversation: transcript plus request counter
/// plus per-turn cancel callback list. Every mutation is serialized; readers
/// take a snapshot under the lock and operate on the copy.
pub struct Conversation {
    inner: Mutex<Inner>,
}

impl Conversation {
    /// Create a session with a system-prompt message pinned at index 0.
    /// `requestCounter` starts at 1, matching the system message's own
    /// `requestNum` (invariant: all messages satisfy `requestNum <= counter`).
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system = TranscriptMessage::text(Role::System, 1, system_prompt);
        Conversation { inner: Mutex::new(Inner { request_counter: 1, messages: vec![system], cancel_callbacks: Vec::new() }) }
    }

    /// Create a session whose counter starts at `counter_before_first_turn`
    /// rather than 0, so a caller can pre-align it with some other turn's
    /// `requestNum` before admitting the first user turn. Used by agent
    /// delegation (`internal/chat/agent.go`'s `Agent.invoke`), which seeds a
    /// fresh nested conversation with `reqNum-1` so that, after the single
    /// user turn is admitted, the nested counter equals the outer turn's
    /// `requestNum` exactly.
    #[must_use]
    pub fn seeded(system_prompt: impl Into<String>, counter_before_first_turn: i64) -> Self {
        let system = TranscriptMessage::text(Role::System, counter_before_first_turn, system_prompt);
        Conversation {
            inner: Mutex::new(Inner { request_counter: counter_before_first_turn, messages: vec![system], cancel_callbacks: Vec::new() }),
        }
    }

    /// Current value of the monotonic request counter.
    #[must_use]
    pub fn request_counter(&self) -> i64 {
        self.inner.lock().expect("conversation mutex poisoned").request_counter
    }

    /// Register a callback invoked (and then discarded) the next time a new
    /// turn supersedes the caller's. Used by in-flight stages to abort their
    /// work on turn supersession.
    pub fn add_cancel_callback(&self, cb: impl FnOnce() + Send + 'static) {
        self.inner.lock().expect("conversation mutex poisoned").cancel_callbacks.push(Box::new(cb));
    }

    /// Admit a new user turn: increment the counter, fire and clear all
    /// cancel callbacks, prune the transcript to `{index 0} ∪ {requestNum ==
    /// counter}`, then append the user message. Returns the new `requestNum`.
    pub fn admit_user_turn(&self, content: ContentPart) -> i64 {
        let mut inner = self.inner.lock().expect("conversation mutex poisoned");
        inner.request_counter += 1;
        let counter = inner.request_counter;

        let callbacks = std::mem::take(&mut inner.cancel_callbacks);
        drop(inner);
        for cb in callbacks {
            cb();
        }
        let mut inner = self.inner.lock().expect("conversation mutex poisoned");

        Self::drop_previous_messages(&mut inner.messages, counter);

        let msg = TranscriptMessage { request_num: counter, role: Role::User, parts: vec![content] };
        tracing::info!(request_num = counter, text = %msg.display(), "user request");
        inner.messages.push(msg);

        counter
    }

    /// Keep index 0 (system prompt) and every message whose `requestNum ==
    /// n`; drop everything else. This is what guarantees a clean
    /// tool-call/tool-result prefix after a self-interruption.
    fn drop_previous_messages(messages: &mut Vec<TranscriptMessage>, n: i64) {
        let mut i = 0;
        let mut kept = 0;
        while i < messages.len() {
            if kept == 0 || messages[i].request_num == n {
                messages.swap(kept, i);
                kept += 1;
            }
            i += 1;
        }
        messages.truncate(kept);
    }

    /// Append an assistant text message for `request_num`, unless it has
    /// already been superseded by a later turn. Returns whether it was
    /// appended.
    pub fn add_assistant_response(&self, request_num: i64, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock().expect("conversation mutex poisoned");
        if inner.request_counter > request_num {
            return false;
        }
        tracing::info!(request_num, text = text.trim(), "assistant");
        inner.messages.push(TranscriptMessage::text(Role::Assistant, request_num, text));
        true
    }

    /// Append the `(ToolCall, ToolResult)` pair for `request_num`, unless
    /// superseded. This is the only way a tool call ever reaches the
    /// transcript, so the pairing invariant holds by construction.
    pub fn add_tool_call_response(&self, request_num: i64, call_id: &str, name: &str, arguments_json: &str, result: &str) {
        let mut inner = self.inner.lock().expect("conversation mutex poisoned");
        if inner.request_counter > request_num {
            return;
        }
        inner.messages.push(TranscriptMessage {
            request_num,
            role: Role::Assistant,
            parts: vec![ContentPart::ToolCall { id: call_id.to_string(), name: name.to_string(), arguments_json: arguments_json.to_string() }],
        });
        inner.messages.push(TranscriptMessage {
            request_num,
            role: Role::Tool,
            parts: vec![ContentPart::ToolResult { tool_call_id: call_id.to_string(), name: name.to_string(), content: result.to_string() }],
        });
    }

    /// Snapshot of the full transcript as wire messages, in order.
    #[must_use]
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        let inner = self.inner.lock().expect("conversation mutex poisoned");
        inner.messages.iter().map(render_wire_message).collect()
    }

    /// Snapshot of just the messages belonging to the current turn.
    #[must_use]
    pub fn current_turn_messages(&self) -> Vec<TranscriptMessage> {
        let inner = self.inner.lock().expect("conversation mutex poisoned");
        let counter = inner.request_counter;
        inner.messages.iter().filter(|m| m.request_num == counter).cloned().collect()
    }

    /// Snapshot of the raw transcript, for tests and diagnostics.
    #[must_use]
    pub fn messages_snapshot(&self) -> Vec<TranscriptMessage> {
        self.inner.lock().expect("conversation mutex poisoned").messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_one_with_system_prompt_pinned() {
        let conv = Conversation::new("sys");
        assert_eq!(conv.request_counter(), 1);
        let snap = conv.messages_snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].role, Role::System);
    }

    #[test]
    fn admit_user_turn_increments_counter_monotonically() {
        let conv = Conversation::new("sys");
        let n1 = conv.admit_user_turn(ContentPart::Text("hi".into()));
        let n2 = conv.admit_user_turn(ContentPart::Text("again".into()));
        assert_eq!(n1, 2);
        assert_eq!(n2, 3);
        assert!(n2 > n1);
    }

    #[test]
    fn drop_previous_messages_keeps_only_system_and_current_turn() {
        let conv = Conversation::new("sys");
        let n1 = conv.admit_user_turn(ContentPart::Text("first".into()));
        conv.add_assistant_response(n1, "reply one");
        let n2 = conv.admit_user_turn(ContentPart::Text("second".into()));

        let snap = conv.messages_snapshot();
        for (i, msg) in snap.iter().enumerate() {
            assert!(i == 0 || msg.request_num == n2, "message {i} has stale request_num {}", msg.request_num);
        }
    }

    #[test]
    fn cancel_callbacks_fire_once_on_next_turn_then_clear() {
        let conv = Conversation::new("sys");
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let f2 = fired.clone();
        conv.add_cancel_callback(move || {
            f2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        conv.admit_user_turn(ContentPart::Text("a".into()));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        conv.admit_user_turn(ContentPart::Text("b".into()));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_tool_result_is_not_appended_after_supersession() {
        let conv = Conversation::new("sys");
        let n1 = conv.admit_user_turn(ContentPart::Text("first".into()));
        conv.admit_user_turn(ContentPart::Text("second".into()));
        // n1 is now stale.
        conv.add_tool_call_response(n1, "call1", "getWeather", "{}", "sunny");
        for msg in conv.messages_snapshot() {
            assert_ne!(msg.request_num, n1);
        }
    }

    #[test]
    fn every_tool_call_is_followed_by_its_tool_result() {
        let conv = Conversation::new("sys");
        let n = conv.admit_user_turn(ContentPart::Text("weather?".into()));
        conv.add_tool_call_response(n, "c1", "getWeather", "{}", "sunny, 27C");
        let snap = conv.messages_snapshot();
        let call_idx = snap.iter().position(|m| matches!(m.parts.first(), Some(ContentPart::ToolCall { id, .. }) if id == "c1")).unwrap();
        let result_idx = snap
            .iter()
            .position(|m| matches!(m.parts.first(), Some(ContentPart::ToolResult { tool_call_id, .. }) if tool_call_id == "c1"))
            .unwrap();
        assert!(result_idx > call_idx);
    }
}
