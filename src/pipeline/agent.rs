//! Agent-as-tool delegation.
//!
//! Grounded in `internal/chat/agent.go`'s `Agent`/`AgentTool`: an agent is
//! exposed to the model as an ordinary function taking a single `prompt`
//! string. Calling it seeds a fresh, single-turn conversation with that
//! prompt, drives it through the orchestrator's own turn-completion logic,
//! and streams the result straight into the *outer* turn's response queue
//! under the *outer* `requestNum`. A successful delegation always resolves
//! to [`VuiError::ResponseDelegated`] so the caller's round treats the turn
//! as answered rather than reconciling further.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::{AgentDefinition, FunctionDefinition};
use crate::conversation::{Conversation, ContentPart};
use crate::error::{Result, VuiError};
use crate::pipeline::messages::ResponseChunk;
use crate::pipeline::orchestrator::{ChatOrchestrator, ToolContext};
use crate::pipeline::tool_runner::{ContainerRunner, ToolRegistry};

pub struct AgentTool {
    name: String,
    description: String,
    system_prompt: String,
    orchestrator: Arc<ChatOrchestrator>,
    tool_context: ToolContext,
}

impl AgentTool {
    #[must_use]
    pub fn new(def: AgentDefinition, orchestrator: Arc<ChatOrchestrator>, runner: Arc<dyn ContainerRunner>) -> Self {
        let tool_context = ToolContext { registry: ToolRegistry::new(def.tools, runner), agents: Vec::new() };
        AgentTool { name: def.name, description: def.description, system_prompt: def.prompt.join("\n"), orchestrator, tool_context }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire-visible function definition synthesized for this agent, a
    /// single required `prompt` string parameter, matching
    /// `Agent.Definition()`.
    #[must_use]
    pub fn wire_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The prompt providing the user request along with the relevant context.",
                    }
                },
                "required": ["prompt"],
            }),
            ..Default::default()
        }
    }

    /// Delegate a turn to this agent. Always ends in `Err`: either the
    /// real error if the nested turn failed, or `ResponseDelegated` on
    /// success.
    pub async fn call(&self, args: &Value, outer_request_num: i64, output: &mpsc::Sender<ResponseChunk>) -> Result<String> {
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VuiError::Schema(format!("no prompt provided for agent {:?}", self.name)))?;

        let nested = Conversation::seeded(self.system_prompt.clone(), outer_request_num - 1);
        let actual = nested.admit_user_turn(ContentPart::Text(prompt.to_string()));
        debug_assert_eq!(actual, outer_request_num, "seeded conversation counter must land on the outer requestNum");

        self.orchestrator
            .complete_turn(outer_request_num, &nested, &self.tool_context, output)
            .await
            .map_err(|e| VuiError::ToolExecution(format!("run {} agent: {e}", self.name)))?;

        Err(VuiError::ResponseDelegated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::chat::ChatClient;

    fn test_orchestrator() -> Arc<ChatOrchestrator> {
        Arc::new(ChatOrchestrator::new(Arc::new(ChatClient::new("http://unused", "")), "test-model", 0.7, 0.0, None, 4, ""))
    }

    #[test]
    fn wire_definition_requires_a_prompt_string() {
        let agent = AgentTool::new(
            AgentDefinition { name: "researcher".into(), description: "does research".into(), prompt: vec!["You research.".into()], tools: Vec::new() },
            test_orchestrator(),
            Arc::new(crate::pipeline::tool_runner::ProcessContainerRunner),
        );
        let def = agent.wire_definition();
        assert_eq!(def.name, "researcher");
        assert_eq!(def.parameters["required"][0], "prompt");
    }

    #[tokio::test]
    async fn missing_prompt_argument_is_rejected_before_delegating() {
        let agent = AgentTool::new(
            AgentDefinition { name: "researcher".into(), description: String::new(), prompt: vec!["sys".into()], tools: Vec::new() },
            test_orchestrator(),
            Arc::new(crate::pipeline::tool_runner::ProcessContainerRunner),
        );
        let (tx, _rx) = mpsc::channel(4);
        let err = agent.call(&json!({}), 1, &tx).await.unwrap_err();
        assert!(matches!(err, VuiError::Schema(_)));
    }
}
