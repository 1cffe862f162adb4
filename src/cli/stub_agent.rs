use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentEvent, AgentResponse, AgentStream};
use crate::llm::client::LlmClient;
use crate::message::{ChatMessage, LlmMessage, RequestUsage};

/// Stands in for one of the concrete specialized agents (web surfer,
/// coder, file surfer, document generator) that the orchestrator treats
/// as black-box participants (§1, §6.1). It answers every instruction
/// directly from the LLM, with no browsing, execution, or filesystem
/// access behind it — enough for the CLI to drive a real plan/ledger/
/// dispatch loop without wiring up those out-of-scope collaborators.
pub struct StubAgent {
    name: String,
    description: String,
    client: Arc<dyn LlmClient>,
}

impl StubAgent {
    pub fn new(name: impl Into<String>, description: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        Self { name: name.into(), description: description.into(), client }
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn produced_message_types(&self) -> &[&'static str] {
        &["text"]
    }

    async fn stream(&self, messages: &[ChatMessage], _cancel: CancellationToken) -> anyhow::Result<AgentStream> {
        let mut history = vec![LlmMessage::system(format!(
            "You are standing in for {}, a {}. Respond as if you had actually carried out the instruction, \
             describing concrete (if invented) results rather than refusing.",
            self.name, self.description
        ))];
        history.extend(messages.iter().map(|m| LlmMessage::user(m.to_text())));

        let completion = self.client.complete(&history).await?;
        let response = AgentResponse {
            message: ChatMessage::text(0, self.name.clone(), completion.text),
            usage: Some(RequestUsage { prompt_tokens: completion.prompt_tokens, completion_tokens: completion.completion_tokens }),
        };
        Ok(Box::pin(stream::once(async move { AgentEvent::Final(response) })))
    }
}
