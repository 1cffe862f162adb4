use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentEvent};
use crate::bus::{BusPayload, MessageBus};
use crate::error::OrchestratorError;
use crate::message::{ChatMessage, ChatMessageKind};

pub const USER_PROXY: &str = "user_proxy";
pub const NO_ACTION_AGENT: &str = "no_action_agent";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: String,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into() }
    }
}

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("team has no agents")]
    Empty,
    #[error("duplicate agent name '{0}'")]
    DuplicateName(String),
}

/// The ordered, name-unique roster of agents available to a plan (§3
/// "Team"). Construction fails on an empty team or duplicate names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    descriptors: Vec<AgentDescriptor>,
}

impl Team {
    pub fn new(descriptors: Vec<AgentDescriptor>) -> Result<Self, TeamError> {
        if descriptors.is_empty() {
            return Err(TeamError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name.clone()) {
                return Err(TeamError::DuplicateName(descriptor.name.clone()));
            }
        }
        Ok(Self { descriptors })
    }

    pub fn has_agent(&self, name: &str) -> bool {
        name == NO_ACTION_AGENT || self.descriptors.iter().any(|d| d.name == name)
    }

    pub fn has_user_proxy(&self) -> bool {
        self.has_agent(USER_PROXY)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    /// Names eligible for ledger/plan dispatch this turn: the roster minus
    /// `user_proxy` when running autonomously, plus the synthetic
    /// `no_action_agent` so the ledger can legitimately say "do nothing"
    /// without inventing a real participant (mirrors the teacher's
    /// `set_internal_variables`).
    pub fn dispatch_eligible_names(&self, autonomous_execution: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .iter()
            .filter(|d| !(autonomous_execution && d.name == USER_PROXY))
            .map(|d| d.name.clone())
            .collect();
        names.push(NO_ACTION_AGENT.to_string());
        names
    }

    /// Pretty-printed team description injected into prompts (§4.1).
    pub fn describe(&self, autonomous_execution: bool) -> String {
        let mut lines: Vec<String> = self
            .descriptors
            .iter()
            .filter(|d| !(autonomous_execution && d.name == USER_PROXY))
            .map(|d| format!("{} - {}", d.name, d.description.trim()))
            .collect();
        lines.push(format!(
            "{NO_ACTION_AGENT} - If for this step no action is needed, use this agent to perform no action"
        ));
        lines.join("\n")
    }
}

/// Maps agent name to a live handle and forwards dispatched instructions
/// (§4.6). Holds no orchestrator state of its own.
#[derive(Clone)]
pub struct TeamRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl TeamRegistry {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents: agents.into_iter().map(|a| (a.name().to_string(), a)).collect() }
    }

    /// Sends `instruction` to `agent_name` with `history` as the read-only
    /// conversation slice, forwarding streamed events to `bus` unchanged
    /// and returning the terminal response. Enforces `timeout` per §4.6;
    /// a timeout is reported as an `AgentFailure`.
    pub async fn dispatch(
        &self,
        agent_name: &str,
        history: &[ChatMessage],
        instruction: ChatMessage,
        bus: &MessageBus,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Result<ChatMessage, OrchestratorError> {
        if agent_name == NO_ACTION_AGENT {
            return Ok(ChatMessage::text(0, NO_ACTION_AGENT, "no action taken this step")
                .with_kind(ChatMessageKind::AgentResponse));
        }

        let agent = self.agents.get(agent_name).ok_or_else(|| OrchestratorError::UnknownAgent {
            agent_name: agent_name.to_string(),
        })?;

        let mut turn = history.to_vec();
        turn.push(instruction);

        let run = async {
            let mut stream = agent
                .stream(&turn, cancel.clone())
                .await
                .map_err(|e| OrchestratorError::AgentFailure { agent: agent_name.to_string(), detail: e.to_string() })?;

            while let Some(event) = stream.next().await {
                match event {
                    AgentEvent::Chunk(text) => {
                        bus.publish(BusPayload::AgentChunk { agent_name: agent_name.to_string(), text });
                    }
                    AgentEvent::Progress(text) => {
                        debug!(agent = agent_name, %text, "agent progress event");
                    }
                    AgentEvent::Final(response) => return Ok(response.message),
                }
            }
            Err(OrchestratorError::AgentFailure {
                agent: agent_name.to_string(),
                detail: "stream ended without a final response".into(),
            })
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
            result = tokio::time::timeout(timeout, run) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    warn!(agent = agent_name, ?timeout, "agent dispatch timed out");
                    Err(OrchestratorError::AgentFailure { agent: agent_name.to_string(), detail: "timed out".into() })
                }
            },
        };

        outcome
    }
}
