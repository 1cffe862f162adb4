use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::message::{ChatMessage, RequestUsage};

/// One event an agent emits while streaming a turn: a partial text chunk,
/// a structured progress event, or the terminal response (§6.1).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Chunk(String),
    Progress(String),
    Final(AgentResponse),
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub message: ChatMessage,
    pub usage: Option<RequestUsage>,
}

pub type AgentStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// The Agent contract (§6.1). Agents are black-box collaborators: the
/// orchestrator only ever calls `stream` with an instruction plus a
/// read-only conversation slice, and reads back a stream terminated by a
/// `Final` event. Concrete agents (web surfer, coder, file surfer,
/// document generator, user proxy) are out of scope for this crate.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn produced_message_types(&self) -> &[&'static str];

    async fn stream(&self, messages: &[ChatMessage], cancel: CancellationToken) -> anyhow::Result<AgentStream>;
}
