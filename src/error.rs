use thiserror::Error;

/// Error kinds a session can surface, matching the policy table that drives
/// how the orchestrator reacts to each one (force replan, go terminal, or
/// shrug and continue).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("LLM output for {stage} was invalid after all retries: {detail}")]
    ProtocolFailure { stage: &'static str, detail: String },

    #[error("agent '{agent}' failed: {detail}")]
    AgentFailure { agent: String, detail: String },

    #[error("agent '{agent_name}' is not a member of the team")]
    UnknownAgent { agent_name: String },

    #[error("session was cancelled")]
    Cancelled,

    #[error("resource unavailable: {detail}")]
    ResourceFailure { detail: String },

    #[error("agent '{agent}' was asked the same thing three times in a row")]
    LoopDetected { agent: String, instruction: String },

    #[error("empty team")]
    EmptyTeam,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
