use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::team::Team;

/// A boolean verdict plus the LLM's justification for it — the teacher's
/// `orchestrator/types.rs` pairs every yes/no field with a `reason` this
/// way so the transcript stays explainable without a separate call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoolWithReason {
    pub answer: bool,
    pub reason: String,
}

/// The next concrete action, aimed either at an agent or back at the user
/// (§3 "Progress Ledger" / §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionOrQuestion {
    pub answer: String,
    pub agent_name: String,
}

/// The LLM's per-turn assessment of plan progress, produced by the ledger
/// call and consumed by the executing-phase dispatch loop (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressLedger {
    pub is_current_step_complete: BoolWithReason,
    pub need_to_replan: BoolWithReason,
    pub instruction_or_question: InstructionOrQuestion,
    pub progress_summary: String,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger names unknown agent '{0}'")]
    UnknownAgent(String),
    #[error("ledger instruction is empty")]
    EmptyInstruction,
}

impl ProgressLedger {
    /// Validates the fields the orchestrator acts on directly: the named
    /// agent must be a real team member (or the synthetic no-op agent),
    /// and the instruction text must be non-empty so dispatch has
    /// something concrete to hand the agent (§4.1 edge case).
    pub fn validate(&self, team: &Team) -> Result<(), LedgerError> {
        if !team.has_agent(&self.instruction_or_question.agent_name) {
            return Err(LedgerError::UnknownAgent(self.instruction_or_question.agent_name.clone()));
        }
        if self.instruction_or_question.answer.trim().is_empty() {
            return Err(LedgerError::EmptyInstruction);
        }
        Ok(())
    }

    pub fn is_stalled(&self) -> bool {
        !self.is_current_step_complete.answer
    }
}
