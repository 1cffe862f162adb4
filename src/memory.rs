use async_trait::async_trait;

use crate::error::OrchestratorResult;
use crate::plan::Plan;

/// Supplies prior plans for a task under `retrieve_relevant_plans ∈
/// {reuse, hint}` (§6.4). `"reuse"` adopts a returned plan outright when
/// confidence is high enough to skip the planning LLM call entirely;
/// `"hint"` folds the suggestions into the planning prompt instead. Both
/// policies are implemented by the caller in `orchestrator/state.rs`; this
/// trait only supplies candidates.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn suggest_plans(&self, task: &str) -> OrchestratorResult<Vec<Plan>>;
}
