use std::time::Duration;

use chrono::{DateTime, Utc};
use either::Either;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::{BusPayload, MessageBus};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::message::ChatMessage;
use crate::plan::{Condition, StepCore};
use crate::team::TeamRegistry;

/// A sentinel step's lifecycle, tracked alongside `SentinelState` so a
/// checkpoint snapshot distinguishes "still polling" from a terminal state
/// without the reader having to infer it from `executions_completed` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentinelStatus {
    Running,
    Completed,
    Cancelled,
}

/// Per-sentinel-step state the scheduler owns while the step is active
/// (§3 "SentinelState"). Serializable so a long-running sentinel can be
/// checkpointed across process restarts (§4.4, optional persistence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelState {
    pub executions_completed: u32,
    pub last_check_result: bool,
    pub next_wake_time: DateTime<Utc>,
    pub current_sleep_seconds: u32,
    pub accumulated_observations: Vec<String>,
    pub status: SentinelStatus,
    stall_count: u32,
}

impl SentinelState {
    fn new(initial_sleep_seconds: u32) -> Self {
        Self {
            executions_completed: 0,
            last_check_result: false,
            next_wake_time: Utc::now(),
            current_sleep_seconds: initial_sleep_seconds,
            accumulated_observations: Vec::new(),
            status: SentinelStatus::Running,
            stall_count: 0,
        }
    }
}

/// Optional checkpoint sink for `SentinelState` (§4.4 "Persistence
/// (optional)"). No concrete store is implemented here — like
/// `MemoryProvider` and `ContainerResource`, this is a contract-only seam a
/// caller can back with whatever durable store fits its deployment.
#[async_trait::async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, step_index: usize, state: &SentinelState);
}

/// How a sentinel step ended. `Completed` advances `step_index`;
/// `ReplanTriggered` and `Cancelled` both return control to the
/// Orchestrator without advancing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelOutcome {
    Completed,
    ReplanTriggered,
    Cancelled,
}

/// The four-way verdict of one condition check (§4.1/§4.5), validated the
/// way `_sentinel_prompts_zh.py`'s `validate_sentinel_condition_check_json`
/// validates it: a non-empty reason, and a positive suggested sleep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionCheck {
    pub condition_met: bool,
    pub reason: String,
    pub sleep_duration: u32,
    pub sleep_duration_reason: String,
}

/// A callback into the LLM Protocol Layer's `check_condition` call,
/// kept as a trait so the scheduler can be exercised with a fake clock
/// and fake judge in tests without touching a real model.
#[async_trait::async_trait]
pub trait ConditionChecker: Send + Sync {
    async fn check_condition(
        &self,
        step_description: &str,
        condition: &str,
        agent_response: &str,
    ) -> OrchestratorResult<ConditionCheck>;
}

/// Runs one sentinel step to completion, replan-trigger, or cancellation
/// (§4.4). `pending_followup` is checked at every wake checkpoint per the
/// resolved Open Question on follow-up-during-sleep precedence: a queued
/// message never interrupts an in-flight agent dispatch, only the sleep
/// between dispatches.
pub struct SentinelScheduler<'a> {
    config: &'a OrchestratorConfig,
    team: &'a TeamRegistry,
    bus: &'a MessageBus,
    checker: &'a dyn ConditionChecker,
    checkpointer: Option<&'a dyn Checkpointer>,
}

impl<'a> SentinelScheduler<'a> {
    pub fn new(
        config: &'a OrchestratorConfig,
        team: &'a TeamRegistry,
        bus: &'a MessageBus,
        checker: &'a dyn ConditionChecker,
    ) -> Self {
        Self { config, team, bus, checker, checkpointer: None }
    }

    /// Attaches a checkpoint sink; `run` saves a snapshot after every
    /// dispatch and once more on the terminal status transition.
    pub fn with_checkpointer(mut self, checkpointer: &'a dyn Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    async fn checkpoint(&self, step_index: usize, state: &SentinelState) {
        if let Some(checkpointer) = self.checkpointer {
            checkpointer.save(step_index, state).await;
        }
    }

    pub async fn run(
        &self,
        step_index: usize,
        core: &StepCore,
        condition: &Condition,
        sleep_duration_seconds: u32,
        history: &mut Vec<ChatMessage>,
        cancel: CancellationToken,
        pending_followup: &mut Option<ChatMessage>,
    ) -> OrchestratorResult<SentinelOutcome> {
        let mut state = SentinelState::new(self.config.clamp_sleep(sleep_duration_seconds as u64).as_secs() as u32);

        loop {
            if cancel.is_cancelled() {
                state.status = SentinelStatus::Cancelled;
                self.checkpoint(step_index, &state).await;
                return Ok(SentinelOutcome::Cancelled);
            }

            let instruction = ChatMessage::text(0, "orchestrator", core.details.clone());
            let dispatch = self
                .team
                .dispatch(&core.agent_name, history, instruction, self.bus, cancel.clone(), self.config.per_agent_timeout)
                .await;

            let response_text = match dispatch {
                Ok(message) => {
                    history.push(message.clone());
                    message.to_text()
                }
                Err(OrchestratorError::Cancelled) => {
                    state.status = SentinelStatus::Cancelled;
                    self.checkpoint(step_index, &state).await;
                    return Ok(SentinelOutcome::Cancelled);
                }
                Err(err) => {
                    state.stall_count += 1;
                    state.accumulated_observations.push(format!("execution failed: {err}"));
                    self.checkpoint(step_index, &state).await;
                    if state.stall_count >= self.config.max_stalls_before_replan {
                        return Ok(SentinelOutcome::ReplanTriggered);
                    }
                    if self.sleep_or_cancel(&mut state, cancel.clone()).await {
                        state.status = SentinelStatus::Cancelled;
                        self.checkpoint(step_index, &state).await;
                        return Ok(SentinelOutcome::Cancelled);
                    }
                    if pending_followup.is_some() {
                        return Ok(SentinelOutcome::ReplanTriggered);
                    }
                    continue;
                }
            };

            let satisfied = match condition {
                Either::Left(target) => {
                    state.executions_completed += 1;
                    state.accumulated_observations.push(format!(
                        "execution {}/{target}: {response_text}",
                        state.executions_completed
                    ));
                    state.executions_completed >= *target
                }
                Either::Right(text_condition) => {
                    let check = self.checker.check_condition(&core.details, text_condition, &response_text).await?;
                    state.last_check_result = check.condition_met;
                    state.accumulated_observations.push(format!("{}: {}", check.condition_met, check.reason));
                    state.current_sleep_seconds = self.config.clamp_sleep(check.sleep_duration as u64).as_secs() as u32;
                    check.condition_met
                }
            };

            self.bus.publish(BusPayload::SentinelObservation {
                step_index,
                execution: state.executions_completed,
                observation: state.accumulated_observations.last().cloned().unwrap_or_default(),
            });

            if satisfied {
                info!(step_index, executions = state.executions_completed, "sentinel condition satisfied");
                state.status = SentinelStatus::Completed;
                self.checkpoint(step_index, &state).await;
                return Ok(SentinelOutcome::Completed);
            }

            self.checkpoint(step_index, &state).await;

            if pending_followup.is_some() {
                return Ok(SentinelOutcome::ReplanTriggered);
            }

            if self.sleep_or_cancel(&mut state, cancel.clone()).await {
                state.status = SentinelStatus::Cancelled;
                self.checkpoint(step_index, &state).await;
                return Ok(SentinelOutcome::Cancelled);
            }

            if pending_followup.is_some() {
                return Ok(SentinelOutcome::ReplanTriggered);
            }
        }
    }

    /// Sleeps `state.current_sleep_seconds`, returning `true` if
    /// cancellation preempted the sleep. Uses `tokio_util`'s token, whose
    /// `cancelled()` future wakes immediately — unlike a hand-rolled
    /// polled flag — satisfying the ≤1s cancellation latency bound.
    async fn sleep_or_cancel(&self, state: &mut SentinelState, cancel: CancellationToken) -> bool {
        state.next_wake_time = Utc::now() + chrono::Duration::seconds(state.current_sleep_seconds as i64);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(Duration::from_secs(state.current_sleep_seconds as u64)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentEvent, AgentResponse, AgentStream};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    struct CountingAgent {
        calls: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn name(&self) -> &str {
            "watcher_agent"
        }
        fn description(&self) -> &str {
            "watches things"
        }
        fn produced_message_types(&self) -> &[&'static str] {
            &["text"]
        }
        async fn stream(&self, _messages: &[ChatMessage], _cancel: CancellationToken) -> anyhow::Result<AgentStream> {
            *self.calls.lock().unwrap() += 1;
            let response = AgentResponse { message: ChatMessage::text(0, "watcher_agent", "checked"), usage: None };
            Ok(Box::pin(stream::once(async move { AgentEvent::Final(response) })))
        }
    }

    struct AlwaysMet;
    #[async_trait]
    impl ConditionChecker for AlwaysMet {
        async fn check_condition(&self, _d: &str, _c: &str, _r: &str) -> OrchestratorResult<ConditionCheck> {
            Ok(ConditionCheck { condition_met: true, reason: "done".into(), sleep_duration: 10, sleep_duration_reason: "n/a".into() })
        }
    }

    fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.min_sleep = Duration::from_millis(1);
        config.max_sleep = Duration::from_secs(1);
        config
    }

    #[tokio::test]
    async fn integer_condition_completes_after_n_executions() {
        let calls = Arc::new(Mutex::new(0));
        let team = TeamRegistry::new(vec![Arc::new(CountingAgent { calls: calls.clone() })]);
        let bus = MessageBus::new();
        let checker = AlwaysMet;
        let config = fast_config();
        let scheduler = SentinelScheduler::new(&config, &team, &bus, &checker);

        let core = StepCore { title: "watch".into(), details: "check status".into(), agent_name: "watcher_agent".into() };
        let mut history = Vec::new();
        let mut followup = None;
        let outcome = scheduler
            .run(0, &core, &Either::Left(3), 0, &mut history, CancellationToken::new(), &mut followup)
            .await
            .unwrap();

        assert_eq!(outcome, SentinelOutcome::Completed);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn text_condition_completes_when_checker_reports_met() {
        let calls = Arc::new(Mutex::new(0));
        let team = TeamRegistry::new(vec![Arc::new(CountingAgent { calls: calls.clone() })]);
        let bus = MessageBus::new();
        let checker = AlwaysMet;
        let config = fast_config();
        let scheduler = SentinelScheduler::new(&config, &team, &bus, &checker);

        let core = StepCore { title: "watch".into(), details: "check status".into(), agent_name: "watcher_agent".into() };
        let mut history = Vec::new();
        let mut followup = None;
        let outcome = scheduler
            .run(0, &core, &Either::Right("has it happened?".into()), 0, &mut history, CancellationToken::new(), &mut followup)
            .await
            .unwrap();

        assert_eq!(outcome, SentinelOutcome::Completed);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn cancellation_before_first_dispatch_ends_immediately() {
        let calls = Arc::new(Mutex::new(0));
        let team = TeamRegistry::new(vec![Arc::new(CountingAgent { calls: calls.clone() })]);
        let bus = MessageBus::new();
        let checker = AlwaysMet;
        let config = fast_config();
        let scheduler = SentinelScheduler::new(&config, &team, &bus, &checker);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let core = StepCore { title: "watch".into(), details: "check status".into(), agent_name: "watcher_agent".into() };
        let mut history = Vec::new();
        let mut followup = None;
        let outcome = scheduler.run(0, &core, &Either::Left(5), 0, &mut history, cancel, &mut followup).await.unwrap();

        assert_eq!(outcome, SentinelOutcome::Cancelled);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    struct RecordingCheckpointer {
        snapshots: Mutex<Vec<(usize, SentinelStatus, u32)>>,
    }

    #[async_trait]
    impl Checkpointer for RecordingCheckpointer {
        async fn save(&self, step_index: usize, state: &SentinelState) {
            self.snapshots.lock().unwrap().push((step_index, state.status, state.executions_completed));
        }
    }

    #[tokio::test]
    async fn checkpointer_observes_a_snapshot_per_execution_and_the_terminal_status() {
        let calls = Arc::new(Mutex::new(0));
        let team = TeamRegistry::new(vec![Arc::new(CountingAgent { calls: calls.clone() })]);
        let bus = MessageBus::new();
        let checker = AlwaysMet;
        let config = fast_config();
        let checkpointer = RecordingCheckpointer { snapshots: Mutex::new(Vec::new()) };
        let scheduler = SentinelScheduler::new(&config, &team, &bus, &checker).with_checkpointer(&checkpointer);

        let core = StepCore { title: "watch".into(), details: "check status".into(), agent_name: "watcher_agent".into() };
        let mut history = Vec::new();
        let mut followup = None;
        let outcome = scheduler
            .run(0, &core, &Either::Left(2), 0, &mut history, CancellationToken::new(), &mut followup)
            .await
            .unwrap();

        assert_eq!(outcome, SentinelOutcome::Completed);
        let snapshots = checkpointer.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0], (0, SentinelStatus::Running, 1));
        assert_eq!(snapshots[1], (0, SentinelStatus::Completed, 2));
    }
}
