//! The top-level controller (§4.3, component D): plan acquisition, step
//! dispatch, replanning, and finalization. Ties together the LLM protocol
//! layer, team dispatch, sentinel scheduler, and message bus for one
//! session. Grounded on the teacher's `orchestrator/orchestrator.rs`
//! `Orchestrator` struct and its `set_internal_variables` /
//! `orchestrator_step_execution` flow, generalized from the teacher's
//! single hard-coded team to the configurable team + config of this crate.

pub mod state;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{BusPayload, MessageBus};
use crate::config::{OrchestratorConfig, RetrieveRelevantPlans};
use crate::container::ContainerResource;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ledger::ProgressLedger;
use crate::llm::client::LlmClient;
use crate::llm::prompts::format_instruction;
use crate::llm::protocol::LlmProtocol;
use crate::memory::MemoryProvider;
use crate::message::{ChatMessage, ChatMessageKind};
use crate::plan::{Plan, Step};
use crate::sentinel::{Checkpointer, SentinelOutcome, SentinelScheduler};
use crate::task::{MediaRef, Task};
use crate::team::{Team, TeamRegistry, USER_PROXY};

use state::{DispatchFingerprint, OrchestratorState, Phase};

/// What the session ended with, handed back to the caller alongside the
/// final message already published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    FinalAnswer(String),
    Cancelled,
    GaveUp(String),
}

/// Runs one user session to completion (§3 "OrchestratorState" owner,
/// §4.3's state machine). Instantiated fresh per session; the LLM client,
/// team, and memory provider are shared infrastructure passed in by the
/// caller, matching §9's "no global state".
pub struct Orchestrator<'a> {
    config: &'a OrchestratorConfig,
    team: &'a Team,
    registry: &'a TeamRegistry,
    bus: &'a MessageBus,
    protocol: LlmProtocol<'a>,
    memory: Option<&'a dyn MemoryProvider>,
    container: Option<&'a dyn ContainerResource>,
    checkpointer: Option<&'a dyn Checkpointer>,
    state: OrchestratorState,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a OrchestratorConfig,
        team: &'a Team,
        registry: &'a TeamRegistry,
        llm_client: &'a dyn LlmClient,
        bus: &'a MessageBus,
        memory: Option<&'a dyn MemoryProvider>,
        container: Option<&'a dyn ContainerResource>,
        cancel: CancellationToken,
    ) -> OrchestratorResult<Self> {
        if team.names().next().is_none() {
            return Err(OrchestratorError::EmptyTeam);
        }
        Ok(Self {
            config,
            team,
            registry,
            bus,
            protocol: LlmProtocol::new(llm_client, config, bus),
            memory,
            container,
            checkpointer: None,
            state: OrchestratorState::new(),
            cancel,
        })
    }

    /// Attaches a sentinel checkpoint sink (§4.4, optional persistence).
    /// Without one, sentinel steps still run correctly; nothing is ever
    /// written to durable storage.
    pub fn with_checkpointer(mut self, checkpointer: &'a dyn Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Queues a message delivered out-of-band while the session is mid
    /// turn (§4.3's `allow_follow_up_input`, §4.4's sentinel follow-up
    /// precedence). Checked at the next loop checkpoint; never acted on
    /// mid-dispatch.
    pub fn inject_follow_up(&mut self, message: ChatMessage) {
        if self.config.allow_follow_up_input {
            self.state.pending_followup = Some(message);
        }
    }

    /// Drives the full state machine for `task` to a terminal outcome
    /// (§3's `AwaitingTask → Planning → Executing → (Replanning →
    /// Planning | Finalizing) → Terminal`).
    pub async fn run(&mut self, task: &Task) -> OrchestratorResult<SessionOutcome> {
        self.state.phase = Phase::Planning;
        match self.acquire_plan(&task.description, &task.media).await {
            Ok(plan) => {
                if !plan.needs_plan {
                    self.bus.publish(BusPayload::FinalAnswer(plan.response.clone()));
                    self.enter_terminal().await;
                    return Ok(SessionOutcome::FinalAnswer(plan.response));
                }
                self.bus.publish(BusPayload::PlanAnnounced(plan.clone()));
                self.state.reset_for_new_plan(plan);
            }
            Err(err) => {
                self.bus.publish_error(&err);
                return self.finalize(&task.description, &task.media, "planning failed").await;
            }
        }

        self.state.phase = Phase::Executing;
        loop {
            if self.cancel.is_cancelled() {
                self.bus.publish(BusPayload::Cancelled);
                self.enter_terminal().await;
                return Ok(SessionOutcome::Cancelled);
            }

            match self.execute_one_turn(&task.description, &task.media).await? {
                TurnResult::Continue => continue,
                TurnResult::Replan => {
                    self.state.replan_count += 1;
                    if self.state.replan_count > self.config.max_replans {
                        return self.finalize(&task.description, &task.media, "too many replans were needed").await;
                    }
                    self.state.phase = Phase::Replanning;
                    let prior = self.state.plan.clone().expect("replanning requires a prior plan");
                    match self
                        .protocol
                        .replan(&task.description, &prior, self.team, &self.state.transcript, self.config.sentinel_tasks_enabled, &task.media)
                        .await
                        .and_then(|p| {
                            p.validate(self.team)
                                .map(|_| p)
                                .map_err(|e| OrchestratorError::ProtocolFailure { stage: "replan", detail: e.to_string() })
                        })
                    {
                        Ok(new_plan) => {
                            self.bus.publish(BusPayload::PlanAnnounced(new_plan.clone()));
                            self.state.reset_for_new_plan(new_plan);
                            self.state.phase = Phase::Executing;
                        }
                        Err(err) => {
                            self.bus.publish_error(&err);
                            return self.finalize(&task.description, &task.media, "replanning failed").await;
                        }
                    }
                }
                TurnResult::Finalize => return self.finalize(&task.description, &task.media, "plan complete").await,
                TurnResult::Cancelled => {
                    self.bus.publish(BusPayload::Cancelled);
                    self.enter_terminal().await;
                    return Ok(SessionOutcome::Cancelled);
                }
            }
        }
    }

    /// Planning phase (§4.3 "Planning"): consults the memory provider
    /// under `retrieve_relevant_plans`, then calls the LLM unless a
    /// high-confidence reuse candidate short-circuits it. In cooperative,
    /// non-autonomous mode, the plan is relayed to `user_proxy` for
    /// approval before execution begins.
    async fn acquire_plan(&mut self, task_description: &str, media: &[MediaRef]) -> OrchestratorResult<Plan> {
        let mut hints = Vec::new();
        if let Some(memory) = self.memory {
            if !matches!(self.config.retrieve_relevant_plans, RetrieveRelevantPlans::Off) {
                let mut candidates = memory.suggest_plans(task_description).await?;
                match self.config.retrieve_relevant_plans {
                    RetrieveRelevantPlans::Reuse if !candidates.is_empty() => {
                        // Highest-scoring candidate is first by contract; the rest become hints
                        // for a future planning call (resolved Open Question, §9).
                        let best = candidates.remove(0);
                        if best.validate(self.team).is_ok() {
                            return Ok(best);
                        }
                    }
                    RetrieveRelevantPlans::Hint => hints = candidates,
                    _ => {}
                }
            }
        }

        let plan = self.protocol.plan(task_description, self.team, &hints, self.config.sentinel_tasks_enabled, media).await?;
        let plan = match plan.validate(self.team) {
            Ok(()) => plan,
            Err(first_reason) => {
                // §4.3 tie-break: a plan referencing an unknown agent is a protocol
                // failure worth one retry before giving up on planning entirely.
                warn!(reason = %first_reason, "planned steps failed validation, retrying plan once");
                self.bus.publish(BusPayload::Error(format!("plan failed validation ({first_reason}), retrying once")));
                let retried = self.protocol.plan(task_description, self.team, &hints, self.config.sentinel_tasks_enabled, media).await?;
                retried
                    .validate(self.team)
                    .map_err(|e| OrchestratorError::ProtocolFailure { stage: "plan", detail: e.to_string() })?;
                retried
            }
        };

        if !plan.needs_plan {
            if self.config.cooperative_planning && self.team.has_user_proxy() {
                return self.clarify_direct_answer(task_description, media, plan).await;
            }
            return Ok(plan);
        }

        if !self.config.autonomous_execution && self.team.has_user_proxy() {
            return self.confirm_plan_with_user(plan).await;
        }
        Ok(plan)
    }

    /// `cooperative_planning` gate (§4.3): a direct answer still gets run
    /// past `user_proxy` before going terminal. A bare acknowledgement keeps
    /// the answer as-is; a substantive reply is treated as the ambiguity the
    /// config knob exists to catch, and feeds a real replan.
    async fn clarify_direct_answer(&mut self, task_description: &str, media: &[MediaRef], plan: Plan) -> OrchestratorResult<Plan> {
        let instruction = ChatMessage::text(
            0,
            "orchestrator",
            format!("I believe the answer is:\n{}\n\nDoes this fully address what you need, or would you like me to do more?", plan.response),
        );
        let response = self
            .registry
            .dispatch(USER_PROXY, &self.state.transcript, instruction, self.bus, self.cancel.clone(), self.config.per_agent_timeout)
            .await?;
        let reply = response.to_text();
        self.state.push_transcript(response);

        if is_affirmative(&reply) {
            return Ok(plan);
        }

        let clarified = self
            .protocol
            .replan(task_description, &plan, self.team, &self.state.transcript, self.config.sentinel_tasks_enabled, media)
            .await?;
        clarified.validate(self.team).map_err(|e| OrchestratorError::ProtocolFailure { stage: "plan", detail: e.to_string() })?;
        Ok(clarified)
    }

    /// Relays the plan to `user_proxy` for approval (§4.3 "Plan edits",
    /// cooperative mode). A reply carrying a structured replacement plan is
    /// validated and spliced in from `step_index` (clamped) onward; any
    /// other reply is treated as acceptance of the plan as proposed.
    async fn confirm_plan_with_user(&mut self, plan: Plan) -> OrchestratorResult<Plan> {
        let instruction = ChatMessage::text(
            0,
            "orchestrator",
            format!("Here is the proposed plan, please confirm or reply with a replacement plan as JSON:\n{}", plan.pretty()),
        );
        let response = self
            .registry
            .dispatch(USER_PROXY, &self.state.transcript, instruction, self.bus, self.cancel.clone(), self.config.per_agent_timeout)
            .await?;
        let reply = response.to_text();
        self.state.push_transcript(response);

        match self.try_parse_plan_edit(&reply) {
            Some(edited) => {
                info!(step_index = self.state.step_index, "applying user-supplied plan edit");
                Ok(edited)
            }
            None => Ok(plan),
        }
    }

    /// Attempts to read `reply` as a structured replacement `Plan` (§4.3
    /// "Plan edits"). Steps before the current `step_index` (already
    /// dispatched) are kept from the plan on record; the edit's steps are
    /// spliced in from that point on, clamped to the plan's current length.
    fn try_parse_plan_edit(&self, reply: &str) -> Option<Plan> {
        let value = crate::llm::parse::extract_json(reply).ok()?;
        crate::llm::validate::validate_plan_json(&value, self.config.sentinel_tasks_enabled).ok()?;
        let edit: Plan = serde_json::from_value(value).ok()?;
        edit.validate(self.team).ok()?;

        let current = self.state.plan.as_ref();
        let splice_at = current.map_or(0, |p| self.state.step_index.min(p.len()));
        let mut steps = current.map_or_else(Vec::new, |p| p.steps[..splice_at].to_vec());
        steps.extend(edit.steps);

        Some(Plan { task: edit.task, plan_summary: edit.plan_summary, needs_plan: true, response: edit.response, steps })
    }

    /// One iteration of the Executing loop body (§4.3 steps 1-6).
    async fn execute_one_turn(&mut self, task_description: &str, media: &[MediaRef]) -> OrchestratorResult<TurnResult> {
        let plan = self.state.plan.clone().expect("Executing phase requires a plan");
        if self.state.step_index >= plan.len() {
            return Ok(TurnResult::Finalize);
        }

        let step = plan.step(self.state.step_index).cloned().expect("bounds checked above");

        if step.is_sentinel() {
            // The scheduler itself checks `pending_followup` at each wake checkpoint
            // (§4.4's resolved Open Question), so it is left untouched here.
            return self.execute_sentinel_step(&step).await;
        }

        if let Some(followup) = self.state.pending_followup.take() {
            self.state.push_transcript(followup);
            if self.config.allow_follow_up_input {
                return Ok(TurnResult::Replan);
            }
        }

        let eligible = self.team.dispatch_eligible_names(self.config.autonomous_execution);
        let ledger = match self.request_ledger(task_description, &plan, &eligible, media).await {
            Ok(ledger) => ledger,
            Err(err @ OrchestratorError::ProtocolFailure { .. }) => {
                // §4.3 tie-break: a ledger call that fails, or names an unknown
                // agent, is worth one retry before forcing a replan.
                warn!(step = self.state.step_index, %err, "ledger call failed, retrying once before forcing replan");
                match self.request_ledger(task_description, &plan, &eligible, media).await {
                    Ok(ledger) => ledger,
                    Err(err) => {
                        warn!(step = self.state.step_index, %err, "ledger call failed again after retry, forcing replan");
                        self.bus.publish_error(&err);
                        return Ok(TurnResult::Replan);
                    }
                }
            }
            Err(other) => return Err(other),
        };

        self.bus.publish(BusPayload::ProgressSummary(ledger.progress_summary.clone()));

        if ledger.need_to_replan.answer {
            return Ok(TurnResult::Replan);
        }

        if ledger.is_current_step_complete.answer {
            self.state.step_index += 1;
            self.state.step_attempts = 0;
            return Ok(TurnResult::Continue);
        }

        self.dispatch_step_instruction(&step, &ledger).await
    }

    /// One ledger call plus its cross-field validation, folded into a
    /// single `ProtocolFailure` so the caller can retry the whole thing
    /// uniformly regardless of which half failed (§4.3 tie-break).
    async fn request_ledger(
        &self,
        task_description: &str,
        plan: &Plan,
        eligible: &[String],
        media: &[MediaRef],
    ) -> OrchestratorResult<ProgressLedger> {
        let ledger = self.protocol.ledger(task_description, plan, &self.state.transcript, eligible, media).await?;
        ledger
            .validate(self.team)
            .map_err(|e| OrchestratorError::ProtocolFailure { stage: "ledger", detail: e.to_string() })?;
        Ok(ledger)
    }

    async fn dispatch_step_instruction(&mut self, step: &Step, ledger: &ProgressLedger) -> OrchestratorResult<TurnResult> {
        let core = step.core();
        let agent_name = ledger.instruction_or_question.agent_name.clone();

        let fingerprint = DispatchFingerprint {
            agent_name: agent_name.clone(),
            instruction: ledger.instruction_or_question.answer.clone(),
            step_index: self.state.step_index,
        };
        if self.state.record_dispatch_and_check_loop(fingerprint) {
            let err = OrchestratorError::LoopDetected { agent: agent_name.clone(), instruction: ledger.instruction_or_question.answer.clone() };
            warn!(%agent_name, step = self.state.step_index, "identical instruction repeated, forcing replan");
            self.bus.publish_error(&err);
            return Ok(TurnResult::Replan);
        }

        let rendered = format_instruction(self.state.step_index, &core.title, &core.details, &agent_name, &ledger.instruction_or_question.answer);
        self.bus.publish(BusPayload::StepInstruction {
            step_index: self.state.step_index,
            agent_name: agent_name.clone(),
            instruction: rendered.clone(),
        });

        let instruction = ChatMessage::text(0, "orchestrator", rendered).with_kind(ChatMessageKind::Text);
        let dispatch = self
            .registry
            .dispatch(&agent_name, &self.state.transcript, instruction, self.bus, self.cancel.clone(), self.config.per_agent_timeout)
            .await;

        self.state.step_attempts += 1;

        match dispatch {
            Ok(response) => {
                self.bus.publish(BusPayload::AgentMessage(response.clone()));
                self.state.push_transcript(response);
            }
            Err(OrchestratorError::Cancelled) => return Ok(TurnResult::Cancelled),
            Err(err) => {
                self.bus.publish_error(&err);
            }
        }

        if self.state.step_attempts >= self.config.max_stalls_before_replan {
            return Ok(TurnResult::Replan);
        }
        Ok(TurnResult::Continue)
    }

    async fn execute_sentinel_step(&mut self, step: &Step) -> OrchestratorResult<TurnResult> {
        let Step::Sentinel { core, sleep_duration_seconds, condition } = step else {
            unreachable!("caller checked is_sentinel");
        };
        let mut scheduler = SentinelScheduler::new(self.config, self.registry, self.bus, &self.protocol);
        if let Some(checkpointer) = self.checkpointer {
            scheduler = scheduler.with_checkpointer(checkpointer);
        }
        let outcome = scheduler
            .run(
                self.state.step_index,
                core,
                condition,
                *sleep_duration_seconds,
                &mut self.state.transcript,
                self.cancel.clone(),
                &mut self.state.pending_followup,
            )
            .await?;

        match outcome {
            SentinelOutcome::Completed => {
                self.state.step_index += 1;
                self.state.step_attempts = 0;
                Ok(TurnResult::Continue)
            }
            SentinelOutcome::ReplanTriggered => Ok(TurnResult::Replan),
            SentinelOutcome::Cancelled => Ok(TurnResult::Cancelled),
        }
    }

    /// Finalizing phase (§4.3): synthesizes and emits the final answer,
    /// transitioning to Terminal. Used both for ordinary completion and
    /// for a "gave up" note when replans are exhausted (§4.3's
    /// `max_replans` policy).
    async fn finalize(&mut self, task_description: &str, media: &[MediaRef], reason: &str) -> OrchestratorResult<SessionOutcome> {
        self.state.phase = Phase::Finalizing;
        info!(reason, "entering finalizing phase");
        let outcome = match self.protocol.final_answer(task_description, &self.state.transcript, media).await {
            Ok(answer) => {
                self.bus.publish(BusPayload::FinalAnswer(answer.clone()));
                SessionOutcome::FinalAnswer(answer)
            }
            Err(err) => {
                let note = format!("{reason}: {err}");
                self.bus.publish(BusPayload::FinalAnswer(note.clone()));
                SessionOutcome::GaveUp(note)
            }
        };
        self.enter_terminal().await;
        Ok(outcome)
    }

    /// Transitions to `Terminal` and releases the session's container
    /// resource, per §5's "owned by the session and released on
    /// Terminal" — the orchestrator's only responsibility toward it.
    async fn enter_terminal(&mut self) {
        self.state.phase = Phase::Terminal;
        if let Some(container) = self.container {
            container.stop().await;
            container.remove().await;
        }
    }
}

enum TurnResult {
    Continue,
    Replan,
    Finalize,
    Cancelled,
}

/// Whether a `user_proxy` reply to a cooperative-planning clarification
/// turn should be read as a bare acknowledgement rather than substantive
/// feedback (§4.3's `cooperative_planning` knob).
fn is_affirmative(reply: &str) -> bool {
    let trimmed = reply.trim().trim_end_matches(|c| c == '.' || c == '!').to_ascii_lowercase();
    trimmed.is_empty()
        || matches!(
            trimmed.as_str(),
            "yes" | "y" | "yep" | "yeah" | "ok" | "okay" | "looks good" | "sounds good" | "that's fine" | "that works" | "no" | "no thanks" | "nothing else"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentEvent, AgentResponse, AgentStream};
    use crate::llm::client::{Completion, CompletionStream};
    use crate::team::AgentDescriptor;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    struct EchoAgent {
        name: &'static str,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes back"
        }
        fn produced_message_types(&self) -> &[&'static str] {
            &["text"]
        }
        async fn stream(&self, _messages: &[ChatMessage], _cancel: CancellationToken) -> anyhow::Result<AgentStream> {
            let response = AgentResponse { message: ChatMessage::text(0, self.name, "done"), usage: None };
            Ok(Box::pin(stream::once(async move { AgentEvent::Final(response) })))
        }
    }

    /// A scripted LLM client that returns canned JSON responses in order,
    /// enough to drive the orchestrator through one direct-answer session
    /// without a real model.
    struct ScriptedClient {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn vision(&self) -> bool {
            false
        }
        async fn complete(&self, _messages: &[crate::message::LlmMessage]) -> OrchestratorResult<Completion> {
            let text = self.responses.lock().unwrap().remove(0);
            Ok(Completion { text, prompt_tokens: 0, completion_tokens: 0 })
        }
        async fn complete_stream(&self, _messages: &[crate::message::LlmMessage]) -> OrchestratorResult<CompletionStream> {
            let text = self.responses.lock().unwrap().remove(0);
            Ok(Box::pin(stream::once(async move { text })))
        }
    }

    #[tokio::test]
    async fn direct_answer_task_skips_dispatch_and_goes_terminal() {
        let team = Team::new(vec![AgentDescriptor::new("coder_agent", "writes code")]).unwrap();
        let registry = TeamRegistry::new(vec![Arc::new(EchoAgent { name: "coder_agent" })]);
        let bus = MessageBus::new();
        let config = OrchestratorConfig::default();
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                r#"{"task":"paraphrase","needs_plan":false,"response":"A swift brown fox leaps over a sluggish dog.","plan_summary":"","steps":[]}"#
                    .to_string(),
            ]),
        };

        let mut orchestrator = Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, CancellationToken::new()).unwrap();
        let task = Task::new("Paraphrase: 'The quick brown fox jumps over the lazy dog.'");
        let outcome = orchestrator.run(&task).await.unwrap();

        assert_eq!(outcome, SessionOutcome::FinalAnswer("A swift brown fox leaps over a sluggish dog.".to_string()));
    }

    #[tokio::test]
    async fn empty_team_fails_construction() {
        let team_err = Team::new(vec![]);
        assert!(team_err.is_err());
    }
}
