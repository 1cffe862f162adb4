//! Drives `Orchestrator::run` end to end against fake in-process agents and
//! a scripted LLM client, exercising the full plan/ledger/dispatch/replan
//! state machine without a real model or real agents.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use magentic_orchestrator::agent::{Agent, AgentEvent, AgentResponse, AgentStream};
use magentic_orchestrator::llm::client::{Completion, CompletionStream, LlmClient};
use magentic_orchestrator::message::{ChatMessage, LlmMessage};
use magentic_orchestrator::team::AgentDescriptor;
use magentic_orchestrator::{BusPayload, MessageBus, Orchestrator, OrchestratorConfig, SessionOutcome, Task, Team, TeamRegistry};

struct EchoAgent {
    name: &'static str,
    calls: Arc<Mutex<u32>>,
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "echoes back that it handled the instruction"
    }
    fn produced_message_types(&self) -> &[&'static str] {
        &["text"]
    }
    async fn stream(&self, _messages: &[ChatMessage], _cancel: CancellationToken) -> anyhow::Result<AgentStream> {
        *self.calls.lock().unwrap() += 1;
        let response = AgentResponse { message: ChatMessage::text(0, self.name, format!("{} is done", self.name)), usage: None };
        Ok(Box::pin(stream::once(async move { AgentEvent::Final(response) })))
    }
}

/// Returns canned completions/streams in call order. Every protocol call
/// (plan, ledger, replan, final_answer) goes through this in this crate,
/// so scripting the sequence in the order `Orchestrator::run` issues them
/// is enough to drive an entire session deterministically.
struct ScriptedClient {
    responses: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(responses: Vec<String>) -> Self {
        Self { responses: Mutex::new(responses) }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn vision(&self) -> bool {
        false
    }
    async fn complete(&self, _messages: &[LlmMessage]) -> magentic_orchestrator::OrchestratorResult<Completion> {
        let text = self.responses.lock().unwrap().remove(0);
        Ok(Completion { text, prompt_tokens: 0, completion_tokens: 0 })
    }
    async fn complete_stream(&self, _messages: &[LlmMessage]) -> magentic_orchestrator::OrchestratorResult<CompletionStream> {
        let text = self.responses.lock().unwrap().remove(0);
        Ok(Box::pin(stream::once(async move { text })))
    }
}

fn ledger_json(complete: bool, agent_name: &str) -> String {
    format!(
        r#"{{"is_current_step_complete":{{"answer":{complete},"reason":"r"}},
            "need_to_replan":{{"answer":false,"reason":"r"}},
            "instruction_or_question":{{"answer":"go","agent_name":"{agent_name}"}},
            "progress_summary":"working"}}"#
    )
}

#[tokio::test]
async fn two_step_plan_dispatches_each_agent_once_in_order() {
    let web_calls = Arc::new(Mutex::new(0));
    let coder_calls = Arc::new(Mutex::new(0));
    let team = Team::new(vec![AgentDescriptor::new("web_surfer", "browses"), AgentDescriptor::new("coder_agent", "codes")]).unwrap();
    let registry = TeamRegistry::new(vec![
        Arc::new(EchoAgent { name: "web_surfer", calls: web_calls.clone() }),
        Arc::new(EchoAgent { name: "coder_agent", calls: coder_calls.clone() }),
    ]);
    let bus = MessageBus::new();
    let config = OrchestratorConfig::default();

    let plan = r#"{"task":"build it","needs_plan":true,"response":"","plan_summary":"two steps",
        "steps":[
            {"title":"look it up","details":"find the repo","agent_name":"web_surfer"},
            {"title":"run it","details":"execute the starter code","agent_name":"coder_agent"}
        ]}"#;
    let client = ScriptedClient::new(vec![
        plan.to_string(),
        ledger_json(false, "web_surfer"),
        ledger_json(true, "web_surfer"),
        ledger_json(false, "coder_agent"),
        ledger_json(true, "coder_agent"),
        "Both steps finished successfully.".to_string(),
    ]);

    let mut orchestrator =
        Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, CancellationToken::new()).unwrap();
    let task = Task::new("Execute the starter code for the autogen repo.");
    let outcome = orchestrator.run(&task).await.unwrap();

    assert_eq!(outcome, SessionOutcome::FinalAnswer("Both steps finished successfully.".to_string()));
    assert_eq!(*web_calls.lock().unwrap(), 1);
    assert_eq!(*coder_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn stalling_past_max_stalls_forces_a_replan() {
    let calls = Arc::new(Mutex::new(0));
    let team = Team::new(vec![AgentDescriptor::new("coder_agent", "codes")]).unwrap();
    let registry = TeamRegistry::new(vec![Arc::new(EchoAgent { name: "coder_agent", calls: calls.clone() })]);
    let bus = MessageBus::new();
    let mut config = OrchestratorConfig::default();
    config.max_stalls_before_replan = 2;

    let first_plan = r#"{"task":"t","needs_plan":true,"response":"","plan_summary":"s",
        "steps":[{"title":"a","details":"b","agent_name":"coder_agent"}]}"#;
    let replanned = r#"{"task":"t","needs_plan":true,"response":"","plan_summary":"retry",
        "steps":[{"title":"a2","details":"b2","agent_name":"coder_agent"}]}"#;
    let client = ScriptedClient::new(vec![
        first_plan.to_string(),
        ledger_json(false, "coder_agent"),
        ledger_json(false, "coder_agent"),
        replanned.to_string(),
        ledger_json(false, "coder_agent"),
        ledger_json(true, "coder_agent"),
        "Finished after one replan.".to_string(),
    ]);

    let mut orchestrator =
        Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, CancellationToken::new()).unwrap();
    let task = Task::new("do the thing");
    let outcome = orchestrator.run(&task).await.unwrap();

    assert_eq!(outcome, SessionOutcome::FinalAnswer("Finished after one replan.".to_string()));
    assert_eq!(*calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn cancellation_before_run_ends_the_session_as_cancelled() {
    let team = Team::new(vec![AgentDescriptor::new("coder_agent", "codes")]).unwrap();
    let registry = TeamRegistry::new(vec![Arc::new(EchoAgent { name: "coder_agent", calls: Arc::new(Mutex::new(0)) })]);
    let bus = MessageBus::new();
    let config = OrchestratorConfig::default();

    let plan = r#"{"task":"t","needs_plan":true,"response":"","plan_summary":"s",
        "steps":[{"title":"a","details":"b","agent_name":"coder_agent"}]}"#;
    let client = ScriptedClient::new(vec![plan.to_string()]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut orchestrator = Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, cancel).unwrap();
    let task = Task::new("do the thing");
    let outcome = orchestrator.run(&task).await.unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
}

#[tokio::test]
async fn ledger_naming_an_unknown_agent_is_retried_once_before_dispatch() {
    let calls = Arc::new(Mutex::new(0));
    let team = Team::new(vec![AgentDescriptor::new("coder_agent", "codes")]).unwrap();
    let registry = TeamRegistry::new(vec![Arc::new(EchoAgent { name: "coder_agent", calls: calls.clone() })]);
    let bus = MessageBus::new();
    let config = OrchestratorConfig::default();

    let plan = r#"{"task":"t","needs_plan":true,"response":"","plan_summary":"s",
        "steps":[{"title":"a","details":"b","agent_name":"coder_agent"}]}"#;
    let client = ScriptedClient::new(vec![
        plan.to_string(),
        ledger_json(false, "ghost_agent"),
        ledger_json(true, "coder_agent"),
        "Recovered after one bad ledger call.".to_string(),
    ]);

    let mut orchestrator =
        Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, CancellationToken::new()).unwrap();
    let task = Task::new("do the thing");
    let outcome = orchestrator.run(&task).await.unwrap();

    assert_eq!(outcome, SessionOutcome::FinalAnswer("Recovered after one bad ledger call.".to_string()));
    // The ledger naming "ghost_agent" never resolves to a dispatch; only the
    // retried, valid ledger call ever reaches the agent, and it reports the
    // step already complete, so the agent itself is never called.
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn identical_instruction_four_times_trips_the_loop_guard_and_publishes_an_error() {
    let calls = Arc::new(Mutex::new(0));
    let team = Team::new(vec![AgentDescriptor::new("coder_agent", "codes")]).unwrap();
    let registry = TeamRegistry::new(vec![Arc::new(EchoAgent { name: "coder_agent", calls: calls.clone() })]);
    let bus = MessageBus::new();
    let mut config = OrchestratorConfig::default();
    config.max_stalls_before_replan = 10;

    let subscription = bus.subscribe();

    let plan = r#"{"task":"t","needs_plan":true,"response":"","plan_summary":"s",
        "steps":[{"title":"a","details":"b","agent_name":"coder_agent"}]}"#;
    let replanned = r#"{"task":"t","needs_plan":false,"response":"giving up on this step","plan_summary":"","steps":[]}"#;
    let client = ScriptedClient::new(vec![
        plan.to_string(),
        ledger_json(false, "coder_agent"),
        ledger_json(false, "coder_agent"),
        ledger_json(false, "coder_agent"),
        ledger_json(false, "coder_agent"),
        replanned.to_string(),
        "Gave up after the loop guard tripped.".to_string(),
    ]);

    let mut orchestrator =
        Orchestrator::new(&config, &team, &registry, &client, &bus, None, None, CancellationToken::new()).unwrap();
    let task = Task::new("do the thing");
    let outcome = orchestrator.run(&task).await.unwrap();

    assert_eq!(outcome, SessionOutcome::FinalAnswer("Gave up after the loop guard tripped.".to_string()));
    // The fourth identical instruction trips the guard before a fourth dispatch.
    assert_eq!(*calls.lock().unwrap(), 3);

    let mut saw_loop_detected_error = false;
    while let Ok(event) = subscription.0.try_recv() {
        if let BusPayload::Error(detail) = event.payload {
            if detail.contains("same thing three times in a row") {
                saw_loop_detected_error = true;
            }
        }
    }
    assert!(saw_loop_detected_error, "expected a loop-guard error event on the bus");
}
