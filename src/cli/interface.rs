use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::bus::{BusPayload, BusSubscription, MessageBus};
use crate::cli::stub_agent::StubAgent;
use crate::cli::user_proxy::UserProxyAgent;
use crate::config::OrchestratorConfig;
use crate::llm::client::LlmClient;
use crate::orchestrator::{Orchestrator, SessionOutcome};
use crate::task::Task;
use crate::team::{AgentDescriptor, Team, TeamRegistry, USER_PROXY};

/// A REPL that submits tasks to the orchestrator and renders the message
/// bus as they run, generalizing the teacher's `cli/interface.rs` (a
/// `rustyline` + `dialoguer` + `colored` loop around a single hard-coded
/// planning call) to the full plan/ledger/dispatch/replan event set.
pub struct CliInterface {
    config: OrchestratorConfig,
    team: Team,
    registry: TeamRegistry,
    client: Arc<dyn LlmClient>,
    editor: DefaultEditor,
}

impl CliInterface {
    pub fn new(config: OrchestratorConfig, client: Arc<dyn LlmClient>) -> Result<Self> {
        let roster = [
            (USER_PROXY, "the human operating this session"),
            ("web_surfer", "browses the web and reports what it finds"),
            ("coder_agent", "writes and runs code"),
            ("file_surfer", "inspects local files"),
            ("document_generator", "produces documents such as reports or slides"),
        ];
        let team = Team::new(roster.iter().map(|(name, description)| AgentDescriptor::new(*name, *description)).collect())?;

        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(UserProxyAgent::new()?),
            Arc::new(StubAgent::new("web_surfer", roster[1].1, client.clone())),
            Arc::new(StubAgent::new("coder_agent", roster[2].1, client.clone())),
            Arc::new(StubAgent::new("file_surfer", roster[3].1, client.clone())),
            Arc::new(StubAgent::new("document_generator", roster[4].1, client.clone())),
        ];
        let registry = TeamRegistry::new(agents);
        let editor = DefaultEditor::new()?;

        Ok(Self { config, team, registry, client, editor })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "Magentic Orchestrator".bright_cyan().bold());
        println!("{}", "Type a task, or 'exit' to quit.".bright_white());
        println!();

        loop {
            let line = self.editor.readline("> ")?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            self.editor.add_history_entry(trimmed)?;

            if let Err(err) = self.run_session(trimmed).await {
                println!("{} {err}", "Error:".bright_red());
            }

            println!();
            let again = dialoguer::Confirm::new().with_prompt("Would you like to submit another task?").default(true).interact()?;
            if !again {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            println!();
        }

        Ok(())
    }

    async fn run_session(&self, description: &str) -> Result<()> {
        let bus = MessageBus::new();
        let subscription = bus.subscribe();
        let printer = tokio::spawn(print_events(subscription));

        let cancel = CancellationToken::new();
        let outcome = {
            let mut orchestrator =
                Orchestrator::new(&self.config, &self.team, &self.registry, self.client.as_ref(), &bus, None, None, cancel)?;
            let task = Task::new(description);
            orchestrator.run(&task).await?
        };
        drop(bus);
        printer.await.ok();

        match outcome {
            SessionOutcome::FinalAnswer(answer) => println!("{}\n{}", "Final answer:".bright_green().bold(), answer),
            SessionOutcome::Cancelled => println!("{}", "Session cancelled.".yellow()),
            SessionOutcome::GaveUp(reason) => println!("{} {reason}", "Gave up:".bright_red().bold()),
        }
        Ok(())
    }
}

/// Drains one session's bus events onto the terminal until the session's
/// last sender drops. The final answer itself is printed by `run_session`
/// from the returned `SessionOutcome`, not from here, to avoid doubling it.
async fn print_events(subscription: BusSubscription) {
    while let Ok(event) = subscription.0.recv().await {
        match event.payload {
            BusPayload::PlanAnnounced(plan) => {
                println!("{}", "Plan:".bright_yellow().bold());
                print!("{}", plan.pretty());
            }
            BusPayload::StepInstruction { step_index, agent_name, instruction } => {
                println!("{} {}", format!("[step {step_index} -> {agent_name}]").bright_magenta(), instruction.dimmed());
            }
            BusPayload::AgentChunk { .. } => {}
            BusPayload::AgentMessage(message) => {
                println!("{} {}", format!("[{}]", message.source).bright_blue(), message.to_text());
            }
            BusPayload::ProgressSummary(summary) => {
                println!("{} {}", "progress:".dimmed(), summary.dimmed());
            }
            BusPayload::SentinelObservation { step_index, execution, observation } => {
                println!("{}", format!("[sentinel step {step_index}, check {execution}] {observation}").dimmed());
            }
            BusPayload::FinalAnswer(_) => {}
            BusPayload::Error(err) => println!("{} {err}", "error:".bright_red()),
            BusPayload::Cancelled => println!("{}", "cancelled".yellow()),
        }
    }
}
