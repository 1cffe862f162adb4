pub mod agent;
pub mod bus;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod plan;
pub mod sentinel;
pub mod task;
pub mod team;

pub use agent::{Agent, AgentEvent, AgentResponse, AgentStream};
pub use bus::{BusEvent, BusPayload, MessageBus};
pub use cli::CliInterface;
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Orchestrator, SessionOutcome};
pub use plan::Plan;
pub use sentinel::Checkpointer;
pub use task::Task;
pub use team::{Team, TeamRegistry};
