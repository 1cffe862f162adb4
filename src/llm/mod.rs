pub mod client;
pub mod context;
pub mod parse;
pub mod prompts;
pub mod protocol;
pub mod validate;

pub use client::{Completion, CompletionStream, LlmClient, OpenAiCompatibleClient};
pub use protocol::LlmProtocol;
