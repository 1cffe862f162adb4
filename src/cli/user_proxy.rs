use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use colored::Colorize;
use futures::stream;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentEvent, AgentResponse, AgentStream};
use crate::message::ChatMessage;
use crate::team::USER_PROXY;

/// Backs the `user_proxy` team member with the real terminal (§3's "a
/// designated name `user_proxy` denotes the human in the loop"). The
/// instruction is printed and a reply is read with `rustyline`, the same
/// editor the teacher's `cli/interface.rs` uses for task input.
pub struct UserProxyAgent {
    editor: Mutex<DefaultEditor>,
}

impl UserProxyAgent {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { editor: Mutex::new(DefaultEditor::new()?) })
    }
}

#[async_trait]
impl Agent for UserProxyAgent {
    fn name(&self) -> &str {
        USER_PROXY
    }

    fn description(&self) -> &str {
        "the human operating this session"
    }

    fn produced_message_types(&self) -> &[&'static str] {
        &["text"]
    }

    async fn stream(&self, messages: &[ChatMessage], _cancel: CancellationToken) -> anyhow::Result<AgentStream> {
        let prompt = messages.last().map(ChatMessage::to_text).unwrap_or_default();
        println!("{}", prompt.cyan());

        // rustyline's reader blocks the thread; park it off the async task so
        // the rest of the orchestrator loop isn't stalled on terminal I/O.
        let line = tokio::task::block_in_place(|| {
            let mut editor = self.editor.lock().unwrap();
            let line = editor.readline("you> ").context("reading user input")?;
            editor.add_history_entry(line.as_str()).ok();
            Ok::<_, anyhow::Error>(line)
        })?;

        let response = AgentResponse { message: ChatMessage::text(0, USER_PROXY, line), usage: None };
        Ok(Box::pin(stream::once(async move { AgentEvent::Final(response) })))
    }
}
