use chrono::Utc;
use futures::StreamExt;

use crate::bus::{BusPayload, MessageBus};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ledger::ProgressLedger;
use crate::llm::client::LlmClient;
use crate::llm::context::render_transcript;
use crate::llm::parse::extract_json;
use crate::llm::prompts;
use crate::llm::validate::{validate_condition_check_json, validate_ledger_json, validate_plan_json};
use crate::message::{ChatMessage, LlmMessage};
use crate::plan::Plan;
use crate::sentinel::{ConditionCheck, ConditionChecker};
use crate::task::MediaRef;
use crate::team::Team;

/// The five typed calls of §4.1, each a prompt template + parser +
/// validator + bounded retry, implemented once here so every call shares
/// the same repair-hint retry loop.
pub struct LlmProtocol<'a> {
    client: &'a dyn LlmClient,
    config: &'a OrchestratorConfig,
    bus: &'a MessageBus,
}

impl<'a> LlmProtocol<'a> {
    pub fn new(client: &'a dyn LlmClient, config: &'a OrchestratorConfig, bus: &'a MessageBus) -> Self {
        Self { client, config, bus }
    }

    /// Streams the LLM's tokens onto the bus as they arrive, then performs
    /// one more non-streamed parse validation pass on the assembled text
    /// so a malformed stream still gets the standard retry treatment.
    async fn call_with_retry<F>(&self, stage: &'static str, mut build_messages: F, validate: impl Fn(&serde_json::Value) -> Result<(), crate::llm::validate::ProtocolValidationError>) -> OrchestratorResult<serde_json::Value>
    where
        F: FnMut(Option<&str>) -> Vec<LlmMessage>,
    {
        let mut last_error: Option<String> = None;
        for attempt in 0..self.config.max_json_retries.max(1) {
            let messages = build_messages(last_error.as_deref());
            let text = self.stream_to_bus(&messages).await?;
            match extract_json(&text).map_err(|e| e.to_string()).and_then(|value| {
                validate(&value).map(|_| value).map_err(|e| e.to_string())
            }) {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    last_error = Some(reason);
                    if attempt + 1 == self.config.max_json_retries.max(1) {
                        break;
                    }
                }
            }
        }
        Err(OrchestratorError::ProtocolFailure { stage, detail: last_error.unwrap_or_else(|| "no response".into()) })
    }

    async fn stream_to_bus(&self, messages: &[LlmMessage]) -> OrchestratorResult<String> {
        let mut stream = self.client.complete_stream(messages).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            self.bus.publish(BusPayload::AgentChunk { agent_name: "orchestrator".to_string(), text: chunk.clone() });
            text.push_str(&chunk);
        }
        Ok(text)
    }

    /// Builds the system/user turn pair for one call, attaching `media` to
    /// the first user turn only (§3/§6.2) — a repair-hint retry re-sends
    /// plain text, since the model already saw the attachments once.
    fn messages_with_hint(&self, system: String, user: String, media: &[MediaRef], hint: Option<&str>) -> Vec<LlmMessage> {
        let mut messages = vec![LlmMessage::system(system), LlmMessage::User { content: user, media: media.to_vec() }];
        if let Some(reason) = hint {
            messages.push(LlmMessage::assistant("(invalid JSON omitted)"));
            messages.push(LlmMessage::user(prompts::repair_hint(self.config.language, reason)));
        }
        messages
    }

    pub async fn plan(
        &self,
        task: &str,
        team: &Team,
        prior_plan_hints: &[Plan],
        sentinel_enabled: bool,
        media: &[MediaRef],
    ) -> OrchestratorResult<Plan> {
        let system = prompts::system_message(self.config.language, &Utc::now().format("%Y-%m-%d").to_string());
        let hints = prior_plan_hints.iter().map(Plan::pretty).collect::<Vec<_>>().join("\n---\n");
        let user = prompts::plan_prompt(self.config.language, task, &team.describe(self.config.autonomous_execution), &hints, sentinel_enabled);
        let value = self
            .call_with_retry(
                "plan",
                |hint| self.messages_with_hint(system.clone(), user.clone(), media, hint),
                |v| validate_plan_json(v, sentinel_enabled),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| OrchestratorError::ProtocolFailure { stage: "plan", detail: e.to_string() })
    }

    pub async fn replan(
        &self,
        task: &str,
        prior_plan: &Plan,
        team: &Team,
        transcript: &[ChatMessage],
        sentinel_enabled: bool,
        media: &[MediaRef],
    ) -> OrchestratorResult<Plan> {
        let system = prompts::system_message(self.config.language, &Utc::now().format("%Y-%m-%d").to_string());
        let transcript_text = render_transcript(transcript, self.config.model_context_token_limit);
        let user = prompts::replan_prompt(
            self.config.language,
            task,
            &team.describe(self.config.autonomous_execution),
            &prior_plan.pretty(),
            &transcript_text,
            sentinel_enabled,
        );
        let value = self
            .call_with_retry(
                "replan",
                |hint| self.messages_with_hint(system.clone(), user.clone(), media, hint),
                |v| validate_plan_json(v, sentinel_enabled),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| OrchestratorError::ProtocolFailure { stage: "replan", detail: e.to_string() })
    }

    pub async fn ledger(
        &self,
        task: &str,
        plan: &Plan,
        transcript: &[ChatMessage],
        eligible_agent_names: &[String],
        media: &[MediaRef],
    ) -> OrchestratorResult<ProgressLedger> {
        let system = prompts::system_message(self.config.language, &Utc::now().format("%Y-%m-%d").to_string());
        let transcript_text = render_transcript(transcript, self.config.model_context_token_limit);
        let user = prompts::ledger_prompt(self.config.language, task, &plan.pretty(), &transcript_text, &eligible_agent_names.join(", "));
        let value = self
            .call_with_retry("ledger", |hint| self.messages_with_hint(system.clone(), user.clone(), media, hint), validate_ledger_json)
            .await?;
        serde_json::from_value(value).map_err(|e| OrchestratorError::ProtocolFailure { stage: "ledger", detail: e.to_string() })
    }

    pub async fn final_answer(&self, task: &str, transcript: &[ChatMessage], media: &[MediaRef]) -> OrchestratorResult<String> {
        let system = prompts::system_message(self.config.language, &Utc::now().format("%Y-%m-%d").to_string());
        let transcript_text = render_transcript(transcript, self.config.model_context_token_limit);
        let user = prompts::final_answer_prompt(self.config.language, task, &transcript_text, self.config.final_answer_prompt.as_deref());
        self.stream_to_bus(&[LlmMessage::system(system), LlmMessage::User { content: user, media: media.to_vec() }]).await
    }
}

#[async_trait::async_trait]
impl<'a> ConditionChecker for LlmProtocol<'a> {
    async fn check_condition(
        &self,
        step_description: &str,
        condition: &str,
        agent_response: &str,
    ) -> OrchestratorResult<ConditionCheck> {
        let system = prompts::system_message(self.config.language, &Utc::now().format("%Y-%m-%d").to_string());
        let user = prompts::condition_check_prompt(self.config.language, step_description, condition, agent_response);
        let value = self
            .call_with_retry(
                "check_condition",
                |hint| self.messages_with_hint(system.clone(), user.clone(), &[], hint),
                validate_condition_check_json,
            )
            .await?;
        serde_json::from_value(value).map_err(|e| OrchestratorError::ProtocolFailure { stage: "check_condition", detail: e.to_string() })
    }
}
