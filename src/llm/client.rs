use std::pin::Pin;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use base64::Engine;
use futures::{Stream, StreamExt};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::message::LlmMessage;
use crate::task::MediaRef;

pub type CompletionStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A completed non-streamed call plus whatever usage the provider reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// The LLM client contract (§6.2). `vision` reports whether the backing
/// model accepts image parts, so callers can decide whether to strip
/// media with `LlmMessage::strip_vision` before sending.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn vision(&self) -> bool;
    async fn complete(&self, messages: &[LlmMessage]) -> OrchestratorResult<Completion>;
    async fn complete_stream(&self, messages: &[LlmMessage]) -> OrchestratorResult<CompletionStream>;
}

/// `async-openai`-backed adapter generalized beyond the teacher's
/// DashScope-only `clients/llm.rs` to any OpenAI-compatible base URL
/// (DashScope, OpenAI itself, a local vLLM/Ollama gateway, ...).
pub struct OpenAiCompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    vision: bool,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, vision: bool) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into()).with_api_base(base_url.into());
        Self { client: Client::with_config(config), model: model.into(), vision }
    }

    /// Reads `DASHSCOPE_API_KEY` first (matching the teacher's preference
    /// order), falling back to `OPENAI_API_KEY`/`OPENAI_BASE_URL`.
    pub fn from_env(vision: bool) -> OrchestratorResult<Self> {
        if let Ok(api_key) = std::env::var("DASHSCOPE_API_KEY") {
            let base_url = std::env::var("DASHSCOPE_BASE_URL")
                .unwrap_or_else(|_| "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string());
            let model = std::env::var("DASHSCOPE_MODEL").unwrap_or_else(|_| "qwen-vl-max".to_string());
            return Ok(Self::new(api_key, base_url, model, vision));
        }
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OrchestratorError::ResourceFailure { detail: "neither DASHSCOPE_API_KEY nor OPENAI_API_KEY is set".into() })?;
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        Ok(Self::new(api_key, base_url, model, vision))
    }

    fn to_api_messages(&self, messages: &[LlmMessage]) -> OrchestratorResult<Vec<ChatCompletionRequestMessage>> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            let built = match message {
                LlmMessage::System { content } => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default().content(content.clone()).build().map_err(api_err)?,
                ),
                LlmMessage::Assistant { content } => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default().content(content.clone()).build().map_err(api_err)?,
                ),
                LlmMessage::User { content, media } => {
                    if media.is_empty() || !self.vision {
                        ChatCompletionRequestMessage::User(
                            ChatCompletionRequestUserMessageArgs::default().content(content.clone()).build().map_err(api_err)?,
                        )
                    } else {
                        let mut parts = vec![ChatCompletionRequestMessageContentPartTextArgs::default()
                            .text(content.clone())
                            .build()
                            .map_err(api_err)?
                            .into()];
                        for item in media {
                            let MediaRef::Image { bytes, mime } = item;
                            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                            let data_url = format!("data:{mime};base64,{encoded}");
                            parts.push(
                                ChatCompletionRequestMessageContentPartImageArgs::default()
                                    .image_url(ImageUrlArgs::default().url(data_url).detail(ImageDetail::Auto).build().map_err(api_err)?)
                                    .build()
                                    .map_err(api_err)?
                                    .into(),
                            );
                        }
                        ChatCompletionRequestMessage::User(async_openai::types::ChatCompletionRequestUserMessage {
                            content: ChatCompletionRequestUserMessageContent::Array(parts),
                            name: None,
                        })
                    }
                }
            };
            out.push(built);
        }
        Ok(out)
    }
}

fn api_err(err: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::ResourceFailure { detail: err.to_string() }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn vision(&self) -> bool {
        self.vision
    }

    async fn complete(&self, messages: &[LlmMessage]) -> OrchestratorResult<Completion> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.to_api_messages(messages)?)
            .temperature(0.2f32)
            .build()
            .map_err(api_err)?;

        let response = self.client.chat().create(request).await.map_err(api_err)?;
        let choice = response.choices.into_iter().next().ok_or_else(|| OrchestratorError::ResourceFailure {
            detail: "LLM returned no choices".into(),
        })?;
        let text = choice.message.content.ok_or_else(|| OrchestratorError::ResourceFailure {
            detail: "LLM response had no text content".into(),
        })?;
        let (prompt_tokens, completion_tokens) =
            response.usage.map(|u| (u.prompt_tokens, u.completion_tokens)).unwrap_or((0, 0));
        Ok(Completion { text, prompt_tokens, completion_tokens })
    }

    async fn complete_stream(&self, messages: &[LlmMessage]) -> OrchestratorResult<CompletionStream> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.to_api_messages(messages)?)
            .temperature(0.2f32)
            .build()
            .map_err(api_err)?;

        let stream = self.client.chat().create_stream(request).await.map_err(api_err)?;
        let mapped = stream.filter_map(|chunk| async move {
            let chunk = chunk.ok()?;
            let delta = chunk.choices.first()?.delta.content.clone()?;
            if delta.is_empty() {
                None
            } else {
                Some(delta)
            }
        });
        Ok(Box::pin(mapped))
    }
}
