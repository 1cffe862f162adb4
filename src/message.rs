use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::task::MediaRef;

/// Token usage reported by an LLM call, attached to transcript entries that
/// came from one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Content carried by a chat message: plain text, or text mixed with media.
/// A uniform projection to text is provided for LLM clients without a
/// vision capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatContent {
    Text(String),
    Multimodal { text: String, media: Vec<MediaRef> },
}

impl ChatContent {
    /// Renders this content as plain text, substituting `placeholder` for
    /// any media part. Used when the downstream LLM lacks vision (§6.2).
    pub fn to_model_text(&self, placeholder: &str) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::Multimodal { text, media } => {
                if media.is_empty() {
                    text.clone()
                } else {
                    format!("{text}\n{}", placeholder.repeat(media.len()))
                }
            }
        }
    }
}

/// One entry of the session transcript (§3 "Transcript message"). `seq` is
/// assigned by the message bus at publish time and is strictly increasing
/// within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub seq: u64,
    pub source: String,
    pub content: ChatContent,
    pub kind: ChatMessageKind,
    pub usage: Option<RequestUsage>,
    pub metadata: HashMap<String, String>,
}

/// The tagged variant distinguishing the transcript entry kinds named in
/// §3: ordinary text, multimodal, the orchestrator's internal reasoning,
/// a streamed partial chunk, and an agent's terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatMessageKind {
    Text,
    Multimodal,
    Thought,
    StreamingChunk,
    AgentResponse,
}

impl ChatMessage {
    pub fn text(seq: u64, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            seq,
            source: source.into(),
            content: ChatContent::Text(content.into()),
            kind: ChatMessageKind::Text,
            usage: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: ChatMessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_usage(mut self, usage: RequestUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn to_text(&self) -> String {
        self.content.to_model_text("[image]")
    }
}

/// The role-tagged message shape fed to the LLM client (§6.2), kept
/// separate from `ChatMessage` so protocol prompts can be assembled
/// without dragging transcript bookkeeping (`seq`, `kind`) along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmMessage {
    System { content: String },
    User { content: String, media: Vec<MediaRef> },
    Assistant { content: String },
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        LlmMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        LlmMessage::User { content: content.into(), media: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        LlmMessage::Assistant { content: content.into() }
    }

    /// Strips media from a vision-less context, per §6.2.
    pub fn strip_vision(&self) -> LlmMessage {
        match self {
            LlmMessage::User { content, .. } => LlmMessage::User { content: content.clone(), media: Vec::new() },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimodal_text_projection_appends_placeholder() {
        let content = ChatContent::Multimodal {
            text: "see attached".into(),
            media: vec![MediaRef::Image { bytes: vec![1, 2, 3], mime: "image/png".into() }],
        };
        assert_eq!(content.to_model_text("[image]"), "see attached\n[image]");
    }

    #[test]
    fn text_projection_is_identity() {
        let content = ChatContent::Text("hello".into());
        assert_eq!(content.to_model_text("[image]"), "hello");
    }
}
