//! Chat-completion capability used by the answer composer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona and behavior instructions.
    System,
    /// The question together with its grounding context.
    User,
    /// A previous model reply.
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Messages plus sampling parameters for a single completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; low values favor faithfulness.
    pub temperature: f32,
    /// Upper bound on the completion length, in tokens.
    pub max_output_tokens: u32,
}

/// A provider that turns a message sequence into one text completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce a completion for `request`.
    ///
    /// Failures should be reported as
    /// [`RagError::ChatUnavailable`](crate::RagError::ChatUnavailable).
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Identifier of the chat model.
    fn model_id(&self) -> &str;

    /// Short provider name used in errors and logs.
    fn name(&self) -> &str {
        "chat"
    }
}
