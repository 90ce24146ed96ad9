//! Completion backends
//!
//! The gateway forwards a chat conversation to a backend and reports the
//! tokens it consumed. Provider adapters plug in behind [`CompletionBackend`].

mod canned;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

pub use canned::{estimate_tokens, CannedCompletionBackend};

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request handed to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Backend reply with token accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub model: String,
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Completion {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync + Debug {
    /// Produce the assistant reply for a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, DomainError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
