//! Fixed-reply completion backend

use async_trait::async_trait;

use super::{Completion, CompletionBackend, CompletionRequest};
use crate::domain::DomainError;

const DEFAULT_REPLY: &str = "Hello from the Lynxa gateway.";

/// Token estimate used when no tokenizer is available: one token per four
/// characters, rounded up
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Backend that answers every conversation with the same text
#[derive(Debug, Clone)]
pub struct CannedCompletionBackend {
    reply: String,
}

impl Default for CannedCompletionBackend {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY)
    }
}

impl CannedCompletionBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for CannedCompletionBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, DomainError> {
        if request.messages.is_empty() {
            return Err(DomainError::validation("messages must not be empty"));
        }

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .fold(0u32, u32::saturating_add);

        let mut content = self.reply.clone();
        let mut completion_tokens = estimate_tokens(&content);
        if let Some(max) = request.max_tokens {
            if completion_tokens > max {
                content = content
                    .chars()
                    .take(usize::try_from(max).unwrap_or(usize::MAX).saturating_mul(4))
                    .collect();
                completion_tokens = estimate_tokens(&content);
            }
        }

        Ok(Completion {
            model: request.model,
            content,
            prompt_tokens,
            completion_tokens,
        })
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}
