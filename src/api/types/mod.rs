//! Request and response types of the HTTP API

pub mod chat;
pub mod error;
pub mod json;

pub use chat::{
    ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChatMessageRole, ContentPart, FinishReason, MessageContent, Usage,
};
pub use error::{ApiError, ApiErrorResponse, ApiErrorType, INVALID_CREDENTIAL_MESSAGE};
pub use json::Json;
