//! Completion service integration.
//!
//! The planning and code generation stages talk to an external LLM
//! completion service through the [`CompletionService`] trait. Retry
//! policy lives in the workflow engine, not here, so every attempt is
//! observable in the state trail.

mod openrouter;

pub use openrouter::OpenRouterProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Completion service error taxonomy.
///
/// `RateLimited`, `Timeout` and `Transport` are transient and retried by
/// the engine with backoff; `Unauthenticated` and persistent
/// `MalformedResponse` escalate to a failed workflow.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("rate limited by completion provider")]
    RateLimited,

    #[error("completion request timed out")]
    Timeout,

    #[error("completion provider rejected credentials: {0}")]
    Unauthenticated(String),

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("completion transport error: {0}")]
    Transport(String),
}

impl CompletionError {
    /// Whether the engine may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Transport(_))
    }
}

/// One message in a completion conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role: `system`, `user` or `assistant`.
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// A single completion request: structured context plus an instruction.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier, e.g. `qwen/qwen2.5-72b-instruct:free`.
    pub model: String,

    /// System instruction.
    pub system: String,

    /// Conversation history, in insertion order, ending with the
    /// instruction for this call.
    pub messages: Vec<ChatMessage>,

    /// Request a JSON object response from the provider.
    pub json_response: bool,

    /// Sampling temperature.
    pub temperature: f32,
}

/// Trait for completion providers.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run one completion call and return the raw response text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}
