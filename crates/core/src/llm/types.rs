// crates/core/src/llm/types.rs
//! Request/response/error types for the completion service boundary.

use thiserror::Error;

/// Request for a text completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_prompt: user_prompt.into(),
            max_tokens: 2_048,
            temperature: 0.1,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Response from a completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub latency_ms: u64,
}

/// Errors from the completion service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Completion request failed: {0}")]
    Http(String),

    #[error("Completion service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse completion response: {0}")]
    ParseFailed(String),

    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),
}
