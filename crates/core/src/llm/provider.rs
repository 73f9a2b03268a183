// crates/core/src/llm/provider.rs
//! LlmProvider trait defining the interface for completion services.

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for completion services that translate and compose answers.
///
/// Implementations include:
/// - `OpenAiProvider` — any OpenAI-compatible chat/completions endpoint
/// - test doubles that script deterministic responses
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a completion and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Run a completion, streaming text fragments as they arrive.
    ///
    /// Returns (receiver, join_handle). The receiver yields text chunks in
    /// order; concatenating them must reproduce exactly what `complete`
    /// would return for the same request. Dropping the receiver cancels the
    /// underlying call promptly.
    fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        (
            tokio::sync::mpsc::Receiver<String>,
            tokio::task::JoinHandle<Result<(), LlmError>>,
        ),
        LlmError,
    >;

    /// Check whether the provider is reachable/configured.
    async fn health_check(&self) -> Result<(), LlmError>;

    /// Provider name for logging (e.g. "openai-compatible").
    fn name(&self) -> &str;

    /// Model identifier (e.g. "gpt-4o-mini").
    fn model(&self) -> &str;
}
