// crates/core/src/llm/factory.rs
//! Provider factory — creates an LlmProvider from configuration.

use std::sync::Arc;

use super::config::{LlmConfig, ProviderType};
use super::openai::OpenAiProvider;
use super::provider::LlmProvider;
use super::types::LlmError;

/// Create a completion provider based on the given configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider {
        ProviderType::OpenAiCompatible => Ok(Arc::new(OpenAiProvider::new(config.clone()))),
    }
}
