// crates/core/src/llm/config.rs
//! Completion provider configuration.

/// Configuration for a completion provider instance.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderType,
    pub model: String,
    pub api_key: Option<String>,
    /// Base URL of the service, e.g. "https://api.openai.com/v1".
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Supported provider transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAiCompatible,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::OpenAiCompatible,
            model: "gpt-4o-mini".into(),
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            temperature: 0.1,
            max_tokens: 2_048,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Build a config from the conventional OPENAI_* environment variables.
    /// Missing variables fall back to defaults; a missing key only matters
    /// once a request is actually made.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider: ProviderType::OpenAiCompatible,
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: std::env::var("OPENAI_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            timeout_secs: std::env::var("OPENAI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}
