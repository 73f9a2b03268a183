// crates/core/src/nlsql/translate.rs
//! The translation engine: one completion call → safety-gated SQL.

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{CompletionRequest, LlmError, LlmProvider};
use crate::nlsql::prompt::{build_sql_prompt, SQL_SYSTEM_PROMPT};
use crate::nlsql::timerange::{apply_time_range, resolve_time_range, TimeRange, DEFAULT_WINDOW_SECS};
use crate::nlsql::validate::{extract_sql, validate_sql, SqlGateError};
use crate::types::ChatTurn;

/// Tunables for the translation call.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Trailing conversation turns included in the prompt.
    pub history_turns: usize,
    /// Window applied when the question carries no usable bound.
    pub default_window_secs: i64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            history_turns: crate::nlsql::prompt::DEFAULT_HISTORY_TURNS,
            default_window_secs: DEFAULT_WINDOW_SECS,
            max_tokens: 1_024,
            temperature: 0.1,
        }
    }
}

/// The product of a successful translation. Ephemeral: created per request
/// and discarded once the answer is produced.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub question: String,
    pub sql: String,
    pub range: TimeRange,
}

/// Translation failures, distinct from execution failures so the caller can
/// present "could not understand the question" rather than a SQL error.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("completion service failed: {0}")]
    Provider(#[from] LlmError),

    #[error("no SQL statement found in completion output")]
    NoSql,

    #[error("generated SQL rejected: {0}")]
    Rejected(#[from] SqlGateError),
}

/// Translates questions into validated read-only SQL via one completion
/// call per request.
pub struct Translator {
    provider: Arc<dyn LlmProvider>,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: TranslatorConfig) -> Self {
        Self { provider, config }
    }

    /// Translate a question into a [`GeneratedQuery`].
    ///
    /// The response text is untrusted: it passes through SQL extraction,
    /// placeholder substitution, and the safety gate before anything may
    /// execute it. Rejected SQL never leaves this function.
    pub async fn translate(
        &self,
        question: &str,
        history: &[ChatTurn],
        schema_text: &str,
        allowed_tables: &[&str],
        explicit_start: Option<i64>,
        explicit_end: Option<i64>,
        now: i64,
    ) -> Result<GeneratedQuery, TranslationError> {
        let range = resolve_time_range(
            question,
            explicit_start,
            explicit_end,
            self.config.default_window_secs,
            now,
        );

        let prompt = build_sql_prompt(
            question,
            history,
            self.config.history_turns,
            schema_text,
            range,
            now,
        );

        let request = CompletionRequest {
            system_prompt: Some(SQL_SYSTEM_PROMPT.to_string()),
            user_prompt: prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self.provider.complete(request).await?;

        let sql = extract_sql(&response.content).ok_or(TranslationError::NoSql)?;
        let sql = apply_time_range(&sql, range);

        if let Err(rejection) = validate_sql(&sql, allowed_tables) {
            tracing::warn!(%rejection, "generated SQL failed the safety gate");
            return Err(rejection.into());
        }

        tracing::debug!(sql_len = sql.len(), start = range.start, end = range.end, "translation complete");

        Ok(GeneratedQuery {
            question: question.to_string(),
            sql,
            range,
        })
    }
}
