// crates/server/src/testing.rs
//! Shared test doubles for engine and route tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokenlens_core::llm::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};
use tokenlens_db::Database;

use crate::state::{AppState, ServerConfig};

/// Completion provider that replays scripted responses in order.
///
/// `complete` and `complete_stream` draw from the same queue, so a
/// translation + composition exchange scripts as two entries. Streams are
/// chunked at word boundaries; concatenating the chunks reproduces the
/// scripted text exactly, matching the contract real providers must obey.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    fail_when_empty: bool,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fail_when_empty: false,
        })
    }

    /// Provider that errors once the scripted replies run out.
    pub fn exhausting<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fail_when_empty: true,
        })
    }

    /// Provider that always produces `reply` for the first call and "OK"
    /// afterwards.
    pub fn completing(reply: &str) -> Arc<Self> {
        Self::new([reply])
    }

    fn next_reply(&self) -> Result<String, LlmError> {
        let mut replies = self.replies.lock().expect("scripted replies lock");
        match replies.pop_front() {
            Some(reply) => Ok(reply),
            None if self.fail_when_empty => {
                Err(LlmError::NotAvailable("scripted replies exhausted".into()))
            }
            None => Ok("OK".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = self.next_reply()?;
        Ok(CompletionResponse {
            content,
            model: Some("scripted".into()),
            input_tokens: None,
            output_tokens: None,
            latency_ms: 1,
        })
    }

    fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<
        (
            tokio::sync::mpsc::Receiver<String>,
            tokio::task::JoinHandle<Result<(), LlmError>>,
        ),
        LlmError,
    > {
        let reply = self.next_reply()?;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let handle = tokio::spawn(async move {
            for chunk in reply.split_inclusive(' ') {
                if tx.send(chunk.to_string()).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        });
        Ok((rx, handle))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test"
    }
}

/// An AppState over an in-memory database and the given provider.
pub async fn scripted_state(provider: Arc<ScriptedProvider>) -> Arc<AppState> {
    let db = Database::new_in_memory().await.expect("in-memory DB");
    AppState::new(db, provider, ServerConfig::default())
}

/// Seed a few hours of usage and aggregate them, so chat tests have real
/// rollups to query.
pub async fn seed_usage(state: &Arc<AppState>) {
    let doc = serde_json::json!([
        {"created_at": 1_747_130_410, "model_name": "deepseek-r1", "channel": 56, "channel_name": "tencent-dp",
         "prompt_tokens": 100, "completion_tokens": 50, "quota": 30},
        {"created_at": 1_747_132_400, "model_name": "deepseek-r1", "channel": 56, "channel_name": "tencent-dp",
         "prompt_tokens": 200, "completion_tokens": 100, "quota": 60},
        {"created_at": 1_747_130_430, "model_name": "gpt-4o", "channel": 2, "channel_name": "ubang-oai",
         "prompt_tokens": 50, "completion_tokens": 25, "quota": 20}
    ]);
    state.db.ingest_usage(&doc).await.expect("seed ingest");
    state
        .db
        .aggregate_all(1_747_130_400, 1_747_134_000)
        .await
        .expect("seed aggregation");
}
