// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use tokenlens_core::llm::LlmProvider;
use tokenlens_db::{Database, DbResult, ExecConfig};
use tokio::sync::Mutex;

use crate::sessions::SessionStore;

/// Server-wide tunables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Trailing conversation turns supplied to the translation prompt.
    pub history_turns: usize,
    /// Default window when a question has no usable time bound.
    pub default_window_secs: i64,
    /// Row cap / statement timeout for ad-hoc execution.
    pub exec: ExecConfig,
    /// Distinct sample values included in schema grounding.
    pub sample_values: usize,
    /// How long a grounding description may be served from cache.
    pub grounding_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            history_turns: 8,
            default_window_secs: 86_400,
            exec: ExecConfig::default(),
            sample_values: 20,
            grounding_ttl_secs: 60,
        }
    }
}

/// Short-TTL cache for the schema grounding text, so each chat request does
/// not re-run the descriptive queries.
pub struct GroundingCache {
    ttl_secs: u64,
    inner: Mutex<Option<(Instant, String)>>,
}

impl GroundingCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            inner: Mutex::new(None),
        }
    }

    /// Return the cached description, refreshing it when stale.
    pub async fn get_or_refresh(&self, db: &Database, sample_values: usize) -> DbResult<String> {
        let mut guard = self.inner.lock().await;
        if let Some((stamped_at, text)) = guard.as_ref() {
            if stamped_at.elapsed().as_secs() < self.ttl_secs {
                return Ok(text.clone());
            }
        }
        let text = db.describe_schema(sample_values).await?;
        *guard = Some((Instant::now(), text.clone()));
        Ok(text)
    }

    /// Drop the cached description (e.g. after an aggregation run).
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Database handle.
    pub db: Database,
    /// Completion provider used for translation and answer composition.
    pub llm: Arc<dyn LlmProvider>,
    /// In-memory conversation sessions keyed by session id.
    pub sessions: SessionStore,
    /// Schema grounding cache.
    pub grounding: GroundingCache,
    /// Single-writer guard: at most one aggregation run at a time.
    /// Overlapping HTTP-triggered runs are rejected, not queued.
    pub aggregation: Mutex<()>,
    pub config: ServerConfig,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(db: Database, llm: Arc<dyn LlmProvider>, config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            llm,
            sessions: SessionStore::new(),
            grounding: GroundingCache::new(config.grounding_ttl_secs),
            aggregation: Mutex::new(()),
            config,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
