// crates/server/src/sessions.rs
//! In-memory conversation session store.
//!
//! Sessions live for the life of the process and are keyed by the caller's
//! session id. There is no process-wide history singleton: every chat
//! request names its session (or supplies inline history instead).

use std::collections::HashMap;

use tokenlens_core::nlsql::ConversationSession;
use tokenlens_core::{ChatRole, ChatTurn};
use tokio::sync::RwLock;

/// Map of session id → conversation log.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<String, ConversationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The trailing `limit` turns for a session (empty for unknown ids).
    pub async fn history(&self, session_id: &str, limit: usize) -> Vec<ChatTurn> {
        let sessions = self.inner.read().await;
        sessions
            .get(session_id)
            .map(|session| session.history(limit).to_vec())
            .unwrap_or_default()
    }

    /// Append a completed exchange to a session, creating it on first use.
    ///
    /// Called only once a request has reached a definitive outcome, so a
    /// cancelled or failed request never leaves the history half-written.
    pub async fn append_exchange(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.inner.write().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        session.append_turn(ChatRole::User, question);
        session.append_turn(ChatRole::Assistant, answer);
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_session_has_empty_history() {
        let store = SessionStore::new();
        assert!(store.history("nope", 8).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_exchange_creates_and_grows_session() {
        let store = SessionStore::new();
        store
            .append_exchange("s1", "usage for deepseek-r1 today", "1,234,567")
            .await;
        store.append_exchange("s1", "and yesterday?", "987,654").await;

        let history = store.history("s1", 10).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[3].content, "987,654");
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store.append_exchange("a", "q1", "a1").await;
        store.append_exchange("b", "q2", "a2").await;

        assert_eq!(store.history("a", 10).await.len(), 2);
        assert_eq!(store.history("b", 10).await.len(), 2);
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_history_is_tail_bounded() {
        let store = SessionStore::new();
        for i in 0..10 {
            store
                .append_exchange("s", &format!("q{i}"), &format!("a{i}"))
                .await;
        }
        let history = store.history("s", 4).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "q8");
        assert_eq!(history[3].content, "a9");
    }
}
