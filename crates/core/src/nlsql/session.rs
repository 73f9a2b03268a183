// crates/core/src/nlsql/session.rs
//! Conversation sessions: an append-only log of turns.
//!
//! The full log is retained for the life of the session; prompt
//! construction reads only the trailing K turns via [`ConversationSession::history`].

use crate::types::{ChatRole, ChatTurn};

/// Ordered log of conversation turns for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationSession {
    turns: Vec<ChatTurn>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session from an externally supplied history.
    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    /// Append one turn. Turns are never mutated or reordered afterwards.
    pub fn append_turn(&mut self, role: ChatRole, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            content: content.into(),
        });
    }

    /// The most recent `limit` turns, oldest first.
    pub fn history(&self, limit: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// The full retained log.
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
