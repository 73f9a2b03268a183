// crates/server/src/routes/mod.rs
//! API route handlers for the tokenlens server.

pub mod aggregate;
pub mod chat;
pub mod health;
pub mod stats;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health       - Health check
/// - POST /api/chat         - Answer a natural-language usage question
/// - POST /api/chat/stream  - Same, streamed as plain text chunks
/// - POST /api/aggregate    - Trigger an aggregation run (409 if active)
/// - GET  /api/stats        - Table counts and data coverage
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", chat::router())
        .nest("/api", aggregate::router())
        .nest("/api", stats::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scripted_state, ScriptedProvider};

    #[tokio::test]
    async fn test_api_routes_creation() {
        let state = scripted_state(ScriptedProvider::completing("SELECT 1")).await;
        let _router = api_routes(state);
    }
}
