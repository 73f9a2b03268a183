// crates/server/src/lib.rs
//! Tokenlens server library.
//!
//! Axum-based HTTP layer over the usage analytics store: a conversational
//! query API, an aggregation trigger, and operator stats.

pub mod chat;
pub mod error;
pub mod routes;
pub mod sessions;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::*;
pub use routes::api_routes;
pub use state::{AppState, ServerConfig};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, chat, aggregate, stats)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
