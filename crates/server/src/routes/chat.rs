// crates/server/src/routes/chat.rs
//! Chat API routes.
//!
//! - POST /chat        — answer a natural-language usage question
//! - POST /chat/stream — same answer, streamed as plain text chunks
//!   terminated by connection close

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokenlens_core::ChatTurn;

use crate::chat::{self, ChatParams};
use crate::error::ApiResult;
use crate::state::AppState;

/// Request body for POST /api/chat and /api/chat/stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatTurn>>,
    /// Operators may opt in to seeing the generated SQL; it is never
    /// included otherwise.
    #[serde(default)]
    pub include_sql: bool,
}

impl ChatRequest {
    fn into_params(self) -> (ChatParams, bool) {
        let include_sql = self.include_sql;
        (
            ChatParams {
                question: self.question,
                session_id: self.session_id,
                chat_history: self.chat_history,
                start_timestamp: self.start_timestamp,
                end_timestamp: self.end_timestamp,
            },
            include_sql,
        )
    }
}

/// Response for POST /api/chat.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ChatResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

/// POST /api/chat — answer a question in one response.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let (params, include_sql) = request.into_params();
    let outcome = chat::answer_question(&state, params).await?;

    Ok(Json(ChatResponse {
        answer: outcome.answer,
        sql: include_sql.then_some(outcome.sql),
        start_timestamp: outcome.range.start,
        end_timestamp: outcome.range.end,
    }))
}

/// POST /api/chat/stream — stream the answer as plain text chunks.
///
/// Translation and execution failures surface as normal JSON errors before
/// any body bytes are sent; once streaming starts, the connection closing
/// is the terminator.
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let (params, _include_sql) = request.into_params();
    let session_id = params.session_id.clone();

    let (query, formatted) = chat::prepare(&state, &params).await?;
    let stream = chat::compose_stream(state.clone(), query, formatted, session_id);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Create the chat routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
}
