// crates/server/src/routes/stats.rs
//! Operator-facing stats endpoint: table counts and data coverage.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokenlens_db::allowed_tables;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub table: String,
    pub rows: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub tables: Vec<TableStats>,
    pub unique_models: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_record_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_record_at: Option<i64>,
    pub active_sessions: usize,
}

/// GET /api/stats — row counts per table plus raw data coverage.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let mut tables = Vec::new();
    for table in allowed_tables() {
        // Table names come from the static catalog, not user input.
        let (rows,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(state.db.pool())
            .await
            .map_err(tokenlens_db::DbError::from)?;
        tables.push(TableStats {
            table: table.to_string(),
            rows,
        });
    }

    let (unique_models,): (i64,) =
        sqlx::query_as("SELECT COUNT(DISTINCT model_name) FROM usage_log")
            .fetch_one(state.db.pool())
            .await
            .map_err(tokenlens_db::DbError::from)?;

    let (first_record_at, last_record_at): (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT MIN(created_at), MAX(created_at) FROM usage_log")
            .fetch_one(state.db.pool())
            .await
            .map_err(tokenlens_db::DbError::from)?;

    Ok(Json(StatsResponse {
        tables,
        unique_models,
        first_record_at,
        last_record_at,
        active_sessions: state.sessions.session_count().await,
    }))
}

/// Create the stats routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(get_stats))
}

#[cfg(test)]
mod tests {
    use crate::testing::{scripted_state, seed_usage, ScriptedProvider};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stats_reports_counts_and_coverage() {
        let state = scripted_state(ScriptedProvider::completing("SELECT 1")).await;
        seed_usage(&state).await;
        let app = crate::create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let tables = json["tables"].as_array().unwrap();
        assert_eq!(tables.len(), 6);
        let usage = tables.iter().find(|t| t["table"] == "usage_log").unwrap();
        assert_eq!(usage["rows"], 3);

        assert_eq!(json["uniqueModels"], 2);
        assert_eq!(json["firstRecordAt"], 1_747_130_410);
        assert_eq!(json["activeSessions"], 0);
    }

    #[tokio::test]
    async fn test_stats_on_empty_database() {
        let state = scripted_state(ScriptedProvider::completing("SELECT 1")).await;
        let app = crate::create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["uniqueModels"], 0);
        assert!(json.get("firstRecordAt").is_none());
    }
}
