// crates/server/src/routes/aggregate.rs
//! Aggregation trigger route.
//!
//! Aggregation is a single-writer batch job: one run at a time. An
//! overlapping trigger is rejected with 409 rather than queued, since
//! bucket upserts are not designed to merge concurrent partial totals.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokenlens_core::Granularity;
use tokenlens_db::RollupReport;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for POST /api/aggregate. All fields optional: the default
/// is a full re-aggregation of the last day at every granularity.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    /// Convenience window: aggregate the last N days ending now.
    #[serde(default)]
    pub last_days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub granularity: String,
    pub model_buckets: u64,
    pub channel_buckets: u64,
}

impl From<RollupReport> for ReportBody {
    fn from(report: RollupReport) -> Self {
        Self {
            granularity: report.granularity.as_str().to_string(),
            model_buckets: report.model_buckets,
            channel_buckets: report.channel_buckets,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub reports: Vec<ReportBody>,
}

/// POST /api/aggregate — run the rollup job over a window.
pub async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AggregateRequest>,
) -> ApiResult<Json<AggregateResponse>> {
    // Single-writer: reject overlapping runs instead of queueing them.
    let _guard = state
        .aggregation
        .try_lock()
        .map_err(|_| ApiError::Conflict("an aggregation run is already active".into()))?;

    let now = chrono::Utc::now().timestamp();
    let end = request.end_timestamp.unwrap_or(now);
    let start = request
        .start_timestamp
        .unwrap_or_else(|| end - request.last_days.unwrap_or(1).max(1) * 86_400);

    if start >= end {
        return Err(ApiError::BadRequest(format!(
            "empty aggregation window: {start}..{end}"
        )));
    }

    let reports = match &request.granularity {
        Some(raw) => {
            let granularity: Granularity = raw
                .parse()
                .map_err(|e: tokenlens_core::UnknownGranularity| ApiError::BadRequest(e.to_string()))?;
            vec![state.db.aggregate_range(start, end, granularity).await?]
        }
        None => state.db.aggregate_all(start, end).await?,
    };

    // Fresh rollups invalidate the cached schema grounding samples.
    state.grounding.invalidate().await;

    Ok(Json(AggregateResponse {
        start_timestamp: start,
        end_timestamp: end,
        reports: reports.into_iter().map(ReportBody::from).collect(),
    }))
}

/// Create the aggregate routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/aggregate", post(aggregate_handler))
}
