// crates/db/src/rollup.rs
//! The aggregation engine: raw usage records → rollup tables.
//!
//! Re-aggregating a window recomputes full bucket totals and overwrites the
//! existing rows (never increments), so re-runs over the same raw window
//! are idempotent and safe to retry after partial failure. Each bucket's
//! upsert runs in its own short-lived transaction; callers hold the
//! single-writer role (at most one aggregation run at a time).

use crate::{Database, DbResult};
use tokenlens_core::Granularity;
use tracing::info;

/// Outcome of one aggregation run for one granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupReport {
    pub granularity: Granularity,
    /// (model, bucket) rows written to model_stats.
    pub model_buckets: u64,
    /// (channel, model, bucket) rows written to channel_stats.
    pub channel_buckets: u64,
}

/// (model_name, bucket_start, calls, tokens, quota)
type ModelGroupRow = (String, i64, i64, i64, i64);

/// (channel_id, channel_name, model_name, bucket_start, calls, tokens, quota)
type ChannelGroupRow = (i64, String, String, i64, i64, i64, i64);

impl Database {
    /// Aggregate raw usage over `[start, end)` at one granularity.
    ///
    /// The window is expanded outward to bucket boundaries so every bucket
    /// touching it is recomputed in full. Unknown models/channels aggregate
    /// under their literal names; metadata enrichment is best-effort.
    pub async fn aggregate_range(
        &self,
        start: i64,
        end: i64,
        granularity: Granularity,
    ) -> DbResult<RollupReport> {
        let width = granularity.width_secs();
        let (aligned_start, aligned_end) = granularity.align_window(start, end);
        let minutes = granularity.width_minutes();

        let model_groups: Vec<ModelGroupRow> = sqlx::query_as(
            r#"
            SELECT
                model_name,
                (created_at / ?1) * ?1 AS bucket_start,
                COUNT(*) AS calls,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                COALESCE(SUM(quota), 0) AS quota
            FROM usage_log
            WHERE created_at >= ?2 AND created_at < ?3
            GROUP BY model_name, bucket_start
            "#,
        )
        .bind(width)
        .bind(aligned_start)
        .bind(aligned_end)
        .fetch_all(self.pool())
        .await?;

        let mut model_buckets: u64 = 0;
        for (model_name, bucket_start, calls, tokens, quota) in &model_groups {
            let mut tx = self.pool().begin().await?;
            sqlx::query(
                r#"
                INSERT INTO model_stats
                    (model_name, granularity, bucket_start, count, token_used, quota, rpm, tpm)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (model_name, granularity, bucket_start) DO UPDATE SET
                    count = excluded.count,
                    token_used = excluded.token_used,
                    quota = excluded.quota,
                    rpm = excluded.rpm,
                    tpm = excluded.tpm
                "#,
            )
            .bind(model_name)
            .bind(granularity.as_str())
            .bind(bucket_start)
            .bind(calls)
            .bind(tokens)
            .bind(quota)
            .bind(*calls as f64 / minutes)
            .bind(*tokens as f64 / minutes)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            model_buckets += 1;
        }

        let channel_groups: Vec<ChannelGroupRow> = sqlx::query_as(
            r#"
            SELECT
                channel_id,
                MAX(channel_name) AS channel_name,
                model_name,
                (created_at / ?1) * ?1 AS bucket_start,
                COUNT(*) AS calls,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                COALESCE(SUM(quota), 0) AS quota
            FROM usage_log
            WHERE created_at >= ?2 AND created_at < ?3
            GROUP BY channel_id, model_name, bucket_start
            "#,
        )
        .bind(width)
        .bind(aligned_start)
        .bind(aligned_end)
        .fetch_all(self.pool())
        .await?;

        let mut channel_buckets: u64 = 0;
        for (channel_id, channel_name, model_name, bucket_start, calls, tokens, quota) in
            &channel_groups
        {
            let mut tx = self.pool().begin().await?;
            sqlx::query(
                r#"
                INSERT INTO channel_stats
                    (channel_id, channel_name, model_name, granularity, bucket_start,
                     count, token_used, quota, rpm, tpm)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT (channel_id, model_name, granularity, bucket_start) DO UPDATE SET
                    channel_name = excluded.channel_name,
                    count = excluded.count,
                    token_used = excluded.token_used,
                    quota = excluded.quota,
                    rpm = excluded.rpm,
                    tpm = excluded.tpm
                "#,
            )
            .bind(channel_id)
            .bind(channel_name)
            .bind(model_name)
            .bind(granularity.as_str())
            .bind(bucket_start)
            .bind(calls)
            .bind(tokens)
            .bind(quota)
            .bind(*calls as f64 / minutes)
            .bind(*tokens as f64 / minutes)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            channel_buckets += 1;
        }

        info!(
            granularity = %granularity,
            model_buckets,
            channel_buckets,
            start = aligned_start,
            end = aligned_end,
            "aggregation run complete"
        );

        Ok(RollupReport {
            granularity,
            model_buckets,
            channel_buckets,
        })
    }

    /// Aggregate raw usage over `[start, end)` at every granularity.
    pub async fn aggregate_all(&self, start: i64, end: i64) -> DbResult<Vec<RollupReport>> {
        let mut reports = Vec::with_capacity(Granularity::ALL.len());
        for granularity in Granularity::ALL {
            reports.push(self.aggregate_range(start, end, granularity).await?);
        }
        Ok(reports)
    }
}
