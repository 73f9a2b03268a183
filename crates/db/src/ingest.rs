// crates/db/src/ingest.rs
//! Bulk usage-log ingestion: JSON document → `usage_log` rows.
//!
//! The upstream exporter produces either a flat array of log objects or a
//! map of day-key → array. Both shapes land here. A malformed record is
//! logged and skipped; only a store failure aborts the batch, and partial
//! progress is kept because every rollup overwrites whole buckets anyway.

use crate::{Database, DbResult};
use thiserror::Error;
use tokenlens_core::RawLogRecord;
use tracing::{debug, warn};

/// Errors for batch-level ingestion problems. Record-level problems are
/// counted, not raised; only an unusable document or an unreachable store
/// fails the batch.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document shape: expected an array of records or a map of day to array")]
    UnsupportedShape,

    #[error("store unavailable: {0}")]
    Db(#[from] crate::DbError),
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Parse a bulk usage document into records, counting malformed entries.
pub fn parse_usage_document(
    doc: &serde_json::Value,
) -> Result<(Vec<RawLogRecord>, u64), IngestError> {
    let mut records = Vec::new();
    let mut malformed: u64 = 0;

    match doc {
        serde_json::Value::Array(items) => consume_records(items, &mut records, &mut malformed),
        serde_json::Value::Object(map) => {
            for (day, value) in map {
                match value {
                    serde_json::Value::Array(items) => {
                        consume_records(items, &mut records, &mut malformed)
                    }
                    _ => {
                        malformed += 1;
                        warn!(day = %day, "skipping non-array day entry in usage document");
                    }
                }
            }
        }
        _ => return Err(IngestError::UnsupportedShape),
    }

    Ok((records, malformed))
}

fn consume_records(
    items: &[serde_json::Value],
    records: &mut Vec<RawLogRecord>,
    malformed: &mut u64,
) {
    for item in items {
        match serde_json::from_value::<RawLogRecord>(item.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                *malformed += 1;
                warn!(error = %e, "skipping malformed usage record");
            }
        }
    }
}

impl Database {
    /// Insert raw records into `usage_log`.
    ///
    /// Records with a zero or negative timestamp are rejected and counted
    /// as skipped, not fatal to the batch.
    pub async fn insert_usage_records(&self, records: &[RawLogRecord]) -> DbResult<IngestReport> {
        let mut report = IngestReport::default();
        let mut tx = self.pool().begin().await?;

        for record in records {
            if record.created_at <= 0 {
                report.skipped += 1;
                debug!(model = %record.model_name, ts = record.created_at, "skipping record with non-positive timestamp");
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO usage_log
                    (created_at, model_name, channel_id, channel_name, user_id, token_name,
                     prompt_tokens, completion_tokens, total_tokens, quota, use_time, is_stream)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(record.created_at)
            .bind(&record.model_name)
            .bind(record.channel_id)
            .bind(&record.channel_name)
            .bind(record.user_id)
            .bind(&record.token_name)
            .bind(record.prompt_tokens)
            .bind(record.completion_tokens)
            .bind(record.total_tokens())
            .bind(record.quota)
            .bind(record.use_time)
            .bind(record.is_stream)
            .execute(&mut *tx)
            .await?;

            report.inserted += 1;
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Ingest a bulk usage document (array or day-keyed map of records).
    pub async fn ingest_usage(
        &self,
        doc: &serde_json::Value,
    ) -> Result<IngestReport, IngestError> {
        let (records, malformed) = parse_usage_document(doc)?;

        let mut report = self.insert_usage_records(&records).await?;
        report.skipped += malformed;

        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "usage ingestion complete"
        );
        Ok(report)
    }
}
