// crates/db/src/metadata.rs
//! Channel/token/user metadata mirrors.
//!
//! These tables are replicated from the upstream billing system by a
//! periodic pull that is decoupled from request handling; the query engine
//! only ever reads them. Upserts are keyed by the natural id so a re-sync
//! replaces rows in place.

use crate::ingest::IngestError;
use crate::{Database, DbResult};
use tokenlens_core::{ChannelInfo, TokenInfo, UserInfo};
use tracing::{info, warn};

/// Row counts written by one metadata sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataReport {
    pub channels: u64,
    pub tokens: u64,
    pub users: u64,
}

fn collect_rows<T: serde::de::DeserializeOwned>(
    doc: &serde_json::Value,
    keys: &[&str],
    skipped: &mut u64,
) -> Vec<T> {
    let mut rows = Vec::new();
    for key in keys {
        if let Some(serde_json::Value::Array(items)) = doc.get(*key) {
            for item in items {
                match serde_json::from_value::<T>(item.clone()) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        *skipped += 1;
                        warn!(key, error = %e, "skipping malformed metadata row");
                    }
                }
            }
        }
    }
    rows
}

impl Database {
    pub async fn upsert_channels(&self, rows: &[ChannelInfo]) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO channels
                    (id, name, type, status, response_time, models, priority, used_quota, created_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    type = excluded.type,
                    status = excluded.status,
                    response_time = excluded.response_time,
                    models = excluded.models,
                    priority = excluded.priority,
                    used_quota = excluded.used_quota,
                    created_time = excluded.created_time
                "#,
            )
            .bind(row.id)
            .bind(&row.name)
            .bind(row.kind)
            .bind(row.status)
            .bind(row.response_time)
            .bind(&row.models)
            .bind(row.priority)
            .bind(row.used_quota)
            .bind(row.created_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    pub async fn upsert_tokens(&self, rows: &[TokenInfo]) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO tokens
                    (id, user_id, name, status, remain_quota, used_quota, unlimited_quota,
                     expired_time, created_time, accessed_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT (id) DO UPDATE SET
                    user_id = excluded.user_id,
                    name = excluded.name,
                    status = excluded.status,
                    remain_quota = excluded.remain_quota,
                    used_quota = excluded.used_quota,
                    unlimited_quota = excluded.unlimited_quota,
                    expired_time = excluded.expired_time,
                    created_time = excluded.created_time,
                    accessed_time = excluded.accessed_time
                "#,
            )
            .bind(row.id)
            .bind(row.user_id)
            .bind(&row.name)
            .bind(row.status)
            .bind(row.remain_quota)
            .bind(row.used_quota)
            .bind(row.unlimited_quota)
            .bind(row.expired_time)
            .bind(row.created_time)
            .bind(row.accessed_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    pub async fn upsert_users(&self, rows: &[UserInfo]) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO users
                    (id, username, display_name, user_role, quota, used_quota, request_count, user_group)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (id) DO UPDATE SET
                    username = excluded.username,
                    display_name = excluded.display_name,
                    user_role = excluded.user_role,
                    quota = excluded.quota,
                    used_quota = excluded.used_quota,
                    request_count = excluded.request_count,
                    user_group = excluded.user_group
                "#,
            )
            .bind(row.id)
            .bind(&row.username)
            .bind(&row.display_name)
            .bind(row.user_role)
            .bind(row.quota)
            .bind(row.used_quota)
            .bind(row.request_count)
            .bind(&row.user_group)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    /// Apply one metadata sync document.
    ///
    /// Expected shape: `{"channel": [...], "token": [...], "user": [...]}`
    /// (plural key spellings are accepted too). Absent sections are simply
    /// not synced; malformed rows are skipped.
    pub async fn sync_metadata(
        &self,
        doc: &serde_json::Value,
    ) -> Result<MetadataReport, IngestError> {
        if !doc.is_object() {
            return Err(IngestError::UnsupportedShape);
        }

        let mut skipped: u64 = 0;
        let channels: Vec<ChannelInfo> = collect_rows(doc, &["channel", "channels"], &mut skipped);
        let tokens: Vec<TokenInfo> = collect_rows(doc, &["token", "tokens"], &mut skipped);
        let users: Vec<UserInfo> = collect_rows(doc, &["user", "users"], &mut skipped);

        let report = MetadataReport {
            channels: self.upsert_channels(&channels).await.map_err(IngestError::Db)?,
            tokens: self.upsert_tokens(&tokens).await.map_err(IngestError::Db)?,
            users: self.upsert_users(&users).await.map_err(IngestError::Db)?,
        };

        info!(
            channels = report.channels,
            tokens = report.tokens,
            users = report.users,
            skipped,
            "metadata sync complete"
        );
        Ok(report)
    }
}
