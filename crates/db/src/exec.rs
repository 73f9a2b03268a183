// crates/db/src/exec.rs
//! Sandboxed execution of validated ad-hoc statements.
//!
//! Defense in depth: statements only arrive here after the textual safety
//! gate, and the executor additionally runs them under `PRAGMA query_only`
//! so even a statement that slipped the gate cannot write. Results are
//! bounded by a row cap and a statement timeout.

use crate::Database;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tokenlens_core::{QueryOutput, SqlValue};
use tokio::time::Duration;

/// Bounds applied to every ad-hoc statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Maximum rows materialized; one extra row is fetched as a sentinel.
    pub row_cap: usize,
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            row_cap: 200,
            timeout_secs: 10,
        }
    }
}

/// Execution failures. The offending SQL is retained in operator logs,
/// never in these messages.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("query timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("result exceeded the row cap of {cap}")]
    RowCap { cap: usize },

    #[error("SQL execution failed: {message}")]
    Sql { message: String },

    #[error("store unavailable: {0}")]
    Db(#[from] sqlx::Error),
}

fn decode_cell(row: &SqliteRow, idx: usize) -> SqlValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) => {
            if raw.is_null() {
                return SqlValue::Null;
            }
            raw.type_info().name().to_string()
        }
        Err(_) => return SqlValue::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(idx)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        "REAL" => row
            .try_get::<f64, _>(idx)
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        "BLOB" => SqlValue::Text("<blob>".to_string()),
        _ => row
            .try_get::<String, _>(idx)
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    }
}

impl Database {
    /// Execute a validated read-only statement with a row cap and timeout.
    ///
    /// The statement is wrapped in `SELECT * FROM (...) LIMIT cap+1`, which
    /// both enforces the cap and makes any non-SELECT a syntax error, and
    /// the connection runs under `PRAGMA query_only` for the duration.
    pub async fn run_readonly(
        &self,
        sql: &str,
        config: &ExecConfig,
    ) -> Result<QueryOutput, ExecutionError> {
        let cap = config.row_cap.max(1);
        let wrapped = format!(
            "SELECT * FROM ( {} ) LIMIT {}",
            sql.trim().trim_end_matches(';'),
            cap + 1
        );

        let mut conn = self.pool().acquire().await?;
        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await?;

        let fetch = tokio::time::timeout(
            Duration::from_secs(config.timeout_secs),
            sqlx::query(&wrapped).fetch_all(&mut *conn),
        )
        .await;

        let rows = match fetch {
            Err(_elapsed) => {
                tracing::warn!(sql, timeout_secs = config.timeout_secs, "ad-hoc query timed out");
                // The connection may still be mid-statement; close it in the
                // background rather than returning it to the pool with
                // query_only set.
                let inner = conn.detach();
                tokio::spawn(async move {
                    let _ = inner.close().await;
                });
                return Err(ExecutionError::Timeout {
                    secs: config.timeout_secs,
                });
            }
            Ok(fetch_result) => {
                let reset = sqlx::query("PRAGMA query_only = OFF")
                    .execute(&mut *conn)
                    .await;
                if let Err(e) = reset {
                    tracing::warn!(error = %e, "failed to reset query_only; discarding connection");
                    let inner = conn.detach();
                    tokio::spawn(async move {
                        let _ = inner.close().await;
                    });
                }
                match fetch_result {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::warn!(sql, error = %e, "ad-hoc query failed");
                        return Err(ExecutionError::Sql {
                            message: e.to_string(),
                        });
                    }
                }
            }
        };

        if rows.len() > cap {
            tracing::warn!(sql, cap, "ad-hoc query exceeded the row cap");
            return Err(ExecutionError::RowCap { cap });
        }

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let decoded = rows
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| decode_cell(row, i))
                    .collect()
            })
            .collect();

        Ok(QueryOutput {
            columns,
            rows: decoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        let doc = json!([
            {"created_at": 1000, "model_name": "deepseek-r1", "prompt_tokens": 10, "completion_tokens": 5, "quota": 3},
            {"created_at": 2000, "model_name": "gpt-4o", "prompt_tokens": 20, "completion_tokens": 10, "quota": 9},
            {"created_at": 3000, "model_name": "gpt-4o", "prompt_tokens": 30, "completion_tokens": 10, "quota": 12}
        ]);
        db.ingest_usage(&doc).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_run_readonly_returns_columns_and_rows() {
        let db = seeded_db().await;
        let out = db
            .run_readonly(
                "SELECT model_name, SUM(total_tokens) AS tokens FROM usage_log GROUP BY model_name ORDER BY model_name",
                &ExecConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(out.columns, vec!["model_name", "tokens"]);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0][0], SqlValue::Text("deepseek-r1".into()));
        assert_eq!(out.rows[0][1], SqlValue::Int(15));
        assert_eq!(out.rows[1][1], SqlValue::Int(70));
    }

    #[tokio::test]
    async fn test_run_readonly_decodes_reals_and_nulls() {
        let db = seeded_db().await;
        let out = db
            .run_readonly(
                "SELECT AVG(quota) AS avg_quota, NULL AS nothing FROM usage_log",
                &ExecConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.rows[0][0], SqlValue::Real(8.0));
        assert_eq!(out.rows[0][1], SqlValue::Null);
    }

    #[tokio::test]
    async fn test_write_statement_is_a_syntax_error() {
        let db = seeded_db().await;
        let err = db
            .run_readonly("DELETE FROM usage_log", &ExecConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Sql { .. }));

        // Nothing was deleted
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_log")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_row_cap_enforced() {
        let db = seeded_db().await;
        let config = ExecConfig {
            row_cap: 2,
            timeout_secs: 10,
        };
        let err = db
            .run_readonly("SELECT * FROM usage_log", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::RowCap { cap: 2 }));
    }

    #[tokio::test]
    async fn test_rows_at_cap_are_returned() {
        let db = seeded_db().await;
        let config = ExecConfig {
            row_cap: 3,
            timeout_secs: 10,
        };
        let out = db.run_readonly("SELECT * FROM usage_log", &config).await.unwrap();
        assert_eq!(out.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_query_only_is_reset_for_the_pool() {
        let db = seeded_db().await;
        db.run_readonly("SELECT COUNT(*) FROM usage_log", &ExecConfig::default())
            .await
            .unwrap();

        // Writers still work afterwards
        let doc = json!([{"created_at": 4000, "model_name": "gpt-4o"}]);
        let report = db.ingest_usage(&doc).await.unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[tokio::test]
    async fn test_zero_row_result_is_empty_output() {
        let db = seeded_db().await;
        let out = db
            .run_readonly(
                "SELECT model_name FROM usage_log WHERE model_name = 'missing'",
                &ExecConfig::default(),
            )
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
