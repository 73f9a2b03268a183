// crates/db/src/grounding.rs
//! Schema grounding: the textual database description supplied to the
//! completion call so generated SQL references real tables and columns.
//!
//! The catalog is static (it mirrors the migration schema); the description
//! is augmented per call with live sample values for low-cardinality
//! dimension columns and the covered time range, so it reflects current
//! data. Callers cache the result for a short TTL.

use crate::{Database, DbResult};

/// Semantic role of a column, stated in the grounding text so the model
/// knows what to filter, group, and sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Time,
    Dimension,
    Metric,
    Attribute,
}

impl ColumnRole {
    fn as_str(self) -> &'static str {
        match self {
            ColumnRole::Time => "time",
            ColumnRole::Dimension => "dimension",
            ColumnRole::Metric => "metric",
            ColumnRole::Attribute => "attribute",
        }
    }
}

/// One column of a queryable table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub role: ColumnRole,
    pub description: &'static str,
}

/// One queryable table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [ColumnSpec],
}

const fn col(
    name: &'static str,
    sql_type: &'static str,
    role: ColumnRole,
    description: &'static str,
) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        role,
        description,
    }
}

/// The static table catalog. Every table here is on the executor
/// allow-list; nothing else is queryable.
pub const CATALOG: &[TableSpec] = &[
    TableSpec {
        name: "usage_log",
        description: "Raw per-request log of model API calls. One row per call.",
        columns: &[
            col("created_at", "INTEGER", ColumnRole::Time, "Unix timestamp (seconds) of the call"),
            col("model_name", "TEXT", ColumnRole::Dimension, "Model identifier, case-sensitive (e.g. 'deepseek-r1')"),
            col("channel_id", "INTEGER", ColumnRole::Dimension, "Routing channel id"),
            col("channel_name", "TEXT", ColumnRole::Dimension, "Routing channel display name"),
            col("user_id", "INTEGER", ColumnRole::Dimension, "Id of the calling user"),
            col("token_name", "TEXT", ColumnRole::Dimension, "Name of the API token used"),
            col("prompt_tokens", "INTEGER", ColumnRole::Metric, "Tokens in the prompt"),
            col("completion_tokens", "INTEGER", ColumnRole::Metric, "Tokens in the completion"),
            col("total_tokens", "INTEGER", ColumnRole::Metric, "Total tokens for the call"),
            col("quota", "INTEGER", ColumnRole::Metric, "Cost in quota units; often summed"),
            col("use_time", "INTEGER", ColumnRole::Metric, "Request latency in seconds; often averaged"),
            col("is_stream", "INTEGER", ColumnRole::Attribute, "1 when the call used streaming"),
        ],
    },
    TableSpec {
        name: "model_stats",
        description: "Per-model usage rollups. One row per (model, granularity, bucket); \
                      granularity is 'hour', 'day' or 'week' and bucket_start is the bucket's \
                      first second. Filter on granularity to avoid double counting.",
        columns: &[
            col("model_name", "TEXT", ColumnRole::Dimension, "Model identifier, case-sensitive"),
            col("granularity", "TEXT", ColumnRole::Dimension, "Bucket width: 'hour', 'day' or 'week'"),
            col("bucket_start", "INTEGER", ColumnRole::Time, "Unix timestamp of the bucket start; use in BETWEEN range queries"),
            col("count", "INTEGER", ColumnRole::Metric, "API calls in the bucket; often summed"),
            col("token_used", "INTEGER", ColumnRole::Metric, "Tokens processed in the bucket; often summed"),
            col("quota", "INTEGER", ColumnRole::Metric, "Cost in quota units for the bucket; often summed"),
            col("rpm", "REAL", ColumnRole::Metric, "Requests per minute in the bucket; average over ranges"),
            col("tpm", "REAL", ColumnRole::Metric, "Tokens per minute in the bucket; average over ranges"),
        ],
    },
    TableSpec {
        name: "channel_stats",
        description: "Per-(channel, model) usage rollups, same bucket semantics as model_stats.",
        columns: &[
            col("channel_id", "INTEGER", ColumnRole::Dimension, "Routing channel id"),
            col("channel_name", "TEXT", ColumnRole::Dimension, "Channel display name; vendors are name prefixes"),
            col("model_name", "TEXT", ColumnRole::Dimension, "Model identifier"),
            col("granularity", "TEXT", ColumnRole::Dimension, "Bucket width: 'hour', 'day' or 'week'"),
            col("bucket_start", "INTEGER", ColumnRole::Time, "Unix timestamp of the bucket start"),
            col("count", "INTEGER", ColumnRole::Metric, "API calls in the bucket"),
            col("token_used", "INTEGER", ColumnRole::Metric, "Tokens processed in the bucket"),
            col("quota", "INTEGER", ColumnRole::Metric, "Cost in quota units for the bucket"),
            col("rpm", "REAL", ColumnRole::Metric, "Requests per minute in the bucket"),
            col("tpm", "REAL", ColumnRole::Metric, "Tokens per minute in the bucket"),
        ],
    },
    TableSpec {
        name: "channels",
        description: "Routing channel metadata mirrored from the upstream gateway.",
        columns: &[
            col("id", "INTEGER", ColumnRole::Dimension, "Channel id"),
            col("name", "TEXT", ColumnRole::Dimension, "Channel display name"),
            col("type", "INTEGER", ColumnRole::Attribute, "Channel provider type code"),
            col("status", "INTEGER", ColumnRole::Attribute, "1 = active, 2 = inactive"),
            col("response_time", "INTEGER", ColumnRole::Metric, "Latest probe response time in milliseconds"),
            col("models", "TEXT", ColumnRole::Attribute, "Comma-separated models served by the channel"),
            col("priority", "INTEGER", ColumnRole::Attribute, "Routing priority"),
            col("used_quota", "INTEGER", ColumnRole::Metric, "Total quota consumed through the channel"),
            col("created_time", "INTEGER", ColumnRole::Time, "Unix timestamp of channel creation"),
        ],
    },
    TableSpec {
        name: "tokens",
        description: "API token metadata: quotas and usage per token.",
        columns: &[
            col("id", "INTEGER", ColumnRole::Dimension, "Token id"),
            col("user_id", "INTEGER", ColumnRole::Dimension, "Owning user id"),
            col("name", "TEXT", ColumnRole::Dimension, "Token name"),
            col("status", "INTEGER", ColumnRole::Attribute, "1 = active, 0 = disabled"),
            col("remain_quota", "INTEGER", ColumnRole::Metric, "Remaining quota for the token"),
            col("used_quota", "INTEGER", ColumnRole::Metric, "Quota consumed by the token"),
            col("unlimited_quota", "INTEGER", ColumnRole::Attribute, "1 when the token is not quota-limited"),
            col("expired_time", "INTEGER", ColumnRole::Time, "Unix timestamp of expiry; -1 means never"),
            col("created_time", "INTEGER", ColumnRole::Time, "Unix timestamp of creation"),
            col("accessed_time", "INTEGER", ColumnRole::Time, "Unix timestamp of last use"),
        ],
    },
    TableSpec {
        name: "users",
        description: "User accounts: quota allocation and usage per user.",
        columns: &[
            col("id", "INTEGER", ColumnRole::Dimension, "User id"),
            col("username", "TEXT", ColumnRole::Dimension, "Login name"),
            col("display_name", "TEXT", ColumnRole::Attribute, "Human-readable name"),
            col("user_role", "INTEGER", ColumnRole::Attribute, "100 = admin, 1 = regular user"),
            col("quota", "INTEGER", ColumnRole::Metric, "Total quota allocated"),
            col("used_quota", "INTEGER", ColumnRole::Metric, "Quota consumed"),
            col("request_count", "INTEGER", ColumnRole::Metric, "Total API requests made"),
            col("user_group", "TEXT", ColumnRole::Dimension, "Billing group"),
        ],
    },
];

/// The executor/table allow-list, derived from the catalog.
pub fn allowed_tables() -> Vec<&'static str> {
    CATALOG.iter().map(|t| t.name).collect()
}

/// Convenience handle for callers that want both pieces of grounding.
#[derive(Debug, Clone)]
pub struct SchemaCatalog;

impl SchemaCatalog {
    /// Render the static catalog (no live data).
    pub fn static_description() -> String {
        let mut parts = Vec::new();
        for table in CATALOG {
            parts.push(format!("Table '{}': {}", table.name, table.description));
            parts.push("Columns:".to_string());
            for column in table.columns {
                parts.push(format!(
                    "  - {} ({}, {}): {}",
                    column.name,
                    column.sql_type,
                    column.role.as_str(),
                    column.description
                ));
            }
            parts.push(String::new());
        }
        parts.join("\n")
    }
}

impl Database {
    /// Produce the full grounding text: static catalog plus live sample
    /// values and data coverage. Regenerated per call; cache behind a short
    /// TTL to bound the descriptive queries.
    pub async fn describe_schema(&self, sample_limit: usize) -> DbResult<String> {
        let mut text = SchemaCatalog::static_description();

        let limit = sample_limit.max(1) as i64;

        let models: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT model_name FROM model_stats ORDER BY model_name LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        if !models.is_empty() {
            let names: Vec<String> = models.into_iter().map(|(name,)| name).collect();
            text.push_str(&format!(
                "Current model_name values: {}\n",
                names.join(", ")
            ));
        }

        let channels: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT channel_name FROM channel_stats WHERE channel_name != '' \
             ORDER BY channel_name LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        if !channels.is_empty() {
            let names: Vec<String> = channels.into_iter().map(|(name,)| name).collect();
            text.push_str(&format!(
                "Current channel_name values: {}\n",
                names.join(", ")
            ));
        }

        let coverage: (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(created_at), MAX(created_at) FROM usage_log")
                .fetch_one(self.pool())
                .await?;

        if let (Some(min), Some(max)) = coverage {
            text.push_str(&format!("Raw data covers timestamps {min}..{max}\n"));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenlens_core::nlsql::validate::validate_sql;

    #[test]
    fn test_catalog_covers_all_queryable_tables() {
        let tables = allowed_tables();
        assert_eq!(
            tables,
            vec!["usage_log", "model_stats", "channel_stats", "channels", "tokens", "users"]
        );
    }

    #[test]
    fn test_static_description_mentions_every_table_and_role() {
        let text = SchemaCatalog::static_description();
        for table in CATALOG {
            assert!(text.contains(&format!("Table '{}'", table.name)));
        }
        assert!(text.contains("(INTEGER, time)"));
        assert!(text.contains("(TEXT, dimension)"));
        assert!(text.contains("(INTEGER, metric)"));
    }

    #[test]
    fn test_allow_list_accepts_catalog_tables() {
        // The gate and the catalog must agree on what is queryable.
        let tables = allowed_tables();
        let sql = "SELECT model_name, SUM(count) FROM model_stats GROUP BY model_name";
        assert!(validate_sql(sql, &tables).is_ok());
    }

    #[tokio::test]
    async fn test_describe_schema_includes_live_samples() {
        let db = Database::new_in_memory().await.unwrap();

        // No data yet: static text only, no sample lines
        let text = db.describe_schema(10).await.unwrap();
        assert!(text.contains("Table 'model_stats'"));
        assert!(!text.contains("Current model_name values"));

        // Seed raw usage and aggregate so model_stats has sample values
        let doc = serde_json::json!([
            {"created_at": 1_747_130_401, "model_name": "deepseek-r1", "prompt_tokens": 10, "completion_tokens": 5, "quota": 3},
            {"created_at": 1_747_130_402, "model_name": "gpt-4o", "prompt_tokens": 20, "completion_tokens": 5, "quota": 9}
        ]);
        db.ingest_usage(&doc).await.unwrap();
        db.aggregate_range(1_747_130_400, 1_747_134_000, tokenlens_core::Granularity::Hour)
            .await
            .unwrap();

        let text = db.describe_schema(10).await.unwrap();
        assert!(text.contains("Current model_name values: deepseek-r1, gpt-4o"));
        assert!(text.contains("Raw data covers timestamps 1747130401..1747130402"));
    }
}
