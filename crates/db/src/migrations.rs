/// Inline SQL migrations for the tokenlens database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: raw usage log, the source of truth for all rollups
    r#"
CREATE TABLE IF NOT EXISTS usage_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    channel_id INTEGER NOT NULL DEFAULT 0,
    channel_name TEXT NOT NULL DEFAULT '',
    user_id INTEGER NOT NULL DEFAULT 0,
    token_name TEXT NOT NULL DEFAULT '',
    prompt_tokens INTEGER NOT NULL DEFAULT 0,
    completion_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    quota INTEGER NOT NULL DEFAULT 0,
    use_time INTEGER NOT NULL DEFAULT 0,
    is_stream INTEGER NOT NULL DEFAULT 0
);
"#,
    // Migration 2: usage_log indexes
    r#"
CREATE INDEX IF NOT EXISTS idx_usage_log_created ON usage_log(created_at);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_usage_log_model_created ON usage_log(model_name, created_at);
"#,
    // Migration 3: per-model rollups, one row per (model, granularity, bucket)
    r#"
CREATE TABLE IF NOT EXISTS model_stats (
    model_name TEXT NOT NULL,
    granularity TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    token_used INTEGER NOT NULL DEFAULT 0,
    quota INTEGER NOT NULL DEFAULT 0,
    rpm REAL NOT NULL DEFAULT 0,
    tpm REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (model_name, granularity, bucket_start)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_model_stats_bucket ON model_stats(granularity, bucket_start);
"#,
    // Migration 4: per-(channel, model) rollups
    r#"
CREATE TABLE IF NOT EXISTS channel_stats (
    channel_id INTEGER NOT NULL,
    channel_name TEXT NOT NULL DEFAULT '',
    model_name TEXT NOT NULL,
    granularity TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    token_used INTEGER NOT NULL DEFAULT 0,
    quota INTEGER NOT NULL DEFAULT 0,
    rpm REAL NOT NULL DEFAULT 0,
    tpm REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (channel_id, model_name, granularity, bucket_start)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_channel_stats_bucket ON channel_stats(granularity, bucket_start);
"#,
    // Migration 5: metadata mirrors, written only by the sync path
    r#"
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    type INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 1,
    response_time INTEGER NOT NULL DEFAULT 0,
    models TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 0,
    used_quota INTEGER NOT NULL DEFAULT 0,
    created_time INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS tokens (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 1,
    remain_quota INTEGER NOT NULL DEFAULT 0,
    used_quota INTEGER NOT NULL DEFAULT 0,
    unlimited_quota INTEGER NOT NULL DEFAULT 0,
    expired_time INTEGER NOT NULL DEFAULT -1,
    created_time INTEGER NOT NULL DEFAULT 0,
    accessed_time INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    display_name TEXT NOT NULL DEFAULT '',
    user_role INTEGER NOT NULL DEFAULT 1,
    quota INTEGER NOT NULL DEFAULT 0,
    used_quota INTEGER NOT NULL DEFAULT 0,
    request_count INTEGER NOT NULL DEFAULT 0,
    user_group TEXT NOT NULL DEFAULT 'default'
);
"#,
];
