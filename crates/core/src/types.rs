// crates/core/src/types.rs
//! Shared domain types: raw usage records, metadata mirrors, chat turns,
//! and the dynamic query result shape passed between the executor and the
//! formatter.

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw usage records
// ============================================================================

/// One API call as exported by the upstream gateway's usage log.
///
/// Field names follow the upstream JSON exactly so bulk exports deserialize
/// without a mapping layer. Records are immutable once ingested; every
/// rollup is recomputed from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogRecord {
    /// Unix timestamp (seconds) of the request.
    pub created_at: i64,
    /// Model identifier, e.g. "deepseek-r1". Case-sensitive.
    pub model_name: String,
    /// Upstream channel id the request was routed through.
    #[serde(default, alias = "channel")]
    pub channel_id: i64,
    /// Display name of the channel, if the exporter includes it.
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    /// Total tokens; computed from prompt + completion when absent.
    #[serde(default)]
    pub total_tokens: Option<i64>,
    /// Cost in upstream quota units.
    #[serde(default)]
    pub quota: i64,
    /// Request latency in seconds as reported by the gateway.
    #[serde(default)]
    pub use_time: i64,
    #[serde(default)]
    pub is_stream: bool,
}

impl RawLogRecord {
    /// Total tokens for this call, deriving from the parts when the
    /// exporter omitted the precomputed sum.
    pub fn total_tokens(&self) -> i64 {
        self.total_tokens
            .unwrap_or(self.prompt_tokens + self.completion_tokens)
    }
}

// ============================================================================
// Metadata mirrors (synced from the upstream billing system)
// ============================================================================

/// Routing channel metadata, mirrored read-only for the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub status: i64,
    /// Response time in milliseconds from the most recent upstream probe.
    #[serde(default)]
    pub response_time: i64,
    /// Comma-separated list of models served by this channel.
    #[serde(default)]
    pub models: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(default)]
    pub created_time: i64,
}

/// API token metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub remain_quota: i64,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(default)]
    pub unlimited_quota: bool,
    /// Unix timestamp of expiry; -1 means never.
    #[serde(default = "default_expired_time")]
    pub expired_time: i64,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub accessed_time: i64,
}

fn default_expired_time() -> i64 {
    -1
}

/// User account metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub user_role: i64,
    #[serde(default)]
    pub quota: i64,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub user_group: String,
}

// ============================================================================
// Conversation turns
// ============================================================================

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message in a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Dynamic query results
// ============================================================================

/// A single SQLite value decoded from an ad-hoc statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Raw textual rendering without any formatting rules applied.
    pub fn raw(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Real(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlValue::Int(_) | SqlValue::Real(_))
    }
}

/// Column names plus decoded rows from one executed statement.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when the result is a single scalar (one row, one column).
    pub fn is_scalar(&self) -> bool {
        self.rows.len() == 1 && self.rows[0].len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_accepts_upstream_field_names() {
        let json = r#"{
            "created_at": 1747130400,
            "model_name": "deepseek-r1",
            "channel": 56,
            "channel_name": "tencent-dp",
            "user_id": 2,
            "prompt_tokens": 1884,
            "completion_tokens": 182,
            "quota": 3265,
            "use_time": 10,
            "is_stream": true
        }"#;
        let record: RawLogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.channel_id, 56);
        assert_eq!(record.total_tokens(), 2066);
        assert!(record.is_stream);
    }

    #[test]
    fn test_raw_record_total_tokens_prefers_explicit() {
        let record = RawLogRecord {
            created_at: 1,
            model_name: "gpt-4o".into(),
            channel_id: 0,
            channel_name: String::new(),
            user_id: 0,
            token_name: String::new(),
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: Some(20),
            quota: 0,
            use_time: 0,
            is_stream: false,
        };
        assert_eq!(record.total_tokens(), 20);
    }

    #[test]
    fn test_raw_record_missing_optional_fields_default() {
        let json = r#"{"created_at": 100, "model_name": "gpt-4o"}"#;
        let record: RawLogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.channel_id, 0);
        assert_eq!(record.total_tokens(), 0);
        assert!(!record.is_stream);
    }

    #[test]
    fn test_channel_info_type_field_rename() {
        let json = r#"{"id": 58, "name": "zmnz-gpt-all", "type": 1}"#;
        let channel: ChannelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(channel.kind, 1);
    }

    #[test]
    fn test_token_info_default_expiry_is_never() {
        let json = r#"{"id": 4, "name": "aliyun-1"}"#;
        let token: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(token.expired_time, -1);
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        let turn = ChatTurn::user("usage for deepseek-r1 today");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_query_output_scalar_detection() {
        let scalar = QueryOutput {
            columns: vec!["total".into()],
            rows: vec![vec![SqlValue::Int(42)]],
        };
        assert!(scalar.is_scalar());

        let table = QueryOutput {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![SqlValue::Int(1), SqlValue::Int(2)]],
        };
        assert!(!table.is_scalar());
        assert!(!table.is_empty());
    }
}
