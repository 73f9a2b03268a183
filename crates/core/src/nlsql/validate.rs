// crates/core/src/nlsql/validate.rs
//! The SQL safety gate.
//!
//! A textual gate, not a full parser: it guarantees the statement is a
//! single read, touches only allow-listed tables, and contains no
//! write/DDL keyword anywhere (subqueries included). It does not guarantee
//! the query answers the question; that remains advisory.

use regex_lite::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Keywords that reject a statement outright, wherever they appear.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "replace", "truncate", "attach",
    "detach", "pragma", "vacuum", "reindex", "grant", "revoke",
];

/// Reasons the gate rejects a statement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGateError {
    #[error("statement is not a read-only SELECT")]
    NotASelect,

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("forbidden keyword: {0}")]
    ForbiddenKeyword(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("system catalog access is not allowed: {0}")]
    CatalogAccess(String),

    #[error("unresolved time placeholder")]
    UnresolvedPlaceholder,
}

fn sql_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:select|with)\b").expect("valid sql-start regex"))
}

fn leading_select_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:select|with)\b").expect("valid leading-select regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid identifier regex"))
}

fn table_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .expect("valid table-ref regex")
    })
}

/// Pull the SQL statement out of raw completion output.
///
/// Handles markdown fences and leading prose; returns None when no
/// SELECT/WITH statement can be found at all.
pub fn extract_sql(text: &str) -> Option<String> {
    let candidate = fenced_block(text).unwrap_or(text);
    let m = sql_start_re().find(candidate)?;
    let sql = &candidate[m.start()..];
    let sql = sql.split("```").next().unwrap_or(sql);
    let sql = sql.trim().trim_end_matches(';').trim();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

/// Contents of the first ``` fenced block, if any, with an optional
/// language tag skipped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// Remove `--` line comments and `/* */` block comments. The gate rejects
/// on the stripped text so keywords cannot hide inside comments; anything
/// resembling a comment inside a string literal is treated as a comment
/// too, which only ever makes the gate stricter.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' && chars.peek() == Some(&'-') {
            chars.next();
            for c2 in chars.by_ref() {
                if c2 == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = ' ';
            for c2 in chars.by_ref() {
                if prev == '*' && c2 == '/' {
                    break;
                }
                prev = c2;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// The tables a statement references via FROM/JOIN, lowercased.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    table_ref_re()
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_ascii_lowercase()))
        .collect()
}

/// Validate a generated statement against the safety gate.
///
/// All conditions must hold: single statement, read-only root, no forbidden
/// keyword anywhere, every referenced table allow-listed, no catalog access,
/// no leftover time placeholders.
pub fn validate_sql(sql: &str, allowed_tables: &[&str]) -> Result<(), SqlGateError> {
    let cleaned = strip_comments(sql);
    let trimmed = cleaned.trim().trim_end_matches(';').trim();

    if trimmed.is_empty() {
        return Err(SqlGateError::NotASelect);
    }
    if trimmed.contains(';') {
        return Err(SqlGateError::MultipleStatements);
    }
    if trimmed.contains("{start_ts}") || trimmed.contains("{end_ts}") {
        return Err(SqlGateError::UnresolvedPlaceholder);
    }
    if leading_select_re().find(trimmed).is_none() {
        return Err(SqlGateError::NotASelect);
    }

    for m in identifier_re().find_iter(trimmed) {
        let word = m.as_str().to_ascii_lowercase();
        if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
            return Err(SqlGateError::ForbiddenKeyword(word));
        }
        if word.starts_with("sqlite_") {
            return Err(SqlGateError::CatalogAccess(word));
        }
    }

    for table in referenced_tables(trimmed) {
        if !allowed_tables
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&table))
        {
            return Err(SqlGateError::UnknownTable(table));
        }
    }

    Ok(())
}
