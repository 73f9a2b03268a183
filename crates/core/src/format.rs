// crates/core/src/format.rs
//! Result formatting: turns a [`QueryOutput`] into user-facing answer text.
//!
//! Column formatting is driven by an explicit pattern → rule lookup table
//! rather than scattered heuristics, so behavior is total: unmatched columns
//! fall back to plain numeric/text rendering.

use crate::types::{QueryOutput, SqlValue};

/// How a column's values should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRule {
    /// Dollar amount with two decimals: `$12.30`.
    Currency,
    /// Percentage with up to one decimal: `12.3%`.
    Percent,
    /// Seconds rendered human-readable: `42s`, `3m 20s`.
    Duration,
    /// Integer with thousands separators: `1,234,567`.
    Numeric,
    /// Verbatim text.
    Text,
}

/// Column-name substring patterns, checked in order; first match wins.
/// Names are normalized (lowercased) before matching, so aggregate wrappers
/// like `SUM(quota)` still match their inner column.
const COLUMN_RULES: &[(&str, FormatRule)] = &[
    ("quota", FormatRule::Currency),
    ("cost", FormatRule::Currency),
    ("price", FormatRule::Currency),
    ("amount", FormatRule::Currency),
    ("spend", FormatRule::Currency),
    ("percent", FormatRule::Percent),
    ("pct", FormatRule::Percent),
    ("ratio", FormatRule::Percent),
    ("share", FormatRule::Percent),
    ("use_time", FormatRule::Duration),
    ("latency", FormatRule::Duration),
    ("duration", FormatRule::Duration),
];

/// Look up the formatting rule for a column name.
pub fn rule_for_column(column: &str) -> FormatRule {
    let normalized = column.to_ascii_lowercase();
    for (pattern, rule) in COLUMN_RULES {
        if normalized.contains(pattern) {
            return *rule;
        }
    }
    FormatRule::Numeric
}

/// Insert thousands separators into an integer.
pub fn group_thousands(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Format a duration given in whole seconds.
pub fn format_duration_secs(secs: i64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

fn format_currency(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = (cents % 100).abs();
    format!("${}.{:02}", group_thousands(whole), frac)
}

fn format_percent(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0}%", value)
    } else {
        format!("{:.1}%", value)
    }
}

fn format_numeric(value: &SqlValue) -> String {
    match value {
        SqlValue::Int(v) => group_thousands(*v),
        SqlValue::Real(v) => {
            if (v - v.round()).abs() < 1e-9 {
                group_thousands(v.round() as i64)
            } else {
                format!("{:.2}", v)
            }
        }
        other => other.raw(),
    }
}

/// Format a single cell under the given rule.
pub fn format_cell(rule: FormatRule, value: &SqlValue) -> String {
    match (rule, value) {
        (_, SqlValue::Null) => "-".to_string(),
        (FormatRule::Currency, SqlValue::Int(v)) => format_currency(*v as f64),
        (FormatRule::Currency, SqlValue::Real(v)) => format_currency(*v),
        (FormatRule::Percent, SqlValue::Int(v)) => format_percent(*v as f64),
        (FormatRule::Percent, SqlValue::Real(v)) => format_percent(*v),
        (FormatRule::Duration, SqlValue::Int(v)) => format_duration_secs(*v),
        (FormatRule::Duration, SqlValue::Real(v)) => format_duration_secs(v.round() as i64),
        (FormatRule::Numeric, v) => format_numeric(v),
        (_, SqlValue::Text(v)) => v.clone(),
        (FormatRule::Text, v) => v.raw(),
    }
}

/// Render a full query result as answer text.
///
/// - zero rows → a literal "no data" answer
/// - one row, one column → scalar formatting
/// - anything else → pipe-delimited table (header + one line per row) that
///   presentation layers can render as a table or chart
pub fn format_answer(output: &QueryOutput) -> String {
    if output.is_empty() {
        return "No data found for this query.".to_string();
    }

    if output.is_scalar() {
        let column = output.columns.first().map(String::as_str).unwrap_or("");
        return format_cell(rule_for_column(column), &output.rows[0][0]);
    }

    let rules: Vec<FormatRule> = output
        .columns
        .iter()
        .map(|c| rule_for_column(c))
        .collect();

    let mut lines = Vec::with_capacity(output.rows.len() + 1);
    lines.push(output.columns.join(" | "));
    for row in &output.rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| format_cell(rules.get(i).copied().unwrap_or(FormatRule::Text), v))
            .collect();
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}
