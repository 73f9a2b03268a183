// crates/core/src/nlsql/timerange.rs
//! Time-range resolution for questions with relative phrasing.
//!
//! Explicit request bounds always win. Otherwise the question is scanned for
//! relative phrases ("today", "last 24 hours", …) against the caller's
//! clock, falling back to a configurable default window. The resolved range
//! replaces the `{start_ts}`/`{end_ts}` placeholders the prompt instructs
//! the model to emit.

use chrono::Datelike;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Default window when the question gives no usable bound: last 24 hours.
pub const DEFAULT_WINDOW_SECS: i64 = 86_400;

/// A resolved half-open time window `[start, end)` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:last|past)\s+(\d+)\s+(minute|hour|day|week)s?\b")
            .expect("valid relative-range regex")
    })
}

fn unit_secs(unit: &str) -> i64 {
    match unit.to_ascii_lowercase().as_str() {
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        _ => 604_800,
    }
}

fn utc_midnight(ts: i64) -> i64 {
    ts - ts.rem_euclid(86_400)
}

/// Start of the current calendar week (Monday 00:00 UTC).
fn week_start(now: i64) -> i64 {
    match chrono::DateTime::from_timestamp(now, 0) {
        Some(dt) => {
            let days_since_monday = dt.weekday().num_days_from_monday() as i64;
            utc_midnight(now) - days_since_monday * 86_400
        }
        None => utc_midnight(now),
    }
}

/// Resolve the time window for a question.
///
/// Precedence: explicit bounds from the request, then relative phrases in
/// the question, then the default window ending at `now`.
pub fn resolve_time_range(
    question: &str,
    explicit_start: Option<i64>,
    explicit_end: Option<i64>,
    default_window_secs: i64,
    now: i64,
) -> TimeRange {
    match (explicit_start, explicit_end) {
        (Some(start), Some(end)) => return TimeRange::new(start, end),
        (Some(start), None) => return TimeRange::new(start, now),
        (None, Some(end)) => return TimeRange::new(end - default_window_secs, end),
        (None, None) => {}
    }

    let lowered = question.to_ascii_lowercase();

    if let Some(caps) = relative_re().captures(&lowered) {
        let n: i64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("day");
        let window = n.max(1) * unit_secs(unit);
        return TimeRange::new(now - window, now);
    }

    if lowered.contains("yesterday") {
        let midnight = utc_midnight(now);
        return TimeRange::new(midnight - 86_400, midnight);
    }
    if lowered.contains("today") {
        return TimeRange::new(utc_midnight(now), now);
    }
    if lowered.contains("this week") {
        return TimeRange::new(week_start(now), now);
    }
    if lowered.contains("last week") || lowered.contains("previous week") {
        let monday = week_start(now);
        return TimeRange::new(monday - 7 * 86_400, monday);
    }
    if lowered.contains("last hour") || lowered.contains("past hour") {
        return TimeRange::new(now - 3_600, now);
    }
    if lowered.contains("this month") {
        let month_start = chrono::DateTime::from_timestamp(now, 0)
            .and_then(|dt| dt.date_naive().with_day(1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc().timestamp())
            .unwrap_or(now - 30 * 86_400);
        return TimeRange::new(month_start, now);
    }

    TimeRange::new(now - default_window_secs, now)
}

/// Substitute the resolved window into the generated SQL's placeholders.
pub fn apply_time_range(sql: &str, range: TimeRange) -> String {
    sql.replace("{start_ts}", &range.start.to_string())
        .replace("{end_ts}", &range.end.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // A Tuesday, 2025-05-13 10:47:33 UTC
    const NOW: i64 = 1_747_133_253;

    #[test]
    fn test_last_24_hours_resolves_to_trailing_day() {
        let range = resolve_time_range(
            "tokens used by deepseek-r1 in the last 24 hours",
            None,
            None,
            DEFAULT_WINDOW_SECS,
            NOW,
        );
        assert_eq!(range.end, NOW);
        assert_eq!(range.start, NOW - 86_400);
    }

    #[test]
    fn test_explicit_bounds_win() {
        let range = resolve_time_range(
            "usage in the last 24 hours",
            Some(100),
            Some(200),
            DEFAULT_WINDOW_SECS,
            NOW,
        );
        assert_eq!(range, TimeRange::new(100, 200));
    }

    #[test]
    fn test_explicit_start_only_extends_to_now() {
        let range = resolve_time_range("usage", Some(1_000), None, DEFAULT_WINDOW_SECS, NOW);
        assert_eq!(range, TimeRange::new(1_000, NOW));
    }

    #[test]
    fn test_today_starts_at_utc_midnight() {
        let range = resolve_time_range("usage for deepseek-r1 today", None, None, DEFAULT_WINDOW_SECS, NOW);
        assert_eq!(range.start % 86_400, 0);
        assert!(range.start <= NOW && NOW - range.start < 86_400);
        assert_eq!(range.end, NOW);
    }

    #[test]
    fn test_yesterday_is_previous_utc_day() {
        let range = resolve_time_range("and yesterday?", None, None, DEFAULT_WINDOW_SECS, NOW);
        let midnight = NOW - NOW.rem_euclid(86_400);
        assert_eq!(range, TimeRange::new(midnight - 86_400, midnight));
        assert_eq!(range.duration_secs(), 86_400);
    }

    #[test]
    fn test_this_week_starts_monday() {
        let range = resolve_time_range("token usage this week", None, None, DEFAULT_WINDOW_SECS, NOW);
        // NOW is a Tuesday; Monday 00:00 UTC was 2025-05-12.
        let start = chrono::DateTime::from_timestamp(range.start, 0).unwrap();
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
        assert_eq!(range.end, NOW);
        assert!(range.duration_secs() < 7 * 86_400);
    }

    #[test]
    fn test_last_week_is_previous_calendar_week() {
        let range = resolve_time_range("and last week?", None, None, DEFAULT_WINDOW_SECS, NOW);
        assert_eq!(range.duration_secs(), 7 * 86_400);
        let start = chrono::DateTime::from_timestamp(range.start, 0).unwrap();
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
        assert!(range.end <= NOW);
    }

    #[test]
    fn test_last_n_units() {
        let range = resolve_time_range("requests in the past 3 hours", None, None, DEFAULT_WINDOW_SECS, NOW);
        assert_eq!(range, TimeRange::new(NOW - 3 * 3_600, NOW));

        let range = resolve_time_range("usage over the last 7 days", None, None, DEFAULT_WINDOW_SECS, NOW);
        assert_eq!(range, TimeRange::new(NOW - 7 * 86_400, NOW));
    }

    #[test]
    fn test_no_phrase_falls_back_to_default_window() {
        let range = resolve_time_range("how many tokens did gpt-4o use?", None, None, 86_400, NOW);
        assert_eq!(range, TimeRange::new(NOW - 86_400, NOW));
    }

    #[test]
    fn test_apply_time_range_substitutes_placeholders() {
        let sql = "SELECT SUM(token_used) FROM model_stats WHERE bucket_start BETWEEN {start_ts} AND {end_ts}";
        let out = apply_time_range(sql, TimeRange::new(100, 200));
        assert_eq!(
            out,
            "SELECT SUM(token_used) FROM model_stats WHERE bucket_start BETWEEN 100 AND 200"
        );
    }

    #[test]
    fn test_apply_time_range_no_placeholders_is_identity() {
        let sql = "SELECT 1";
        assert_eq!(apply_time_range(sql, TimeRange::new(1, 2)), sql);
    }
}
