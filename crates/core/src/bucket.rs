// crates/core/src/bucket.rs
//! Fixed-width time bucketing for rollup tables.
//!
//! Buckets are `[bucket_start, bucket_start + width)` windows anchored at the
//! Unix epoch, so for a given granularity they partition the timeline with no
//! gaps and no overlaps. Week buckets are fixed 604800-second windows, not
//! calendar weeks, so the partition invariant holds uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of a rollup bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
}

#[derive(Debug, Error)]
#[error("unknown granularity: {0} (expected hour, day, or week)")]
pub struct UnknownGranularity(String);

impl Granularity {
    /// All granularities, coarsest last. Aggregation runs walk this list.
    pub const ALL: [Granularity; 3] = [Granularity::Hour, Granularity::Day, Granularity::Week];

    /// Bucket width in seconds.
    pub fn width_secs(self) -> i64 {
        match self {
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
            Granularity::Week => 604_800,
        }
    }

    /// Bucket width in minutes, used to derive per-minute rates.
    pub fn width_minutes(self) -> f64 {
        self.width_secs() as f64 / 60.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
        }
    }

    /// Floor a timestamp to the start of its bucket.
    pub fn bucket_start(self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.width_secs())
    }

    /// Expand `[start, end)` outward to bucket boundaries so that every
    /// bucket touching the window is recomputed in full. This is what makes
    /// re-aggregation overwrite whole-bucket totals instead of partial ones.
    pub fn align_window(self, start: i64, end: i64) -> (i64, i64) {
        let aligned_start = self.bucket_start(start);
        let aligned_end = if end.rem_euclid(self.width_secs()) == 0 {
            end
        } else {
            self.bucket_start(end) + self.width_secs()
        };
        (aligned_start, aligned_end)
    }

    /// The bucket start values covering `[start, end)`, in ascending order.
    pub fn buckets_covering(self, start: i64, end: i64) -> Vec<i64> {
        let (aligned_start, aligned_end) = self.align_window(start, end);
        let width = self.width_secs();
        let mut buckets = Vec::new();
        let mut cursor = aligned_start;
        while cursor < aligned_end {
            buckets.push(cursor);
            cursor += width;
        }
        buckets
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Granularity::Hour),
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            other => Err(UnknownGranularity(other.to_string())),
        }
    }
}
