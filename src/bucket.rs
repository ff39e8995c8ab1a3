//! Hour bucketing
//!
//! All timestamps are seconds since the Unix epoch. A bucket key is the
//! timestamp truncated to the start of its hour: `t - t % 3600`.

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

pub const BUCKET_SECS: i64 = 3600;

/// Start of an hour-aligned window, in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey(i64);

impl BucketKey {
    pub fn as_secs(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a transport-level timestamp (decimal seconds) and validate it
pub fn parse_timestamp(raw: &str) -> Result<i64, AnalyticsError> {
    let timestamp = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| AnalyticsError::InvalidTimestamp(format!("'{}': {}", raw, e)))?;

    if timestamp < 0 {
        return Err(AnalyticsError::InvalidTimestamp(format!(
            "'{}': must be non-negative",
            raw
        )));
    }

    Ok(timestamp)
}

pub fn round_to_hour(timestamp: i64) -> Result<BucketKey, AnalyticsError> {
    if timestamp < 0 {
        return Err(AnalyticsError::InvalidTimestamp(format!(
            "{}: must be non-negative",
            timestamp
        )));
    }
    Ok(BucketKey(timestamp - timestamp % BUCKET_SECS))
}

/// True when `key` is the bucket containing `now`
pub fn is_current_bucket(key: BucketKey, now: i64) -> bool {
    match round_to_hour(now) {
        Ok(current) => current == key,
        Err(_) => false,
    }
}

/// Source of "now" for tier selection
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and replaying recorded traffic
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_hour_same_bucket() {
        let base = 1_700_002_800; // 2023-11-14T23:00:00Z
        assert_eq!(base % BUCKET_SECS, 0);

        let first = round_to_hour(base).unwrap();
        let last = round_to_hour(base + 3599).unwrap();
        let middle = round_to_hour(base + 1234).unwrap();

        assert_eq!(first, last);
        assert_eq!(first, middle);
        assert_eq!(first.as_secs(), base);
    }

    #[test]
    fn test_hour_boundaries_differ() {
        for t in [0, 59, 3599, 1_700_000_000, 1_700_003_599] {
            let a = round_to_hour(t).unwrap();
            let b = round_to_hour(t + 3601).unwrap();
            assert_ne!(a, b, "t={} and t+3601 must land in different buckets", t);
            assert!(b > a);
        }
        assert_ne!(round_to_hour(3599).unwrap(), round_to_hour(3600).unwrap());
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        assert!(matches!(
            round_to_hour(-1),
            Err(AnalyticsError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_timestamp(" 42 ").unwrap(), 42);

        for raw in ["", "abc", "12.5", "-3600", "99999999999999999999"] {
            assert!(
                matches!(parse_timestamp(raw), Err(AnalyticsError::InvalidTimestamp(_))),
                "'{}' should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_is_current_bucket() {
        let now = 1_700_000_000;
        let current = round_to_hour(now).unwrap();

        assert!(is_current_bucket(current, now));
        assert!(!is_current_bucket(round_to_hour(now - BUCKET_SECS).unwrap(), now));
        assert!(!is_current_bucket(current, now + BUCKET_SECS));
        assert!(!is_current_bucket(current, -5));
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(100);
        assert_eq!(clock.now(), 100);
        clock.advance(3600);
        assert_eq!(clock.now(), 3700);
        clock.set(7);
        assert_eq!(clock.now(), 7);
    }
}
