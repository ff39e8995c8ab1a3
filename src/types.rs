//! Core data types: ingested events, query results, and record naming

use crate::bucket::BucketKey;
use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};

pub const USER_PREFIX: &str = "user_";
pub const CLICKS_PREFIX: &str = "clicks_";
pub const IMPRESSIONS_PREFIX: &str = "impressions_";

/// One click/impression event for a user
///
/// Constructed per request and consumed immediately by `Aggregator::ingest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub user: String,
    pub click_increment: i64,
    pub impression_increment: i64,
}

impl Event {
    pub fn new(timestamp: i64, user: impl Into<String>, clicks: i64, impressions: i64) -> Self {
        Self {
            timestamp,
            user: user.into(),
            click_increment: clicks,
            impression_increment: impressions,
        }
    }

    /// Field checks other than the timestamp
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.user.trim().is_empty() {
            return Err(AnalyticsError::InvalidEvent("user cannot be empty".to_string()));
        }
        if self.click_increment < 0 {
            return Err(AnalyticsError::InvalidEvent(format!(
                "click increment must be non-negative, got {}",
                self.click_increment
            )));
        }
        if self.impression_increment < 0 {
            return Err(AnalyticsError::InvalidEvent(format!(
                "impression increment must be non-negative, got {}",
                self.impression_increment
            )));
        }
        Ok(())
    }
}

/// Metrics for one bucket, derived on read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub unique_users: i64,
    pub clicks: i64,
    pub impressions: i64,
}

impl QueryResult {
    pub fn new(unique_users: i64, clicks: i64, impressions: i64) -> Self {
        Self {
            unique_users,
            clicks,
            impressions,
        }
    }

    /// Plain-text body served by the query endpoint
    pub fn to_csv_lines(&self) -> String {
        format!(
            "unique_users,{} \nclicks,{} \nimpressions,{}",
            self.unique_users, self.clicks, self.impressions
        )
    }
}

/// Per-bucket counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Clicks,
    Impressions,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Clicks => "clicks",
            Metric::Impressions => "impressions",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Metric::Clicks => CLICKS_PREFIX,
            Metric::Impressions => IMPRESSIONS_PREFIX,
        }
    }

    pub fn all() -> [Metric; 2] {
        [Metric::Clicks, Metric::Impressions]
    }
}

pub fn user_set_key(bucket: BucketKey) -> String {
    format!("{}{}", USER_PREFIX, bucket)
}

pub fn counter_key(metric: Metric, bucket: BucketKey) -> String {
    format!("{}{}", metric.prefix(), bucket)
}

/// Bucket a record key belongs to, if it follows the `<prefix><bucket>` layout
pub fn bucket_of_key(key: &str) -> Option<BucketKey> {
    let raw = [USER_PREFIX, CLICKS_PREFIX, IMPRESSIONS_PREFIX]
        .iter()
        .find_map(|prefix| key.strip_prefix(prefix))?;
    let secs = raw.parse::<i64>().ok()?;
    crate::bucket::round_to_hour(secs)
        .ok()
        .filter(|bucket| bucket.as_secs() == secs)
}
