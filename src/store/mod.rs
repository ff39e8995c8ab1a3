//! Storage contracts for the two tiers
//!
//! ```text
//! Aggregator ──┬─► HotStore  (volatile, current hour only, batched writes)
//!              └─► ColdStore (durable system of record, every hour)
//! ```
//!
//! Both tiers expose the same logical layout per bucket: a user set under
//! `user_<bucket>` and two counters under `clicks_<bucket>` and
//! `impressions_<bucket>`.

pub mod memory;
pub mod sqlite;

use crate::bucket::BucketKey;
use crate::error::StoreResult;
use crate::types::Metric;
use async_trait::async_trait;

pub use memory::MemoryHotStore;
pub use sqlite::SqliteColdStore;

/// Single operation inside a hot-tier batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotOp {
    AddUser { bucket: BucketKey, user: String },
    Increment { metric: Metric, bucket: BucketKey, by: i64 },
}

impl HotOp {
    /// The three operations one ingested event turns into, in delivery order
    pub fn for_event(bucket: BucketKey, user: &str, clicks: i64, impressions: i64) -> Vec<HotOp> {
        vec![
            HotOp::AddUser {
                bucket,
                user: user.to_string(),
            },
            HotOp::Increment {
                metric: Metric::Clicks,
                bucket,
                by: clicks,
            },
            HotOp::Increment {
                metric: Metric::Impressions,
                bucket,
                by: impressions,
            },
        ]
    }
}

/// Result of one `HotOp`, in the same position as the op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotOpResult {
    /// Whether the user was newly added to the set
    Added(bool),
    /// Counter value after the increment
    Counter(i64),
}

/// Fast volatile store serving the live hour
///
/// Set-add and increment must each be atomic on their own; a counter that
/// does not exist yet is created at zero by the increment itself.
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Idempotent set-add
    async fn add_user(&self, bucket: BucketKey, user: &str) -> StoreResult<()>;

    /// Atomic create-at-zero-then-increment; returns the new total
    async fn increment(&self, metric: Metric, bucket: BucketKey, by: i64) -> StoreResult<i64>;

    async fn increment_clicks(&self, bucket: BucketKey, by: i64) -> StoreResult<i64> {
        self.increment(Metric::Clicks, bucket, by).await
    }

    async fn increment_impressions(&self, bucket: BucketKey, by: i64) -> StoreResult<i64> {
        self.increment(Metric::Impressions, bucket, by).await
    }

    /// Deliver `ops` in order in one round trip, all-or-nothing against the store
    async fn batch(&self, ops: Vec<HotOp>) -> StoreResult<Vec<HotOpResult>>;

    /// Cardinality of the bucket's user set, 0 if never written
    async fn read_user_count(&self, bucket: BucketKey) -> StoreResult<i64>;

    /// Counter value, 0 if never written
    async fn read_counter(&self, metric: Metric, bucket: BucketKey) -> StoreResult<i64>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Durable system of record
///
/// No multi-key transactions: records are created with idempotent
/// create-if-absent calls and then modified with atomic single-record calls.
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// No-op if the set record already exists
    async fn create_user_set_if_absent(&self, bucket: BucketKey) -> StoreResult<()>;

    async fn add_user(&self, bucket: BucketKey, user: &str) -> StoreResult<()>;

    /// No-op if the counter record already exists
    async fn create_counter_if_absent(&self, bucket: BucketKey, metric: Metric) -> StoreResult<()>;

    /// Atomic increment of an existing counter record; returns the new total
    async fn increment_counter(&self, bucket: BucketKey, metric: Metric, by: i64) -> StoreResult<i64>;

    /// 0 when the set was never created
    async fn read_user_count(&self, bucket: BucketKey) -> StoreResult<i64>;

    /// 0 when the counter was never created
    async fn read_counter(&self, bucket: BucketKey, metric: Metric) -> StoreResult<i64>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
