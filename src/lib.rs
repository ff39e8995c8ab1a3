//! # rtanalytics
//!
//! Real-time click/impression analytics bucketed by hour.
//!
//! ```text
//! HTTP gateway (api) ─► Aggregator ─┬─► HotStore  (MemoryHotStore, live hour)
//!                                   └─► ColdStore (SqliteColdStore, every hour)
//! ```
//!
//! - `bucket` - hour bucketing and clocks
//! - `types` - events, query results, record keys
//! - `store` - tier contracts and their backends
//! - `aggregator` - write fan-out and read tier selection
//! - `api` - axum routes for `/analytics`
//! - `config` - environment configuration

pub mod aggregator;
pub mod api;
pub mod bucket;
pub mod config;
pub mod error;
pub mod sqlite_pragma;
pub mod store;
pub mod types;

pub use aggregator::{Aggregator, IngestReceipt};
pub use bucket::{round_to_hour, BucketKey};
pub use error::{AnalyticsError, StoreError};
pub use types::{Event, Metric, QueryResult};
