//! Dual-tier aggregation engine
//!
//! # Write path
//!
//! ```text
//! ingest(event) ── round_to_hour ──┬─ current hour? ─► HotStore::batch   (background task, best effort)
//!                                  └─ always ────────► ColdStore writes  (background task, bounded pool)
//!                                                          └─► WriteCompletion + monitor channel
//! ```
//!
//! # Read path
//!
//! ```text
//! query(t) ── round_to_hour ──┬─ current hour? ─► 3 concurrent HotStore reads (all or nothing)
//!                             └─ otherwise ─────► 3 concurrent ColdStore reads (absent = 0)
//! ```
//!
//! The aggregator holds no bucket state of its own. It only decides which
//! tier is authoritative for a bucket at the moment of the call.

pub mod durable;

pub use durable::{durable_monitor_task, WriteCompletion, DurableWriteReport, DurableWriteStats};

use crate::bucket::{is_current_bucket, round_to_hour, BucketKey, Clock, SystemClock};
use crate::error::{AnalyticsError, StoreError, StoreResult};
use crate::store::{ColdStore, HotOp, HotStore};
use crate::types::{Event, Metric, QueryResult};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DURABLE_CONCURRENCY: usize = 64;
pub const DEFAULT_WRITE_BACKLOG: usize = 4_096;

/// Returned by `Aggregator::ingest` once the event is accepted
#[derive(Debug)]
pub struct IngestReceipt {
    pub bucket: BucketKey,
    /// Whether the event landed in the live hour (hot tier was targeted)
    pub live: bool,
    /// Settles once the hot attempt is over; always `Ok`, failures are only logged
    pub hot: Option<WriteCompletion>,
    /// Completion of the background durable write
    pub durable: WriteCompletion,
}

impl IngestReceipt {
    /// Wait for both background writes; yields the durable outcome
    pub async fn settled(self) -> Result<(), AnalyticsError> {
        if let Some(hot) = self.hot {
            hot.wait().await?;
        }
        self.durable.wait().await
    }
}

pub struct Aggregator {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    durable_permits: Arc<Semaphore>,
    hot_backlog: Arc<Semaphore>,
    durable_backlog: Arc<Semaphore>,
    monitor_tx: Option<mpsc::Sender<DurableWriteReport>>,
}

impl Aggregator {
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdStore>) -> Self {
        Self {
            hot,
            cold,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            durable_permits: Arc::new(Semaphore::new(DEFAULT_DURABLE_CONCURRENCY)),
            hot_backlog: Arc::new(Semaphore::new(DEFAULT_WRITE_BACKLOG)),
            durable_backlog: Arc::new(Semaphore::new(DEFAULT_WRITE_BACKLOG)),
            monitor_tx: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound on every individual store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Maximum number of durable writes running at once
    pub fn with_durable_concurrency(mut self, permits: usize) -> Self {
        self.durable_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// Maximum number of scheduled-but-unfinished writes per tier
    ///
    /// Writes beyond it are not queued: a hot write is skipped, a durable
    /// write completes immediately with `ColdStoreUnavailable`.
    pub fn with_write_backlog(mut self, limit: usize) -> Self {
        self.hot_backlog = Arc::new(Semaphore::new(limit.max(1)));
        self.durable_backlog = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Also publish every durable outcome on `tx` (dropped if the channel is full)
    pub fn with_monitor(mut self, tx: mpsc::Sender<DurableWriteReport>) -> Self {
        self.monitor_tx = Some(tx);
        self
    }

    /// Bucket containing the clock's current time
    pub fn current_bucket(&self) -> Result<BucketKey, AnalyticsError> {
        round_to_hour(self.clock.now())
    }

    /// Record one event
    ///
    /// Returns as soon as the event is validated and its writes are
    /// scheduled; it never waits on either tier. Hot-tier failures are logged
    /// and never reach the caller.
    pub async fn ingest(&self, event: Event) -> Result<IngestReceipt, AnalyticsError> {
        let bucket = round_to_hour(event.timestamp)?;
        event.validate()?;

        let runtime = Handle::try_current().map_err(|e| {
            AnalyticsError::Internal(format!("no async runtime to schedule writes: {}", e))
        })?;

        let live = is_current_bucket(bucket, self.clock.now());
        let hot = if live {
            Some(self.spawn_hot_write(&runtime, bucket, &event))
        } else {
            None
        };
        let durable = self.spawn_durable_write(&runtime, bucket, event);

        Ok(IngestReceipt {
            bucket,
            live,
            hot,
            durable,
        })
    }

    /// Metrics for the hour containing `timestamp`
    pub async fn query(&self, timestamp: i64) -> Result<QueryResult, AnalyticsError> {
        let bucket = round_to_hour(timestamp)?;

        if is_current_bucket(bucket, self.clock.now()) {
            self.query_hot(bucket).await
        } else {
            self.query_cold(bucket).await
        }
    }

    fn spawn_hot_write(&self, runtime: &Handle, bucket: BucketKey, event: &Event) -> WriteCompletion {
        let (done_tx, completion) = WriteCompletion::channel();

        let Ok(backlog_permit) = self.hot_backlog.clone().try_acquire_owned() else {
            log::warn!(
                "⚠️  Hot write backlog full ({}), skipping live update: bucket={} user={}",
                self.hot.backend_type(),
                bucket,
                event.user
            );
            let _ = done_tx.send(Ok(()));
            return completion;
        };

        let hot = self.hot.clone();
        let timeout = self.store_timeout;
        let user = event.user.clone();
        let ops = HotOp::for_event(
            bucket,
            &event.user,
            event.click_increment,
            event.impression_increment,
        );

        runtime.spawn(async move {
            let _backlog_permit = backlog_permit;
            match bounded(timeout, hot.batch(ops)).await {
                Ok(results) => {
                    log::debug!(
                        "✅ Hot batch applied: bucket={} user={} results={:?}",
                        bucket,
                        user,
                        results
                    );
                }
                Err(e) => {
                    log::warn!(
                        "⚠️  Hot batch failed ({}), durable tier remains authoritative: bucket={} user={}: {}",
                        hot.backend_type(),
                        bucket,
                        user,
                        e
                    );
                }
            }
            let _ = done_tx.send(Ok(()));
        });

        completion
    }

    fn spawn_durable_write(&self, runtime: &Handle, bucket: BucketKey, event: Event) -> WriteCompletion {
        let (done_tx, completion) = WriteCompletion::channel();
        let monitor_tx = self.monitor_tx.clone();

        let Ok(backlog_permit) = self.durable_backlog.clone().try_acquire_owned() else {
            let result = Err(AnalyticsError::ColdStoreUnavailable(
                "durable write backlog full".to_string(),
            ));
            report_durable(&monitor_tx, bucket, event.user, &result, Duration::ZERO);
            let _ = done_tx.send(result);
            return completion;
        };

        let cold = self.cold.clone();
        let permits = self.durable_permits.clone();
        let timeout = self.store_timeout;

        runtime.spawn(async move {
            let _backlog_permit = backlog_permit;
            let started = Instant::now();
            let result = match permits.acquire_owned().await {
                Ok(_permit) => write_durable(cold.as_ref(), bucket, &event, timeout).await,
                Err(e) => Err(AnalyticsError::Internal(format!("durable write pool closed: {}", e))),
            };

            report_durable(&monitor_tx, bucket, event.user, &result, started.elapsed());

            // Receiver may already be gone; the report above is the record
            let _ = done_tx.send(result);
        });

        completion
    }

    async fn query_hot(&self, bucket: BucketKey) -> Result<QueryResult, AnalyticsError> {
        let timeout = self.store_timeout;
        let (unique_users, clicks, impressions) = tokio::try_join!(
            bounded(timeout, self.hot.read_user_count(bucket)),
            bounded(timeout, self.hot.read_counter(Metric::Clicks, bucket)),
            bounded(timeout, self.hot.read_counter(Metric::Impressions, bucket)),
        )
        .map_err(|e| {
            log::warn!("⚠️  Hot read failed for bucket {}: {}", bucket, e);
            AnalyticsError::HotStoreUnavailable(e.to_string())
        })?;

        Ok(QueryResult::new(unique_users, clicks, impressions))
    }

    async fn query_cold(&self, bucket: BucketKey) -> Result<QueryResult, AnalyticsError> {
        let timeout = self.store_timeout;
        let (unique_users, clicks, impressions) = tokio::try_join!(
            bounded(timeout, self.cold.read_user_count(bucket)),
            bounded(timeout, self.cold.read_counter(bucket, Metric::Clicks)),
            bounded(timeout, self.cold.read_counter(bucket, Metric::Impressions)),
        )
        .map_err(|e| {
            log::warn!("⚠️  Cold read failed for bucket {}: {}", bucket, e);
            AnalyticsError::ColdStoreUnavailable(e.to_string())
        })?;

        Ok(QueryResult::new(unique_users, clicks, impressions))
    }
}

/// Apply `timeout` to a store call; exceeding it counts as unavailability
async fn bounded<T, F>(timeout: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

fn report_durable(
    monitor_tx: &Option<mpsc::Sender<DurableWriteReport>>,
    bucket: BucketKey,
    user: String,
    result: &Result<(), AnalyticsError>,
    elapsed: Duration,
) {
    match monitor_tx {
        Some(tx) => {
            let report = DurableWriteReport {
                bucket,
                user,
                result: result.clone(),
                elapsed,
            };
            if let Err(e) = tx.try_send(report) {
                log::debug!("⚠️  Durable report not delivered to monitor: {}", e);
            }
        }
        None => {
            if let Err(e) = result {
                log::error!("❌ Durable write failed for bucket {}: {}", bucket, e);
            }
        }
    }
}

fn cold_error(err: StoreError) -> AnalyticsError {
    match err {
        StoreError::Unavailable(_) | StoreError::Database(_) => {
            AnalyticsError::ColdStoreUnavailable(err.to_string())
        }
        StoreError::WrongType(_) | StoreError::NotFound(_) | StoreError::Overflow(_) => {
            AnalyticsError::Internal(err.to_string())
        }
    }
}

/// Create-if-absent failures other than unavailability are ignored; the
/// following write reports any record that really is missing.
fn tolerate_create(result: StoreResult<()>, record: &str, bucket: BucketKey) -> Result<(), AnalyticsError> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ StoreError::Unavailable(_)) => Err(cold_error(e)),
        Err(e) => {
            log::debug!("Ignoring create-if-absent failure for {} in bucket {}: {}", record, bucket, e);
            Ok(())
        }
    }
}

async fn write_durable(
    cold: &dyn ColdStore,
    bucket: BucketKey,
    event: &Event,
    timeout: Duration,
) -> Result<(), AnalyticsError> {
    tolerate_create(
        bounded(timeout, cold.create_user_set_if_absent(bucket)).await,
        "user set",
        bucket,
    )?;
    bounded(timeout, cold.add_user(bucket, &event.user))
        .await
        .map_err(cold_error)?;

    for (metric, by) in [
        (Metric::Clicks, event.click_increment),
        (Metric::Impressions, event.impression_increment),
    ] {
        tolerate_create(
            bounded(timeout, cold.create_counter_if_absent(bucket, metric)).await,
            metric.as_str(),
            bucket,
        )?;
        bounded(timeout, cold.increment_counter(bucket, metric, by))
            .await
            .map_err(cold_error)?;
    }

    Ok(())
}
