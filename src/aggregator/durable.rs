//! Background write completion signalling
//!
//! Every ingest schedules one background durable write. Its outcome is
//! delivered twice: to the caller through the `WriteCompletion` in the
//! receipt, and to the optional monitoring channel drained by
//! `durable_monitor_task`. Live-hour hot writes run in the background too;
//! their completion only says the attempt is over.

use crate::bucket::BucketKey;
use crate::error::AnalyticsError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

/// Outcome of one background durable write
#[derive(Debug, Clone)]
pub struct DurableWriteReport {
    pub bucket: BucketKey,
    pub user: String,
    pub result: Result<(), AnalyticsError>,
    pub elapsed: Duration,
}

/// Resolves once a write scheduled by an ingest has finished
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct WriteCompletion {
    rx: oneshot::Receiver<Result<(), AnalyticsError>>,
}

impl WriteCompletion {
    pub(crate) fn channel() -> (oneshot::Sender<Result<(), AnalyticsError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub async fn wait(self) -> Result<(), AnalyticsError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Internal(
                "background write task ended without reporting".to_string(),
            )),
        }
    }
}

/// Running totals kept by the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurableWriteStats {
    pub succeeded: u64,
    pub failed: u64,
}

impl DurableWriteStats {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Drain durable write reports, logging failures and periodic throughput
///
/// Runs until every sender is dropped, then returns the final totals.
pub async fn durable_monitor_task(
    mut rx: mpsc::Receiver<DurableWriteReport>,
    log_interval: Duration,
) -> DurableWriteStats {
    log::info!("🚀 Starting durable write monitor");
    log::info!("   └─ Log interval: {}s", log_interval.as_secs());

    let mut stats = DurableWriteStats::default();
    let mut window = DurableWriteStats::default();
    let mut log_timer = interval(log_interval);
    let mut last_log_time = std::time::Instant::now();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(report) = received else {
                    log::info!(
                        "✅ Durable write monitor stopped ({} ok, {} failed)",
                        stats.succeeded,
                        stats.failed
                    );
                    break;
                };

                match &report.result {
                    Ok(()) => {
                        stats.succeeded += 1;
                        window.succeeded += 1;
                        log::debug!(
                            "✅ Durable write: bucket={} user={} in {}ms",
                            report.bucket,
                            report.user,
                            report.elapsed.as_millis()
                        );
                    }
                    Err(e) => {
                        stats.failed += 1;
                        window.failed += 1;
                        log::error!(
                            "❌ Durable write failed: bucket={} user={}: {}",
                            report.bucket,
                            report.user,
                            e
                        );
                    }
                }
            }

            _ = log_timer.tick() => {
                if window.total() > 0 {
                    let per_sec = window.total() as f64 / last_log_time.elapsed().as_secs_f64().max(0.001);
                    log::info!(
                        "📊 Durable writes: {:.1}/sec ({} ok, {} failed) | total: {} ok, {} failed",
                        per_sec,
                        window.succeeded,
                        window.failed,
                        stats.succeeded,
                        stats.failed
                    );
                }
                window = DurableWriteStats::default();
                last_log_time = std::time::Instant::now();
            }
        }
    }

    stats
}
