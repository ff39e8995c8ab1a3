//! Analytics server
//!
//! Wires configuration, both storage tiers, the aggregator, the durable
//! write monitor and the HTTP gateway together.
//!
//! Usage:
//!   cargo run --release --bin analytics_server
//!
//! Environment variables:
//!   ANALYTICS_DB_PATH - SQLite database path (default: analytics.db)
//!   ANALYTICS_HTTP_HOST / ANALYTICS_HTTP_PORT - bind address (default: 0.0.0.0:8082)
//!   STORE_TIMEOUT_MS - per store call timeout (default: 2000)
//!   DURABLE_WRITE_CONCURRENCY - durable writes in flight (default: 64)
//!   WRITE_BACKLOG - pending writes per tier before shedding (default: 4096)

use dotenv::dotenv;
use log::{error, info};
use rtanalytics::aggregator::{durable_monitor_task, Aggregator};
use rtanalytics::api::{router, AppState};
use rtanalytics::config::AnalyticsConfig;
use rtanalytics::store::{MemoryHotStore, SqliteColdStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting analytics server...");

    let config = AnalyticsConfig::from_env();
    config.validate()?;

    info!("📊 Configuration:");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Listen: {}", config.bind_addr());
    info!("   ├─ Store timeout: {}ms", config.store_timeout_ms);
    info!("   ├─ Durable write concurrency: {}", config.durable_write_concurrency);
    info!("   └─ Write backlog per tier: {}", config.write_backlog);

    let hot = Arc::new(MemoryHotStore::new());
    let cold = Arc::new(SqliteColdStore::new(&config.db_path)?);
    info!("✅ Storage tiers ready (hot: memory, cold: SQLite)");

    let (monitor_tx, monitor_rx) = mpsc::channel(config.monitor_channel_buffer);
    let monitor_interval = Duration::from_secs(config.monitor_log_interval_secs.max(1));
    let monitor_handle = tokio::spawn(durable_monitor_task(monitor_rx, monitor_interval));

    let aggregator = Aggregator::new(hot, cold)
        .with_store_timeout(config.store_timeout())
        .with_durable_concurrency(config.durable_write_concurrency)
        .with_write_backlog(config.write_backlog)
        .with_monitor(monitor_tx);
    let state = AppState::new(Arc::new(aggregator));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("✅ Service up on {}", config.bind_addr());
    info!("🔄 Press CTRL+C to shutdown gracefully");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router (and with it the aggregator's monitor sender) is gone; let in-flight
    // durable writes report before exiting
    match tokio::time::timeout(Duration::from_secs(5), monitor_handle).await {
        Ok(Ok(stats)) => info!(
            "✅ Durable writes this run: {} ok, {} failed",
            stats.succeeded, stats.failed
        ),
        Ok(Err(e)) => error!("❌ Durable monitor task failed: {}", e),
        Err(_) => error!("❌ Timed out waiting for in-flight durable writes"),
    }

    info!("✅ Analytics server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }
}
