//! SQLite-backed cold tier
//!
//! Each logical record is a row keyed by its record key (`user_<bucket>`,
//! `clicks_<bucket>`, `impressions_<bucket>`). Set members live in their own
//! table so that set-add is a single idempotent insert.

use super::ColdStore;
use crate::bucket::BucketKey;
use crate::error::{StoreError, StoreResult};
use crate::sqlite_pragma::apply_optimized_pragmas;
use crate::types::{counter_key, user_set_key, Metric};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS user_sets (
        record_key  TEXT PRIMARY KEY,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_set_members (
        record_key  TEXT NOT NULL,
        user        TEXT NOT NULL,
        PRIMARY KEY (record_key, user)
    );
    CREATE TABLE IF NOT EXISTS counters (
        record_key  TEXT PRIMARY KEY,
        value       INTEGER NOT NULL DEFAULT 0,
        updated_at  INTEGER NOT NULL
    );
";

pub struct SqliteColdStore {
    conn: Arc<Mutex<Connection>>,
    available: Arc<AtomicBool>,
}

impl SqliteColdStore {
    /// Open (or create) the database at `db_path` and ensure the schema exists
    pub fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite cold store initialized: {}", db_path.as_ref().display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            available: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Fault switch: while unavailable every call fails with `StoreError::Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            log::info!("✅ Cold store marked available");
        } else {
            log::warn!("⚠️  Cold store marked unavailable");
        }
    }

    /// Run a blocking closure against the connection on the blocking pool
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("cold store is offline".to_string()));
        }

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("cold store lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("cold store task failed: {}", e)))?
    }
}

#[async_trait]
impl ColdStore for SqliteColdStore {
    async fn create_user_set_if_absent(&self, bucket: BucketKey) -> StoreResult<()> {
        let key = user_set_key(bucket);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO user_sets (record_key, created_at) VALUES (?1, ?2)
                 ON CONFLICT(record_key) DO NOTHING",
                params![key, chrono::Utc::now().timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn add_user(&self, bucket: BucketKey, user: &str) -> StoreResult<()> {
        let key = user_set_key(bucket);
        let user = user.to_string();
        self.run(move |conn| {
            let exists = conn
                .prepare_cached("SELECT 1 FROM user_sets WHERE record_key = ?1")?
                .exists(params![key])?;
            if !exists {
                return Err(StoreError::NotFound(key));
            }

            conn.execute(
                "INSERT OR IGNORE INTO user_set_members (record_key, user) VALUES (?1, ?2)",
                params![key, user],
            )?;
            Ok(())
        })
        .await
    }

    async fn create_counter_if_absent(&self, bucket: BucketKey, metric: Metric) -> StoreResult<()> {
        let key = counter_key(metric, bucket);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO counters (record_key, value, updated_at) VALUES (?1, 0, ?2)
                 ON CONFLICT(record_key) DO NOTHING",
                params![key, chrono::Utc::now().timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn increment_counter(&self, bucket: BucketKey, metric: Metric, by: i64) -> StoreResult<i64> {
        let key = counter_key(metric, bucket);
        self.run(move |conn| {
            // Single statement, so the read-modify-write is atomic in SQLite.
            // The range guard keeps SQLite from promoting an overflowing sum to REAL.
            let value: Option<i64> = conn
                .query_row(
                    "UPDATE counters SET value = value + ?2, updated_at = ?3
                     WHERE record_key = ?1 AND value <= 9223372036854775807 - ?2
                     RETURNING value",
                    params![key, by, chrono::Utc::now().timestamp()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(value) = value {
                return Ok(value);
            }

            let exists = conn
                .prepare_cached("SELECT 1 FROM counters WHERE record_key = ?1")?
                .exists(params![key])?;
            if exists {
                Err(StoreError::Overflow(key))
            } else {
                Err(StoreError::NotFound(key))
            }
        })
        .await
    }

    async fn read_user_count(&self, bucket: BucketKey) -> StoreResult<i64> {
        let key = user_set_key(bucket);
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_set_members WHERE record_key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn read_counter(&self, bucket: BucketKey, metric: Metric) -> StoreResult<i64> {
        let key = counter_key(metric, bucket);
        self.run(move |conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT value FROM counters WHERE record_key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.unwrap_or(0))
        })
        .await
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::round_to_hour;
    use tempfile::tempdir;

    fn bucket(t: i64) -> BucketKey {
        round_to_hour(t).unwrap()
    }

    #[tokio::test]
    async fn test_create_user_set_twice_leaves_one_record() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cold.db");
        let store = SqliteColdStore::new(&db_path).unwrap();
        let b = bucket(1_700_000_000);

        store.create_user_set_if_absent(b).await.unwrap();
        store.create_user_set_if_absent(b).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_sets WHERE record_key = ?1",
                params![user_set_key(b)],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_repeated_add_user_keeps_count() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(1_700_000_000);

        store.create_user_set_if_absent(b).await.unwrap();
        store.add_user(b, "alice").await.unwrap();
        store.add_user(b, "alice").await.unwrap();
        assert_eq!(store.read_user_count(b).await.unwrap(), 1);

        store.add_user(b, "bob").await.unwrap();
        assert_eq!(store.read_user_count(b).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_user_requires_created_set() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(0);

        let result = store.add_user(b, "alice").await;
        assert_eq!(result, Err(StoreError::NotFound("user_0".to_string())));
    }

    #[tokio::test]
    async fn test_counter_create_then_increment() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(7200);

        assert!(matches!(
            store.increment_counter(b, Metric::Clicks, 1).await,
            Err(StoreError::NotFound(_))
        ));

        store.create_counter_if_absent(b, Metric::Clicks).await.unwrap();
        assert_eq!(store.increment_counter(b, Metric::Clicks, 2).await.unwrap(), 2);

        // Re-creating must not reset the counter
        store.create_counter_if_absent(b, Metric::Clicks).await.unwrap();
        assert_eq!(store.increment_counter(b, Metric::Clicks, 1).await.unwrap(), 3);

        assert_eq!(store.read_counter(b, Metric::Clicks).await.unwrap(), 3);
        assert_eq!(store.read_counter(b, Metric::Impressions).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_overflow_keeps_counter_readable() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(1_700_000_000);

        store.create_counter_if_absent(b, Metric::Clicks).await.unwrap();
        assert_eq!(
            store.increment_counter(b, Metric::Clicks, i64::MAX).await.unwrap(),
            i64::MAX
        );
        assert_eq!(
            store.increment_counter(b, Metric::Clicks, i64::MAX).await,
            Err(StoreError::Overflow(counter_key(Metric::Clicks, b)))
        );
        assert_eq!(
            store.increment_counter(b, Metric::Clicks, 1).await,
            Err(StoreError::Overflow(counter_key(Metric::Clicks, b)))
        );

        assert_eq!(store.read_counter(b, Metric::Clicks).await.unwrap(), i64::MAX);
        assert_eq!(store.increment_counter(b, Metric::Clicks, 0).await.unwrap(), i64::MAX);
    }

    #[tokio::test]
    async fn test_absent_bucket_reads_zero() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(123_456);

        assert_eq!(store.read_user_count(b).await.unwrap(), 0);
        assert_eq!(store.read_counter(b, Metric::Clicks).await.unwrap(), 0);
        assert_eq!(store.read_counter(b, Metric::Impressions).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_increments_commute() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteColdStore::new(dir.path().join("cold.db")).unwrap());
        let b = bucket(1_700_000_000);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_counter_if_absent(b, Metric::Impressions).await.unwrap();
                store.increment_counter(b, Metric::Impressions, 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.read_counter(b, Metric::Impressions).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cold.db");
        let b = bucket(1_700_000_000);

        {
            let store = SqliteColdStore::new(&db_path).unwrap();
            store.create_user_set_if_absent(b).await.unwrap();
            store.add_user(b, "alice").await.unwrap();
            store.create_counter_if_absent(b, Metric::Clicks).await.unwrap();
            store.increment_counter(b, Metric::Clicks, 4).await.unwrap();
        }

        let store = SqliteColdStore::new(&db_path).unwrap();
        assert_eq!(store.read_user_count(b).await.unwrap(), 1);
        assert_eq!(store.read_counter(b, Metric::Clicks).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let dir = tempdir().unwrap();
        let store = SqliteColdStore::new(dir.path().join("cold.db")).unwrap();
        let b = bucket(0);

        store.set_available(false);
        assert!(matches!(
            store.read_counter(b, Metric::Clicks).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert_eq!(store.read_counter(b, Metric::Clicks).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cold.db");
        let _store = SqliteColdStore::new(&db_path).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }
}
