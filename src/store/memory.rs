//! In-memory hot tier
//!
//! A keyed cache with Redis-like typing: every key holds either a set of
//! users or an integer counter. One mutex guards the whole keyspace, so every
//! single operation and every batch is atomic.

use super::{HotOp, HotOpResult, HotStore};
use crate::bucket::BucketKey;
use crate::error::{StoreError, StoreResult};
use crate::types::{bucket_of_key, counter_key, user_set_key, Metric};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HotValue {
    Set(HashSet<String>),
    Counter(i64),
}

impl HotValue {
    fn is_set(&self) -> bool {
        matches!(self, HotValue::Set(_))
    }
}

pub struct MemoryHotStore {
    entries: Mutex<HashMap<String, HotValue>>,
    available: AtomicBool,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Fault switch: while unavailable every call fails with `StoreError::Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            log::info!("✅ Hot store marked available");
        } else {
            log::warn!("⚠️  Hot store marked unavailable");
        }
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record belonging to a bucket older than `cutoff`
    ///
    /// The aggregator never calls this; it exists for an external retention job.
    /// Returns the number of keys removed.
    pub fn evict_buckets_before(&self, cutoff: BucketKey) -> StoreResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| match bucket_of_key(key) {
            Some(bucket) => bucket >= cutoff,
            None => true,
        });
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("🧹 Evicted {} hot keys older than bucket {}", removed, cutoff);
        }
        Ok(removed)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, HotValue>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("hot store is offline".to_string()));
        }
        self.entries
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("hot store lock poisoned: {}", e)))
    }

    fn check_type(entries: &HashMap<String, HotValue>, key: &str, want_set: bool) -> StoreResult<()> {
        match entries.get(key) {
            Some(value) if value.is_set() != want_set => Err(StoreError::WrongType(key.to_string())),
            _ => Ok(()),
        }
    }

    fn apply_add_user(entries: &mut HashMap<String, HotValue>, key: String, user: &str) -> StoreResult<bool> {
        match entries.entry(key.clone()).or_insert_with(|| HotValue::Set(HashSet::new())) {
            HotValue::Set(users) => Ok(users.insert(user.to_string())),
            HotValue::Counter(_) => Err(StoreError::WrongType(key)),
        }
    }

    fn apply_increment(entries: &mut HashMap<String, HotValue>, key: String, by: i64) -> StoreResult<i64> {
        match entries.entry(key.clone()).or_insert(HotValue::Counter(0)) {
            HotValue::Counter(value) => {
                *value = value.checked_add(by).ok_or(StoreError::Overflow(key))?;
                Ok(*value)
            }
            HotValue::Set(_) => Err(StoreError::WrongType(key)),
        }
    }
}

impl Default for MemoryHotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn add_user(&self, bucket: BucketKey, user: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        Self::apply_add_user(&mut entries, user_set_key(bucket), user)?;
        Ok(())
    }

    async fn increment(&self, metric: Metric, bucket: BucketKey, by: i64) -> StoreResult<i64> {
        let mut entries = self.lock()?;
        Self::apply_increment(&mut entries, counter_key(metric, bucket), by)
    }

    async fn batch(&self, ops: Vec<HotOp>) -> StoreResult<Vec<HotOpResult>> {
        let mut entries = self.lock()?;

        // Check types and counter ranges first so a bad op leaves the keyspace untouched
        let mut pending: HashMap<String, i64> = HashMap::new();
        for op in &ops {
            match op {
                HotOp::AddUser { bucket, .. } => {
                    Self::check_type(&entries, &user_set_key(*bucket), true)?
                }
                HotOp::Increment { metric, bucket, by } => {
                    let key = counter_key(*metric, *bucket);
                    Self::check_type(&entries, &key, false)?;
                    let current = match pending.get(&key) {
                        Some(value) => *value,
                        None => match entries.get(&key) {
                            Some(HotValue::Counter(value)) => *value,
                            _ => 0,
                        },
                    };
                    let next = current
                        .checked_add(*by)
                        .ok_or_else(|| StoreError::Overflow(key.clone()))?;
                    pending.insert(key, next);
                }
            }
        }

        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                HotOp::AddUser { bucket, user } => {
                    HotOpResult::Added(Self::apply_add_user(&mut entries, user_set_key(bucket), &user)?)
                }
                HotOp::Increment { metric, bucket, by } => HotOpResult::Counter(
                    Self::apply_increment(&mut entries, counter_key(metric, bucket), by)?,
                ),
            };
            results.push(result);
        }

        Ok(results)
    }

    async fn read_user_count(&self, bucket: BucketKey) -> StoreResult<i64> {
        let entries = self.lock()?;
        let key = user_set_key(bucket);
        match entries.get(&key) {
            Some(HotValue::Set(users)) => Ok(users.len() as i64),
            Some(HotValue::Counter(_)) => Err(StoreError::WrongType(key)),
            None => Ok(0),
        }
    }

    async fn read_counter(&self, metric: Metric, bucket: BucketKey) -> StoreResult<i64> {
        let entries = self.lock()?;
        let key = counter_key(metric, bucket);
        match entries.get(&key) {
            Some(HotValue::Counter(value)) => Ok(*value),
            Some(HotValue::Set(_)) => Err(StoreError::WrongType(key)),
            None => Ok(0),
        }
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
