//! In-memory metric store for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::store::{MetricStore, StoreError};

/// In-memory implementation of the MetricStore trait.
///
/// Provides controllable behavior for testing:
/// - Inspect stored hashes and sets
/// - Count successful writes
/// - Fail every write on demand
///
/// # Example
///
/// ```rust,ignore
/// use noitlink_core::testing::MemoryMetricStore;
///
/// let store = Arc::new(MemoryMetricStore::new());
/// let mut sink = Sink::new(store.clone(), label);
/// sink.persist(&batch);
///
/// assert!(store.set_contains("U", "U:1700000000"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    hashes: Mutex<HashMap<String, BTreeMap<String, String>>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until turned off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn hash(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.hashes.lock().ok()?.get(key).cloned()
    }

    pub fn hash_keys(&self) -> BTreeSet<String> {
        self.hashes
            .lock()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, set: &str) -> BTreeSet<String> {
        self.sets
            .lock()
            .ok()
            .and_then(|s| s.get(set).cloned())
            .unwrap_or_default()
    }

    pub fn set_contains(&self, set: &str, member: &str) -> bool {
        self.members(set).contains(member)
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated write failure".to_string()));
        }
        Ok(())
    }
}

impl MetricStore for MemoryMetricStore {
    fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        self.check_failure()?;
        let mut hashes = self
            .hashes
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))?;
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.to_string());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.check_failure()?;
        self.sets
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))?
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
