//! Key/value metric store.
//!
//! Ingestion only writes through [`MetricStore`]: hash fields per sample key
//! and set memberships for the per-check and per-run indexes.

mod sqlite;

pub use sqlite::SqliteMetricStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Write interface to a hash/set store.
pub trait MetricStore: Send + Sync {
    /// Set `fields` on the hash at `key`, creating it if needed.
    fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Add `member` to the set at `set`. Adding an existing member is a no-op.
    fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError>;
}
