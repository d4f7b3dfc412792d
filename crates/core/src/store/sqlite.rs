//! SQLite-backed metric store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{MetricStore, StoreError};

/// Hash and set objects emulated in two SQLite tables.
pub struct SqliteMetricStore {
    conn: Mutex<Connection>,
}

impl SqliteMetricStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS hash_fields (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );

            CREATE TABLE IF NOT EXISTS set_members (
                name TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (name, member)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// All fields of the hash at `key`; empty if it does not exist.
    pub fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT field, value FROM hash_fields WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Members of the set at `set`; empty if it does not exist.
    pub fn smembers(&self, set: &str) -> Result<BTreeSet<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT member FROM set_members WHERE name = ?1")?;
        let rows = stmt.query_map(params![set], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Number of distinct hash keys.
    pub fn hash_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(DISTINCT key) FROM hash_fields", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

impl MetricStore for SqliteMetricStore {
    fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            )?;
            for (field, value) in fields {
                stmt.execute(params![key, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO set_members (name, member) VALUES (?1, ?2)",
            params![set, member],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hset_overwrites_fields() {
        let store = SqliteMetricStore::in_memory().unwrap();
        store
            .hset("u1:100", &[("timestamp", "100"), ("data", "first")])
            .unwrap();
        store.hset("u1:100", &[("data", "second")]).unwrap();

        let hash = store.hgetall("u1:100").unwrap();
        assert_eq!(hash.len(), 2);
        assert_eq!(hash["timestamp"], "100");
        assert_eq!(hash["data"], "second");
        assert_eq!(store.hash_count().unwrap(), 1);
    }

    #[test]
    fn test_sadd_is_idempotent() {
        let store = SqliteMetricStore::in_memory().unwrap();
        store.sadd("u1", "u1:100").unwrap();
        store.sadd("u1", "u1:100").unwrap();
        store.sadd("u1", "u1:200").unwrap();

        let members = store.smembers("u1").unwrap();
        assert_eq!(members.len(), 2);
        assert!(store.smembers("missing").unwrap().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.db");

        {
            let store = SqliteMetricStore::new(&path).unwrap();
            store.sadd("stratcon-1", "u1").unwrap();
        }

        let store = SqliteMetricStore::new(&path).unwrap();
        assert!(store.smembers("stratcon-1").unwrap().contains("u1"));
    }
}
