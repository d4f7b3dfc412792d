//! Persists record batches to the metric store.
//!
//! Each record becomes a hash at `{uuid}:{timestamp}` with `timestamp` and
//! `data` fields, a member of the set `{uuid}`, and its uuid a member of the
//! run label set. A failed write is counted and the sink moves on.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics;
use crate::store::{MetricStore, StoreError};

use super::types::{RecordBatch, RunLabel, SinkStats};

pub struct Sink {
    store: Arc<dyn MetricStore>,
    label: RunLabel,
    stats: SinkStats,
}

impl Sink {
    pub fn new(store: Arc<dyn MetricStore>, label: RunLabel) -> Self {
        Self {
            store,
            label,
            stats: SinkStats::default(),
        }
    }

    pub fn label(&self) -> &RunLabel {
        &self.label
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Write every record in `batch`.
    pub fn persist(&mut self, batch: &RecordBatch) {
        self.stats.batches += 1;

        for record in &batch.records {
            let key = record.key();
            let results = [
                self.store
                    .hset(&key, &[("timestamp", record.timestamp.as_str())]),
                self.store.hset(&key, &[("data", record.data.as_str())]),
                self.store.sadd(&record.uuid, &key),
                self.store.sadd(self.label.as_str(), &record.uuid),
            ];
            let mut complete = true;
            for result in results {
                complete &= self.write(&key, result);
            }

            self.stats.records += 1;
            if complete {
                metrics::RECORDS_PERSISTED.inc();
            }
        }
    }

    /// Write a JSON batch produced outside this process.
    ///
    /// Entry point for batches handed over by another producer; the
    /// in-process pipeline uses [`Sink::run`] with typed batches instead. An
    /// undecodable batch is dropped whole and counted in `batches_dropped`.
    pub fn persist_encoded(&mut self, bytes: &[u8]) {
        match RecordBatch::decode(bytes) {
            Ok(batch) => self.persist(&batch),
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping undecodable record batch");
                self.stats.batches_dropped += 1;
                metrics::BATCHES_DROPPED.inc();
            }
        }
    }

    fn write(&mut self, key: &str, result: Result<(), StoreError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key, label = %self.label, error = %e, "Metric store write failed");
                self.stats.write_failures += 1;
                metrics::STORE_WRITE_FAILURES.inc();
                false
            }
        }
    }

    /// Drain `rx` until the parser finishes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RecordBatch>) -> SinkStats {
        while let Some(batch) = rx.recv().await {
            self.persist(&batch);
        }
        debug!(label = %self.label, stats = ?self.stats, "Sink finished");
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MetricRecord;
    use crate::store::SqliteMetricStore;
    use crate::testing::MemoryMetricStore;
    use chrono::{TimeZone, Utc};

    fn label() -> RunLabel {
        RunLabel::new("stratcon", Utc.timestamp_millis_opt(1_000).unwrap())
    }

    fn batch(uuid: &str, timestamps: &[&str]) -> RecordBatch {
        RecordBatch {
            records: timestamps
                .iter()
                .map(|ts| MetricRecord {
                    uuid: uuid.to_string(),
                    timestamp: ts.to_string(),
                    data: format!("B1\t{}\t{}\tpayload", ts, uuid),
                })
                .collect(),
        }
    }

    #[test]
    fn test_persists_keys_and_indexes() {
        let store = Arc::new(SqliteMetricStore::in_memory().unwrap());
        let mut sink = Sink::new(store.clone(), label());

        sink.persist(&batch("U", &["1", "2", "3"]));

        assert_eq!(store.hash_count().unwrap(), 3);
        let hash = store.hgetall("U:2").unwrap();
        assert_eq!(hash["timestamp"], "2");
        assert_eq!(hash["data"], "B1\t2\tU\tpayload");

        let keys = store.smembers("U").unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains("U:1") && keys.contains("U:3"));

        let uuids = store.smembers("stratcon-1000").unwrap();
        assert_eq!(uuids.into_iter().collect::<Vec<_>>(), vec!["U".to_string()]);

        assert_eq!(sink.stats().records, 3);
        assert_eq!(sink.stats().write_failures, 0);
    }

    #[test]
    fn test_undecodable_batch_is_dropped() {
        let store = Arc::new(MemoryMetricStore::new());
        let mut sink = Sink::new(store.clone(), label());

        sink.persist_encoded(b"[{\"uuid\": \"U\", \"timestamp\":");

        assert_eq!(sink.stats().batches_dropped, 1);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_encoded_batch_is_persisted() {
        let store = Arc::new(MemoryMetricStore::new());
        let mut sink = Sink::new(store.clone(), label());

        let encoded = batch("U", &["7"]).encode().unwrap();
        sink.persist_encoded(&encoded);

        assert_eq!(sink.stats().records, 1);
        assert!(store.set_contains("U", "U:7"));
    }

    #[test]
    fn test_failed_writes_are_counted_not_fatal() {
        let store = Arc::new(MemoryMetricStore::new());
        store.fail_writes(true);
        let mut sink = Sink::new(store.clone(), label());

        sink.persist(&batch("U", &["1", "2"]));

        let stats = sink.stats();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.write_failures, 8);

        store.fail_writes(false);
        sink.persist(&batch("U", &["3"]));
        assert!(store.set_contains("stratcon-1000", "U"));
    }
}
