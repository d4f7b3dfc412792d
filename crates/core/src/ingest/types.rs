use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::ControlError;
use crate::store::StoreError;

/// Errors that stop an ingestion run.
///
/// Failures inside the pipeline stages are logged and counted instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Handoff request failed: {0}")]
    Handoff(#[from] ControlError),

    #[error("Metric store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// One sample extracted from a journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub uuid: String,
    pub timestamp: String,
    /// The full journal line.
    pub data: String,
}

impl MetricRecord {
    /// Persistence key, unique per check and sample time.
    pub fn key(&self) -> String {
        format!("{}:{}", self.uuid, self.timestamp)
    }
}

/// Records extracted from one journal chunk, in line order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordBatch {
    pub records: Vec<MetricRecord>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// JSON array form, for batches produced outside this process.
    ///
    /// The in-process pipeline passes typed batches and never encodes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Unit passed from the file resolver to the record parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalChunk {
    Data(Bytes),
    /// The named journal has been read completely.
    EndOfFile(PathBuf),
}

/// Grouping key for everything one ingestion run touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunLabel(String);

impl RunLabel {
    /// `{source}-{unix millis}`.
    pub fn new(source: &str, started_at: DateTime<Utc>) -> Self {
        Self(format!("{}-{}", source, started_at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counters from the file resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub control_lines: u64,
    pub journals_streamed: u64,
    pub journals_failed: u64,
    pub journals_rejected: u64,
    pub bytes_streamed: u64,
    pub feed_errors: u64,
}

/// Counters from the record parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParserStats {
    pub records: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub batches: u64,
}

/// Counters from the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub batches: u64,
    pub records: u64,
    pub write_failures: u64,
    pub batches_dropped: u64,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub label: RunLabel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resolver: ResolverStats,
    pub parser: ParserStats,
    pub sink: SinkStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_key() {
        let record = MetricRecord {
            uuid: "u1".to_string(),
            timestamp: "1700000000.123".to_string(),
            data: "B1\t1700000000.123\tu1".to_string(),
        };
        assert_eq!(record.key(), "u1:1700000000.123");
    }

    #[test]
    fn test_run_label_format() {
        let started = Utc.timestamp_millis_opt(1_400_000_000_123).unwrap();
        assert_eq!(
            RunLabel::new("stratcon", started).as_str(),
            "stratcon-1400000000123"
        );
    }

    #[test]
    fn test_batch_wire_form_is_json_array() {
        let batch = RecordBatch {
            records: vec![MetricRecord {
                uuid: "u1".to_string(),
                timestamp: "1".to_string(),
                data: "B1\t1\tu1".to_string(),
            }],
        };
        let encoded = batch.encode().unwrap();
        assert!(encoded.starts_with(b"[{"));
        assert_eq!(RecordBatch::decode(&encoded).unwrap(), batch);
    }
}
