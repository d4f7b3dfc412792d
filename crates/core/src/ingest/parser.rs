//! Extracts metric records from raw journal bytes.
//!
//! Journal lines are tab-separated and start with a two-byte marker:
//! `B1` lines carry `marker, timestamp, uuid, ...` and become records,
//! `B2` lines are ignored, anything else is skipped.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::metrics;

use super::lines::LineBuffer;
use super::types::{JournalChunk, MetricRecord, ParserStats, RecordBatch};

enum LineKind {
    Record(MetricRecord),
    Ignored,
    Skipped(&'static str),
}

/// Incremental journal parser; partial lines carry over between chunks.
#[derive(Default)]
pub struct RecordParser {
    lines: LineBuffer,
    stats: ParserStats,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser that drops lines longer than `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::with_max_line(max_line),
            stats: ParserStats::default(),
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Records from every line completed by `chunk`, in order.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> RecordBatch {
        let lines = self.lines.push(chunk);
        self.count_overlong();
        self.collect(lines.iter().map(|line| &line[..]))
    }

    fn count_overlong(&mut self) {
        let overlong = self.lines.take_overlong();
        if overlong > 0 {
            self.stats.skipped += overlong;
            metrics::JOURNAL_LINES
                .with_label_values(&["skipped"])
                .inc_by(overlong);
            debug!(count = overlong, "Dropped over-long journal lines");
        }
    }

    /// Records from an unterminated final line, at end of input.
    pub fn finish(&mut self) -> RecordBatch {
        let tail = self.lines.finish();
        self.count_overlong();
        self.collect(tail.iter().map(|line| &line[..]))
    }

    fn collect<'a>(&mut self, lines: impl Iterator<Item = &'a [u8]>) -> RecordBatch {
        let mut records = Vec::new();
        for line in lines {
            match classify(line) {
                LineKind::Record(record) => {
                    self.stats.records += 1;
                    metrics::JOURNAL_LINES.with_label_values(&["record"]).inc();
                    records.push(record);
                }
                LineKind::Ignored => {
                    self.stats.ignored += 1;
                    metrics::JOURNAL_LINES.with_label_values(&["ignored"]).inc();
                }
                LineKind::Skipped(reason) => {
                    self.stats.skipped += 1;
                    metrics::JOURNAL_LINES.with_label_values(&["skipped"]).inc();
                    debug!(
                        reason,
                        line = %String::from_utf8_lossy(line),
                        "Unable to process journal line"
                    );
                }
            }
        }
        RecordBatch { records }
    }

    /// Parse chunks from `rx` and send one batch per chunk to `tx`.
    ///
    /// Chunks that yield no records produce no batch.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<JournalChunk>,
        tx: mpsc::Sender<RecordBatch>,
    ) -> ParserStats {
        while let Some(chunk) = rx.recv().await {
            let batch = match chunk {
                JournalChunk::Data(bytes) => self.parse_chunk(&bytes),
                JournalChunk::EndOfFile(path) => {
                    trace!(path = %path.display(), "Flushing journal tail");
                    self.finish()
                }
            };

            if batch.is_empty() {
                continue;
            }
            self.stats.batches += 1;
            if tx.send(batch).await.is_err() {
                break;
            }
        }

        let batch = self.finish();
        if !batch.is_empty() {
            self.stats.batches += 1;
            let _ = tx.send(batch).await;
        }

        debug!(stats = ?self.stats, "Record parser finished");
        self.stats
    }
}

fn classify(line: &[u8]) -> LineKind {
    match line {
        [] => LineKind::Skipped("empty line"),
        [b'B', b'1', ..] => {
            let text = String::from_utf8_lossy(line);
            let mut fields = text.split('\t');
            let (Some(_), Some(timestamp), Some(uuid)) = (fields.next(), fields.next(), fields.next())
            else {
                return LineKind::Skipped("record has fewer than three fields");
            };
            if timestamp.is_empty() || uuid.is_empty() {
                return LineKind::Skipped("record has an empty timestamp or uuid");
            }
            LineKind::Record(MetricRecord {
                timestamp: timestamp.to_string(),
                uuid: uuid.to_string(),
                data: text.to_string(),
            })
        }
        [b'B', b'2', ..] => LineKind::Ignored,
        [b'B', ..] => LineKind::Skipped("bad version"),
        _ => LineKind::Skipped("not a journal record"),
    }
}
