//! Turns handoff control lines into journal file contents.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::control::ControlError;
use crate::metrics;

use super::lines::LineBuffer;
use super::types::{JournalChunk, ResolverStats};

/// Substring marking a control line that names a journal file.
pub const JOURNAL_MARKER: &str = ".h";

const READ_CHUNK: usize = 64 * 1024;

/// Journal file name referenced by a control line.
///
/// The name is the eighth `/`-separated component of the line's second
/// `:`-separated field. Names that could escape the journal directory are
/// rejected.
pub fn journal_name(line: &str) -> Option<String> {
    if !line.contains(JOURNAL_MARKER) {
        return None;
    }

    let name: String = line
        .split(':')
        .nth(1)?
        .split('/')
        .nth(7)?
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();

    if name.is_empty() || name == "." || name.contains("..") || name.contains('\\') {
        return None;
    }
    Some(name)
}

/// Reads each journal named by the feed, one file at a time.
pub struct FileResolver {
    journal_dir: PathBuf,
    lines: LineBuffer,
    stats: ResolverStats,
}

impl FileResolver {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal_dir: journal_dir.into(),
            lines: LineBuffer::new(),
            stats: ResolverStats::default(),
        }
    }

    /// Consume the feed and send journal contents to `tx`.
    ///
    /// Stops early only if the receiver is gone.
    pub async fn run<S>(mut self, mut feed: S, tx: mpsc::Sender<JournalChunk>) -> ResolverStats
    where
        S: Stream<Item = Result<Bytes, ControlError>> + Unpin,
    {
        while let Some(chunk) = feed.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!(error = %e, "Handoff feed failed, finishing with what was received");
                    self.stats.feed_errors += 1;
                    break;
                }
            };

            let lines = self.lines.push(&chunk);
            let overlong = self.lines.take_overlong();
            if overlong > 0 {
                warn!(count = overlong, "Dropped over-long handoff control lines");
            }
            for line in lines {
                if !self.handle_line(&line, &tx).await {
                    return self.stats;
                }
            }
        }

        if let Some(line) = self.lines.finish() {
            self.handle_line(&line, &tx).await;
        }

        debug!(stats = ?self.stats, "File resolver finished");
        self.stats
    }

    /// Returns false once downstream has gone away.
    async fn handle_line(&mut self, line: &[u8], tx: &mpsc::Sender<JournalChunk>) -> bool {
        self.stats.control_lines += 1;

        let line = String::from_utf8_lossy(line);
        if !line.contains(JOURNAL_MARKER) {
            return true;
        }

        let Some(name) = journal_name(&line) else {
            warn!(line = %line, "Control line does not name a usable journal file");
            self.stats.journals_rejected += 1;
            metrics::JOURNAL_FILES.with_label_values(&["rejected"]).inc();
            return true;
        };

        let path = self.journal_dir.join(&name);
        self.stream_file(&path, tx).await
    }

    async fn stream_file(&mut self, path: &Path, tx: &mpsc::Sender<JournalChunk>) -> bool {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Unable to open journal file");
                self.stats.journals_failed += 1;
                metrics::JOURNAL_FILES.with_label_values(&["failed"]).inc();
                return true;
            }
        };

        debug!(path = %path.display(), "Streaming journal file");
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut failed = false;

        loop {
            buf.reserve(READ_CHUNK);
            match file.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    self.stats.bytes_streamed += n as u64;
                    if tx.send(JournalChunk::Data(buf.split().freeze())).await.is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Error reading journal file");
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            self.stats.journals_failed += 1;
            metrics::JOURNAL_FILES.with_label_values(&["failed"]).inc();
        } else {
            self.stats.journals_streamed += 1;
            metrics::JOURNAL_FILES.with_label_values(&["streamed"]).inc();
            info!(path = %path.display(), "Journal file has ended");
        }

        tx.send(JournalChunk::EndOfFile(path.to_path_buf()))
            .await
            .is_ok()
    }
}
