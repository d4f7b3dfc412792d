//! Test doubles for the metric store and the handoff feed.
//!
//! These let the ingestion pipeline run end to end without a daemon or a
//! database file.
//!
//! # Example
//!
//! ```rust,ignore
//! use noitlink_core::testing::{MemoryMetricStore, MockHandoffFeed};
//!
//! let feed = Arc::new(MockHandoffFeed::with_chunks(["journal:/a/b/c/d/e/f/0001.h\n"]));
//! let store = Arc::new(MemoryMetricStore::new());
//! let orchestrator = IngestOrchestrator::new(feed, "/handoff/journals", dir, "stratcon", store.clone());
//! ```

mod memory_store;
mod mock_feed;

pub use memory_store::MemoryMetricStore;
pub use mock_feed::MockHandoffFeed;

/// Journal line fixtures.
pub mod fixtures {
    /// Handoff control line naming `file` in the journal directory.
    pub fn control_line(file: &str) -> String {
        format!(
            "journal:/var/log/stratcon.persist/127.0.0.1/noit-test/0/{}\r\n",
            file
        )
    }

    /// A `B1` record line, newline terminated.
    pub fn record_line(timestamp: &str, uuid: &str, payload: &str) -> String {
        format!("B1\t{}\t{}\t{}\n", timestamp, uuid, payload)
    }
}
