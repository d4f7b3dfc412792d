//! Batch ingestion of journal files into the metric store.
//!
//! ```text
//! handoff feed -> FileResolver -> RecordParser -> Sink -> MetricStore
//! ```
//!
//! Stages run as tasks joined by bounded channels, so each one only pulls
//! more input once downstream has taken its last unit.

mod lines;
mod orchestrator;
mod parser;
mod resolver;
mod sink;
mod types;

pub use lines::LineBuffer;
pub use orchestrator::IngestOrchestrator;
pub use parser::RecordParser;
pub use resolver::{journal_name, FileResolver, JOURNAL_MARKER};
pub use sink::Sink;
pub use types::*;
