//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Control client (requests, durations, retries)
//! - Livestream (frames delivered, sessions)
//! - Ingestion pipeline (journals, lines, records, dropped writes)

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

// =============================================================================
// Control Client Metrics
// =============================================================================

/// Daemon requests total by action and outcome.
pub static DAEMON_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("noitlink_daemon_requests_total", "Total requests sent to the monitor daemon"),
        &["action", "outcome"], // outcome: "ok", "daemon_error", "malformed", "status", "transport"
    )
    .unwrap()
});

/// Daemon request duration in seconds.
pub static DAEMON_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "noitlink_daemon_request_duration_seconds",
            "Duration of monitor daemon requests",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["action"],
    )
    .unwrap()
});

/// Retry attempts total by action (attempts after the first).
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("noitlink_retry_attempts_total", "Total control request retries"),
        &["action"],
    )
    .unwrap()
});

// =============================================================================
// Livestream Metrics
// =============================================================================

/// Livestream sessions opened.
pub static LIVESTREAM_SESSIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("noitlink_livestream_sessions_total", "Total livestream sessions opened")
        .unwrap()
});

/// Livestream frames decoded and delivered.
pub static LIVESTREAM_FRAMES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "noitlink_livestream_frames_total",
        "Total livestream frames delivered to consumers",
    )
    .unwrap()
});

// =============================================================================
// Ingestion Metrics
// =============================================================================

/// Journal files by result.
pub static JOURNAL_FILES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("noitlink_journal_files_total", "Journal files referenced by the handoff feed"),
        &["result"], // "streamed", "failed", "rejected"
    )
    .unwrap()
});

/// Journal lines by classification.
pub static JOURNAL_LINES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("noitlink_journal_lines_total", "Journal lines seen by the record parser"),
        &["kind"], // "record", "ignored", "skipped"
    )
    .unwrap()
});

/// Records persisted to the metric store.
pub static RECORDS_PERSISTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "noitlink_records_persisted_total",
        "Total metric records written to the store",
    )
    .unwrap()
});

/// Store writes that failed and were dropped.
pub static STORE_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "noitlink_store_write_failures_total",
        "Total metric store writes that failed and were dropped",
    )
    .unwrap()
});

/// Batches dropped because they could not be decoded.
pub static BATCHES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "noitlink_batches_dropped_total",
        "Total record batches dropped because they could not be decoded",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Control client
        Box::new(DAEMON_REQUESTS.clone()),
        Box::new(DAEMON_REQUEST_DURATION.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        // Livestream
        Box::new(LIVESTREAM_SESSIONS.clone()),
        Box::new(LIVESTREAM_FRAMES.clone()),
        // Ingestion
        Box::new(JOURNAL_FILES.clone()),
        Box::new(JOURNAL_LINES.clone()),
        Box::new(RECORDS_PERSISTED.clone()),
        Box::new(STORE_WRITE_FAILURES.clone()),
        Box::new(BATCHES_DROPPED.clone()),
    ]
}

/// Render all core metrics in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric)?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
