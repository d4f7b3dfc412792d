//! Wires one ingestion run: handoff feed, file resolver, record parser, sink.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::control::{ControlClient, HandoffFeed};
use crate::store::{MetricStore, SqliteMetricStore};

use super::parser::RecordParser;
use super::resolver::FileResolver;
use super::sink::Sink;
use super::types::{IngestError, IngestSummary, RunLabel};

/// Runs the batch ingestion pipeline.
pub struct IngestOrchestrator {
    feed: Arc<dyn HandoffFeed>,
    path: String,
    journal_dir: PathBuf,
    source_name: String,
    store: Arc<dyn MetricStore>,
    channel_capacity: usize,
}

impl IngestOrchestrator {
    pub fn new(
        feed: Arc<dyn HandoffFeed>,
        path: impl Into<String>,
        journal_dir: impl Into<PathBuf>,
        source_name: impl Into<String>,
        store: Arc<dyn MetricStore>,
    ) -> Self {
        Self {
            feed,
            path: path.into(),
            journal_dir: journal_dir.into(),
            source_name: source_name.into(),
            store,
            channel_capacity: 1,
        }
    }

    /// Build from configuration, opening the SQLite store.
    ///
    /// The handoff feed is fetched once, so the client makes a single attempt.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        let endpoint = config.ingest.endpoint(&config.daemon);
        let client = ControlClient::new(&endpoint, crate::retry::RetryPolicy::no_retry())?;
        let store = SqliteMetricStore::new(&config.store.path)?;

        Ok(Self::new(
            Arc::new(client),
            config.ingest.path.clone(),
            config.ingest.journal_dir.clone(),
            config.ingest.source_name.clone(),
            Arc::new(store),
        )
        .with_channel_capacity(config.ingest.channel_capacity))
    }

    /// Units buffered between stages. Minimum 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Fetch the handoff feed and drain it through the pipeline.
    ///
    /// Only a failed handoff request is an error. Problems inside the
    /// stages are logged and reported in the summary counters.
    pub async fn run(&self) -> Result<IngestSummary, IngestError> {
        let body = match self.feed.open_stream(&self.path).await {
            Ok(body) => body,
            Err(e) => {
                error!(path = %self.path, error = %e, "Handoff request failed, aborting ingestion");
                return Err(e.into());
            }
        };

        let started_at = Utc::now();
        let label = RunLabel::new(&self.source_name, started_at);
        info!(
            label = %label,
            journal_dir = %self.journal_dir.display(),
            "Starting ingestion run"
        );

        let (chunk_tx, chunk_rx) = mpsc::channel(self.channel_capacity);
        let (batch_tx, batch_rx) = mpsc::channel(self.channel_capacity);

        let resolver = tokio::spawn(FileResolver::new(&self.journal_dir).run(body, chunk_tx));
        let parser = tokio::spawn(RecordParser::new().run(chunk_rx, batch_tx));
        let sink = Sink::new(Arc::clone(&self.store), label.clone())
            .run(batch_rx)
            .await;

        let resolver = resolver.await.unwrap_or_else(|e| {
            error!(error = %e, "File resolver task failed");
            Default::default()
        });
        let parser = parser.await.unwrap_or_else(|e| {
            error!(error = %e, "Record parser task failed");
            Default::default()
        });

        let summary = IngestSummary {
            label,
            started_at,
            finished_at: Utc::now(),
            resolver,
            parser,
            sink,
        };

        info!(
            label = %summary.label,
            journals = summary.resolver.journals_streamed,
            records = summary.sink.records,
            write_failures = summary.sink.write_failures,
            "Ingestion run finished"
        );
        Ok(summary)
    }
}
