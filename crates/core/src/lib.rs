pub mod check;
pub mod config;
pub mod control;
pub mod ingest;
pub mod livestream;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod testing;
pub mod tls;

pub use check::{Check, CheckState, MetricValue, VERSION_CHECK};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use control::{ControlClient, ControlError, HandoffFeed};
pub use ingest::{IngestError, IngestOrchestrator, IngestSummary, MetricRecord, RecordBatch};
pub use livestream::{LivestreamClient, LivestreamError, LivestreamHandle};
pub use retry::{retry, retry_when, RetryPolicy};
pub use store::{MetricStore, SqliteMetricStore, StoreError};
pub use tls::{TlsError, TlsMaterial};
