use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub livestream: LivestreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Monitor daemon endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    /// Timeout for ordinary control requests in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Timeout for test runs when the check declares none, in milliseconds.
    #[serde(default = "default_test_timeout")]
    pub test_timeout_ms: u64,
    /// Maximum concurrent sockets shared by all control requests.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
            request_timeout_ms: default_request_timeout(),
            test_timeout_ms: default_test_timeout(),
            max_connections: default_max_connections(),
            tls: TlsConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    /// Base URL for control requests, scheme chosen by the TLS setting.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls.enabled { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

fn default_daemon_host() -> String {
    "127.0.0.1".to_string()
}

fn default_daemon_port() -> u16 {
    54102
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_test_timeout() -> u64 {
    60_000
}

fn default_max_connections() -> usize {
    10
}

/// TLS material for one connection target.
///
/// Verification settings apply only to clients built from this section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// PEM client certificate (mutual TLS).
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// PEM private key matching `cert_path`.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// PEM CA bundle used to verify the daemon.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    /// Skip server certificate verification for this target.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: None,
            key_path: None,
            ca_path: None,
            accept_invalid_certs: false,
        }
    }
}

impl TlsConfig {
    /// Plain TCP, no TLS.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retry policy shared by all control operations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
        )
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Batch ingestion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Host serving the journal handoff feed.
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_ingest_port")]
    pub port: u16,
    #[serde(default = "default_handoff_path")]
    pub path: String,
    /// Directory the journal files named by the feed live in.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
    /// Logical name of the feed, used as the run label prefix.
    #[serde(default = "default_source_name")]
    pub source_name: String,
    /// Buffered units between pipeline stages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_ingest_port(),
            path: default_handoff_path(),
            journal_dir: default_journal_dir(),
            source_name: default_source_name(),
            channel_capacity: default_channel_capacity(),
            tls: TlsConfig::disabled(),
        }
    }
}

impl IngestConfig {
    /// Endpoint settings for the handoff transport.
    ///
    /// The feed is fetched with the control-plane client, so it reuses the
    /// daemon timeouts and pool size.
    pub fn endpoint(&self, daemon: &DaemonConfig) -> DaemonConfig {
        DaemonConfig {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls.clone(),
            ..daemon.clone()
        }
    }
}

fn default_ingest_port() -> u16 {
    80
}

fn default_handoff_path() -> String {
    "/handoff/journals".to_string()
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("/var/log/stratcon.persist/127.0.0.1/noit-test/0/")
}

fn default_source_name() -> String {
    "stratcon".to_string()
}

fn default_channel_capacity() -> usize {
    1
}

/// Livestream socket configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivestreamConfig {
    /// Frames announcing a larger payload terminate the stream.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for LivestreamConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

/// Metric store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("noitlink.db")
}

/// Sanitized config for log output (key material reduced to flags)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub daemon: SanitizedEndpoint,
    pub ingest: SanitizedEndpoint,
    pub retry: RetryConfig,
    pub journal_dir: PathBuf,
    pub store_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub client_cert_configured: bool,
    pub ca_configured: bool,
    pub accept_invalid_certs: bool,
}

impl SanitizedEndpoint {
    fn new(host: &str, port: u16, tls: &TlsConfig) -> Self {
        Self {
            host: host.to_string(),
            port,
            tls: tls.enabled,
            client_cert_configured: tls.cert_path.is_some() && tls.key_path.is_some(),
            ca_configured: tls.ca_path.is_some(),
            accept_invalid_certs: tls.accept_invalid_certs,
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            daemon: SanitizedEndpoint::new(
                &config.daemon.host,
                config.daemon.port,
                &config.daemon.tls,
            ),
            ingest: SanitizedEndpoint::new(
                &config.ingest.host,
                config.ingest.port,
                &config.ingest.tls,
            ),
            retry: config.retry.clone(),
            journal_dir: config.ingest.journal_dir.clone(),
            store_path: config.store.path.clone(),
        }
    }
}
