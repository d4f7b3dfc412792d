//! HTTP implementation of the control client.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, debug_span, error, Instrument};

use crate::check::{self, Check, CheckState, VERSION_CHECK, VERSION_METRIC};
use crate::config::DaemonConfig;
use crate::metrics;
use crate::retry::{retry_when, RetryPolicy};
use crate::tls::TlsMaterial;

use super::{ByteStream, ControlError, HandoffFeed};

/// Added to a check's declared timeout when running a test.
const TEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(20);

/// Per-request settings.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Short operation name used in logs and metrics.
    pub action: &'static str,
    /// Overrides the client's default request timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn action(action: &'static str) -> Self {
        Self {
            action,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client for check management on one monitor daemon.
///
/// Requests from concurrent callers share a bounded pool of sockets; no
/// other state is shared between calls.
#[derive(Clone)]
pub struct ControlClient {
    http: Client,
    host: String,
    port: u16,
    base_url: String,
    request_timeout: Duration,
    test_timeout: Duration,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl ControlClient {
    /// Create a client for the daemon described by `config`.
    pub fn new(config: &DaemonConfig, policy: RetryPolicy) -> Result<Self, ControlError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.request_timeout())
            .pool_max_idle_per_host(0);

        if config.tls.enabled {
            let material =
                TlsMaterial::load(&config.tls).map_err(|e| ControlError::Tls(e.to_string()))?;
            builder = material
                .apply_to(builder)
                .map_err(|e| ControlError::Tls(e.to_string()))?;
        }

        let http = builder
            .build()
            .map_err(|e| ControlError::Tls(e.to_string()))?;

        Ok(Self {
            http,
            host: config.host.clone(),
            port: config.port,
            base_url: config.base_url(),
            request_timeout: config.request_timeout(),
            test_timeout: config.test_timeout(),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform one request and classify the outcome.
    ///
    /// Returns the body of a 200 reply. Not retried.
    pub async fn send_receive(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
        options: RequestOptions,
    ) -> Result<String, ControlError> {
        let label = format!(
            "{}:{}.{}",
            self.host.replace('.', "_"),
            self.port,
            options.action
        );
        let span = debug_span!("daemon_request", work = %label);

        async {
            let start = Instant::now();
            let result = self.exchange(&method, path, body, options).await;

            metrics::DAEMON_REQUEST_DURATION
                .with_label_values(&[options.action])
                .observe(start.elapsed().as_secs_f64());
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.outcome(),
            };
            metrics::DAEMON_REQUESTS
                .with_label_values(&[options.action, outcome])
                .inc();

            result
        }
        .instrument(span)
        .await
    }

    async fn exchange(
        &self,
        method: &Method,
        path: &str,
        body: Option<&str>,
        options: RequestOptions,
    ) -> Result<String, ControlError> {
        let timeout = options.timeout.unwrap_or(self.request_timeout);
        let url = format!("{}{}", self.base_url, path);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| self.transport(method, path, e.to_string()))?;

        debug!(
            host = %self.host,
            port = self.port,
            method = %method,
            path,
            action = options.action,
            timeout_ms = timeout.as_millis() as u64,
            "Sending daemon request"
        );

        let mut request = self.http.request(method.clone(), &url).timeout(timeout);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(method, path, timeout, e))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| self.classify(method, path, timeout, e))?;
                debug!(
                    host = %self.host,
                    port = self.port,
                    path,
                    status = status.as_u16(),
                    "Daemon request succeeded"
                );
                Ok(text)
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| self.classify(method, path, timeout, e))?;
                Err(self.daemon_error(method, path, &text))
            }
            _ => {
                error!(
                    host = %self.host,
                    port = self.port,
                    method = %method,
                    path,
                    status = status.as_u16(),
                    "Daemon request failed (non-500)"
                );
                Err(ControlError::Status {
                    status: status.as_u16(),
                    method: method.to_string(),
                    path: path.to_string(),
                })
            }
        }
    }

    fn daemon_error(&self, method: &Method, path: &str, body: &str) -> ControlError {
        match check::parse_error_envelope(body) {
            Ok(message) => {
                error!(
                    host = %self.host,
                    port = self.port,
                    method = %method,
                    path,
                    message = %message,
                    "Received 500 from daemon"
                );
                ControlError::Daemon {
                    method: method.to_string(),
                    path: path.to_string(),
                    message,
                }
            }
            Err(e) => {
                error!(
                    host = %self.host,
                    port = self.port,
                    method = %method,
                    path,
                    body,
                    error = %e,
                    "Unable to parse 500 from daemon"
                );
                ControlError::MalformedResponse {
                    method: method.to_string(),
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn classify(
        &self,
        method: &Method,
        path: &str,
        timeout: Duration,
        e: reqwest::Error,
    ) -> ControlError {
        if e.is_timeout() {
            error!(
                host = %self.host,
                port = self.port,
                method = %method,
                path,
                timeout_ms = timeout.as_millis() as u64,
                "Daemon request timed out"
            );
            return ControlError::Timeout {
                method: method.to_string(),
                path: path.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            };
        }

        let reason = error_chain(&e);
        error!(
            host = %self.host,
            port = self.port,
            method = %method,
            path,
            error = %reason,
            "Daemon request error"
        );
        self.transport(method, path, reason)
    }

    fn transport(&self, method: &Method, path: &str, reason: String) -> ControlError {
        ControlError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            reason,
        }
    }

    /// Run `worker` under the client's retry policy.
    async fn with_retry<T, F, Fut>(&self, action: &'static str, mut worker: F) -> Result<T, ControlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlError>>,
    {
        retry_when(
            &self.policy,
            |attempt| {
                if attempt > 1 {
                    metrics::RETRY_ATTEMPTS.with_label_values(&[action]).inc();
                }
                worker()
            },
            ControlError::is_retryable,
        )
        .await
    }

    /// Fetch the raw XML of one check.
    pub async fn get_check(&self, uuid: &str) -> Result<String, ControlError> {
        let path = format!("/checks/show/{}", urlencoding::encode(uuid));
        let path = path.as_str();
        let options = RequestOptions::action("getCheck");

        self.with_retry(options.action, move || async move {
            match self.send_receive(Method::GET, path, None, options).await {
                Err(ControlError::Status { status: 404, .. }) => {
                    Err(ControlError::NotFound(uuid.to_string()))
                }
                other => other,
            }
        })
        .await
    }

    /// Fetch and decode one check.
    pub async fn get_check_definition(&self, uuid: &str) -> Result<Check, ControlError> {
        let xml = self.get_check(uuid).await?;
        Check::from_xml(&xml).map_err(|e| ControlError::InvalidBody(e.to_string()))
    }

    /// UUIDs of every check configured on the daemon.
    pub async fn get_all_checks(&self) -> Result<HashSet<String>, ControlError> {
        let options = RequestOptions::action("getAllChecks");

        self.with_retry(options.action, move || async move {
            let body = self
                .send_receive(Method::GET, "/config/checks", None, options)
                .await?;
            check::collect_uuids(&body).map_err(|e| ControlError::InvalidBody(e.to_string()))
        })
        .await
    }

    /// Create or replace a check.
    pub async fn set_check(&self, uuid: &str, xml: &str) -> Result<(), ControlError> {
        let path = format!("/checks/set/{}", urlencoding::encode(uuid));
        let path = path.as_str();
        let options = RequestOptions::action("setCheck");

        self.with_retry(options.action, move || async move {
            self.send_receive(Method::PUT, path, Some(xml), options)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Delete a check. A check that is already absent counts as deleted.
    pub async fn delete_check(&self, uuid: &str) -> Result<(), ControlError> {
        let path = format!("/checks/delete/{}", urlencoding::encode(uuid));
        let path = path.as_str();
        let options = RequestOptions::action("deleteCheck");

        self.with_retry(options.action, move || async move {
            match self.send_receive(Method::DELETE, path, None, options).await {
                Ok(_) => Ok(()),
                Err(ControlError::Status { status: 404, .. }) => {
                    error!(path, uuid, "Received 404 deleting check, treating as deleted");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Run a check once without installing it.
    ///
    /// The request timeout is the check's declared timeout plus a fixed
    /// margin, or the configured test timeout when none is declared.
    pub async fn test_check(&self, uuid: &str, xml: &str) -> Result<CheckState, ControlError> {
        let timeout = test_timeout_for(xml, self.test_timeout)?;
        let options = RequestOptions::action("testCheck").with_timeout(timeout);

        debug!(uuid, timeout_ms = timeout.as_millis() as u64, "Testing check");

        self.with_retry(options.action, move || async move {
            let body = self
                .send_receive(Method::POST, "/checks/test", Some(xml), options)
                .await?;
            Ok(CheckState::from_xml(&body))
        })
        .await
    }

    /// Version string reported by the daemon's self-check.
    pub async fn get_version(&self) -> Result<String, ControlError> {
        let options = RequestOptions::action("getVersion").with_timeout(self.test_timeout);

        self.with_retry(options.action, move || async move {
            let body = self
                .send_receive(Method::POST, "/checks/test", Some(VERSION_CHECK), options)
                .await?;
            let state =
                CheckState::parse(&body).map_err(|e| ControlError::InvalidBody(e.to_string()))?;
            state
                .metric(VERSION_METRIC)
                .map(str::to_string)
                .ok_or_else(|| ControlError::InvalidBody("no version metric in reply".to_string()))
        })
        .await
    }
}

#[async_trait]
impl HandoffFeed for ControlClient {
    async fn open_stream(&self, path: &str) -> Result<ByteStream, ControlError> {
        let method = Method::GET;
        let url = format!("{}{}", self.base_url, path);

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| self.transport(&method, path, e.to_string()))?;

        debug!(host = %self.host, port = self.port, path, "Requesting handoff feed");

        // Bounds the wait for response headers; the streamed body is unbounded.
        let response = tokio::time::timeout(self.request_timeout, self.http.get(&url).send())
            .await
            .map_err(|_| {
                error!(
                    host = %self.host,
                    port = self.port,
                    path,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Handoff request timed out"
                );
                ControlError::Timeout {
                    method: method.to_string(),
                    path: path.to_string(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }
            })?
            .map_err(|e| self.classify(&method, path, self.request_timeout, e))?;

        let status = response.status();
        metrics::DAEMON_REQUESTS
            .with_label_values(&["handoff", if status == StatusCode::OK { "ok" } else { "status" }])
            .inc();

        if status != StatusCode::OK {
            error!(
                host = %self.host,
                port = self.port,
                path,
                status = status.as_u16(),
                "Handoff request failed"
            );
            return Err(ControlError::Status {
                status: status.as_u16(),
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        let stream_path = path.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            // The socket stays counted against the pool until the body is dropped.
            let _held = &permit;
            chunk.map_err(|e| ControlError::Transport {
                method: "GET".to_string(),
                path: stream_path.clone(),
                reason: error_chain(&e),
            })
        });

        Ok(stream.boxed())
    }
}

/// Request timeout for a test run of `xml`.
///
/// Declared `<timeout>` plus [`TEST_TIMEOUT_MARGIN`]; `default` when the
/// check declares none or a non-numeric one.
fn test_timeout_for(xml: &str, default: Duration) -> Result<Duration, ControlError> {
    let declared =
        check::declared_timeout(xml).map_err(|e| ControlError::InvalidCheck(e.to_string()))?;
    Ok(declared
        .map(|t| t + TEST_TIMEOUT_MARGIN)
        .unwrap_or(default))
}

/// Render an error with its source chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
