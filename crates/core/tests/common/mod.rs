//! Shared helpers for integration tests.
//!
//! Provides an in-process fake monitor daemon served by axum on an
//! ephemeral local port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::net::TcpListener;

use noitlink_core::config::{DaemonConfig, TlsConfig};
use noitlink_core::{ControlClient, RetryPolicy};

pub const CHECK_XML: &str = r#"<?xml version="1.0" encoding="utf8"?>
<check>
  <attributes>
    <uuid>1b4e28ba-2fa1-11d2-883f-0016d3cca427</uuid>
    <name>web</name>
    <module>http</module>
    <target>10.0.0.1</target>
    <period>60000</period>
    <timeout>5000</timeout>
    <filterset>default</filterset>
  </attributes>
  <config><url>http://10.0.0.1/</url></config>
</check>"#;

pub const CHECKS_XML: &str = r#"<?xml version="1.0" encoding="utf8"?>
<noit>
  <checks>
    <check uuid="1b4e28ba-2fa1-11d2-883f-0016d3cca427" module="http"/>
    <dc1>
      <check uuid="6ba7b810-9dad-11d1-80b4-00c04fd430c8" module="ping_icmp"/>
    </dc1>
    <check uuid="f47ac10b-58cc-4372-a567-0e02b2c3d479" module="selfcheck"/>
    <check module="snmp"/>
  </checks>
</noit>"#;

pub const TEST_RESULT_XML: &str = r#"<?xml version="1.0" encoding="utf8"?>
<check>
  <state>
    <state>good</state>
    <availability>available</availability>
    <status>code=200,rt=0.012s</status>
    <metrics>
      <metric name="code" type="s">200</metric>
      <metric name="duration" type="I">12</metric>
    </metrics>
  </state>
  <last_run>1700000000.123</last_run>
</check>"#;

pub const VERSION_XML: &str = r#"<?xml version="1.0" encoding="utf8"?>
<check>
  <state>
    <state>good</state>
    <availability>available</availability>
    <status>ok</status>
    <metrics>
      <metric name="version" type="s">0.9.1.master.abc123</metric>
      <metric name="checks_run" type="L">42</metric>
    </metrics>
  </state>
  <last_run>1700000000.000</last_run>
</check>"#;

/// Check ids with canned behavior on `/checks/show` and `/checks/delete`.
pub const PRESENT: &str = "1b4e28ba-2fa1-11d2-883f-0016d3cca427";
pub const ABSENT: &str = "00000000-0000-0000-0000-000000000000";
pub const DAEMON_FAILURE: &str = "daemon-failure";
pub const GARBLED_FAILURE: &str = "garbled-failure";
pub const FORBIDDEN: &str = "forbidden";
pub const FLAKY: &str = "flaky";
pub const SLOW: &str = "slow";

/// Requests seen by the fake daemon.
#[derive(Debug, Default)]
pub struct DaemonLog {
    hits: Mutex<HashMap<String, usize>>,
    bodies: Mutex<Vec<String>>,
}

impl DaemonLog {
    fn record(&self, path: String, body: Option<String>) -> usize {
        let mut hits = self.hits.lock().unwrap();
        let count = hits.entry(path).or_insert(0);
        *count += 1;
        if let Some(body) = body {
            self.bodies.lock().unwrap().push(body);
        }
        *count
    }

    /// Number of requests made to `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Fake daemon listening on 127.0.0.1.
pub struct FakeDaemon {
    pub port: u16,
    pub log: Arc<DaemonLog>,
    handoff_body: Arc<Mutex<Option<(StatusCode, String)>>>,
}

impl FakeDaemon {
    pub async fn start() -> Self {
        let log = Arc::new(DaemonLog::default());
        let handoff_body = Arc::new(Mutex::new(None));
        let state = AppState {
            log: log.clone(),
            handoff_body: handoff_body.clone(),
        };

        let router = Router::new()
            .route("/checks/show/{uuid}", get(show_check))
            .route("/checks/set/{uuid}", put(set_check))
            .route("/checks/delete/{uuid}", delete(delete_check))
            .route("/checks/test", post(test_check))
            .route("/config/checks", get(all_checks))
            .route("/handoff/journals", get(handoff))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake daemon");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            port,
            log,
            handoff_body,
        }
    }

    /// Serve `body` with `status` on the handoff path.
    pub fn set_handoff(&self, status: StatusCode, body: impl Into<String>) {
        *self.handoff_body.lock().unwrap() = Some((status, body.into()));
    }

    /// Plain-TCP endpoint settings for this daemon.
    pub fn config(&self) -> DaemonConfig {
        DaemonConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            request_timeout_ms: 2_000,
            test_timeout_ms: 2_000,
            max_connections: 4,
            tls: TlsConfig::disabled(),
        }
    }

    /// Client retrying up to three times with millisecond delays.
    pub fn client(&self) -> ControlClient {
        self.client_with(RetryPolicy::new(3, Duration::from_millis(5), 1.0))
    }

    pub fn client_with(&self, policy: RetryPolicy) -> ControlClient {
        ControlClient::new(&self.config(), policy).expect("Failed to build client")
    }
}

#[derive(Clone)]
struct AppState {
    log: Arc<DaemonLog>,
    handoff_body: Arc<Mutex<Option<(StatusCode, String)>>>,
}

async fn show_check(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> (StatusCode, String) {
    let hits = state.log.record(format!("/checks/show/{}", uuid), None);
    match uuid.as_str() {
        PRESENT => (StatusCode::OK, CHECK_XML.to_string()),
        DAEMON_FAILURE => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<error>check module not loaded</error>".to_string(),
        ),
        GARBLED_FAILURE => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html><body>Internal".to_string(),
        ),
        FORBIDDEN => (StatusCode::FORBIDDEN, String::new()),
        FLAKY if hits < 3 => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<error>busy</error>".to_string(),
        ),
        FLAKY => (StatusCode::OK, CHECK_XML.to_string()),
        SLOW => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, CHECK_XML.to_string())
        }
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn set_check(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    body: String,
) -> (StatusCode, String) {
    state.log.record(format!("/checks/set/{}", uuid), Some(body));
    (StatusCode::OK, CHECK_XML.to_string())
}

async fn delete_check(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> (StatusCode, String) {
    state.log.record(format!("/checks/delete/{}", uuid), None);
    match uuid.as_str() {
        PRESENT => (StatusCode::OK, String::new()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn test_check(State(state): State<AppState>, body: String) -> (StatusCode, String) {
    let selfcheck = body.contains("<module>selfcheck</module>");
    state.log.record("/checks/test".to_string(), Some(body));
    if selfcheck {
        (StatusCode::OK, VERSION_XML.to_string())
    } else {
        (StatusCode::OK, TEST_RESULT_XML.to_string())
    }
}

async fn all_checks(State(state): State<AppState>) -> (StatusCode, String) {
    state.log.record("/config/checks".to_string(), None);
    (StatusCode::OK, CHECKS_XML.to_string())
}

async fn handoff(State(state): State<AppState>) -> (StatusCode, String) {
    state.log.record("/handoff/journals".to_string(), None);
    state
        .handoff_body
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((StatusCode::NOT_FOUND, String::new()))
}
