//! Error types for the control client.

use thiserror::Error;

/// Classified failure of a control request.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// Connection refused, DNS failure, reset, or a broken body stream.
    #[error("Transport error on {method} {path}: {reason}")]
    Transport {
        method: String,
        path: String,
        reason: String,
    },

    /// The request did not complete within its timeout.
    #[error("{method} {path} timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        path: String,
        timeout_ms: u64,
    },

    /// Well-formed HTTP 500 error envelope.
    #[error("Daemon error on {method} {path}: {message}")]
    Daemon {
        method: String,
        path: String,
        message: String,
    },

    /// HTTP 500 whose body is not a readable envelope.
    #[error("Malformed 500 from daemon on {method} {path}: {reason}")]
    MalformedResponse {
        method: String,
        path: String,
        reason: String,
    },

    /// Any other non-200 status.
    #[error("Unexpected status {status} on {method} {path}")]
    Status {
        status: u16,
        method: String,
        path: String,
    },

    #[error("Check with uuid {0} does not exist")]
    NotFound(String),

    /// A 200 reply that could not be decoded.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    /// Caller supplied check XML that could not be parsed.
    #[error("Invalid check definition: {0}")]
    InvalidCheck(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl ControlError {
    /// Whether the operation-level retry policy applies.
    ///
    /// Not-found replies are retried like any other classified failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Status { .. } | Self::InvalidCheck(_) | Self::Tls(_)
        )
    }

    /// Label used for the request outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Daemon { .. } => "daemon_error",
            Self::MalformedResponse { .. } => "malformed",
            Self::Status { .. } => "status",
            Self::NotFound(_) => "not_found",
            Self::InvalidBody(_) => "invalid_body",
            Self::InvalidCheck(_) => "invalid_check",
            Self::Tls(_) => "tls",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
