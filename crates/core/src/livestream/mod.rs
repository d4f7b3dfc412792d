//! Persistent livestream of samples for one check.
//!
//! A session is opened with a short hello and then yields text frames until
//! either side closes. Sessions are not resumable: after an error or close,
//! callers open a new one.

mod client;
mod codec;

pub use client::{LiveConnection, LiveIo, LiveStream, LivestreamClient, LivestreamHandle};
pub use codec::{encode_hello, handshake, FrameDecoder, LIVESTREAM_MAGIC};

use thiserror::Error;

/// Errors that end a livestream session.
#[derive(Debug, Error)]
pub enum LivestreamError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(std::str::Utf8Error),

    #[error("Stream closed mid-frame with {buffered} bytes buffered")]
    Truncated { buffered: usize },
}
