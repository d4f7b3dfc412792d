//! Control-plane client for the monitor daemon.
//!
//! Every check operation is a single XML request wrapped in the shared
//! retry policy. The raw transport is also used to fetch the journal
//! handoff feed as a byte stream.

mod client;
mod error;

pub use client::{ControlClient, RequestOptions};
pub use error::ControlError;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, ControlError>>;

/// Source of the journal handoff feed.
#[async_trait]
pub trait HandoffFeed: Send + Sync {
    /// Issue one GET for `path` and stream the body of a 200 reply.
    ///
    /// Any other status is an error; callers must not retry it.
    async fn open_stream(&self, path: &str) -> Result<ByteStream, ControlError>;
}
