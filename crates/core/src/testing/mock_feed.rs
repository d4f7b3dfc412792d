//! Mock handoff feed for testing.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::control::{ByteStream, ControlError, HandoffFeed};

/// Serves a fixed handoff body, or a fixed failure.
///
/// Records every path requested.
#[derive(Debug)]
pub struct MockHandoffFeed {
    response: Result<Vec<Bytes>, ControlError>,
    requests: Mutex<Vec<String>>,
}

impl MockHandoffFeed {
    /// Serve `chunks` as the body, one stream item per chunk.
    pub fn with_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            response: Ok(chunks.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the handoff request with a status error.
    pub fn with_status(status: u16) -> Self {
        Self {
            response: Err(ControlError::Status {
                status,
                method: "GET".to_string(),
                path: "/handoff/journals".to_string(),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HandoffFeed for MockHandoffFeed {
    async fn open_stream(&self, path: &str) -> Result<ByteStream, ControlError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(path.to_string());
        }

        let chunks = self.response.clone()?;
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}
