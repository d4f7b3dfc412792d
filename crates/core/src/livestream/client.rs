use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::metrics;
use crate::tls::TlsMaterial;

use super::codec::{handshake, FrameDecoder};
use super::LivestreamError;

/// Byte transport under a livestream session.
pub trait LiveIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LiveIo for T {}

/// A livestream over a TLS or plain TCP socket.
pub type LiveConnection = LiveStream<Box<dyn LiveIo>>;

/// Decoded frame sequence over an established transport.
pub struct LiveStream<S> {
    io: S,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<S> LiveStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the hello for `uuid` and start decoding.
    pub async fn connect(
        mut io: S,
        uuid: &Uuid,
        period_ms: u32,
        max_frame: usize,
    ) -> Result<Self, LivestreamError> {
        handshake(&mut io, uuid, period_ms).await?;
        Ok(Self::new(io, max_frame))
    }

    /// Decode frames from a transport that has already sent its hello.
    pub fn new(io: S, max_frame: usize) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(8 * 1024),
            decoder: FrameDecoder::new(max_frame),
        }
    }

    /// Next frame, or `None` when the peer closed between frames.
    pub async fn next_frame(&mut self) -> Result<Option<String>, LivestreamError> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            let read = self.io.read_buf(&mut self.buf).await?;
            if read == 0 {
                if self.decoder.at_boundary(&self.buf) {
                    return Ok(None);
                }
                return Err(LivestreamError::Truncated {
                    buffered: self.buf.len(),
                });
            }
        }
    }

    /// Shut down the write side of the transport.
    pub async fn close(mut self) -> Result<(), LivestreamError> {
        self.io.shutdown().await?;
        Ok(())
    }
}

/// Opens livestream sessions against one daemon.
#[derive(Clone)]
pub struct LivestreamClient {
    host: String,
    port: u16,
    tls: Option<Arc<ClientConfig>>,
    max_frame: usize,
}

impl LivestreamClient {
    pub fn new(config: &DaemonConfig, max_frame: usize) -> Result<Self, LivestreamError> {
        let tls = if config.tls.enabled {
            let material =
                TlsMaterial::load(&config.tls).map_err(|e| LivestreamError::Tls(e.to_string()))?;
            let client_config = material
                .rustls_config()
                .map_err(|e| LivestreamError::Tls(e.to_string()))?;
            Some(client_config)
        } else {
            None
        };

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            tls,
            max_frame,
        })
    }

    /// Connect and send the hello for `uuid` at `period_ms`.
    pub async fn open(&self, uuid: &Uuid, period_ms: u32) -> Result<LiveConnection, LivestreamError> {
        let addr = format!("{}:{}", self.host, self.port);
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| LivestreamError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;

        let io: Box<dyn LiveIo> = match &self.tls {
            Some(config) => {
                let server_name = ServerName::try_from(self.host.as_str())
                    .map_err(|e| LivestreamError::Tls(e.to_string()))?
                    .to_owned();
                let stream = TlsConnector::from(Arc::clone(config))
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| LivestreamError::Tls(e.to_string()))?;
                Box::new(stream)
            }
            None => Box::new(tcp),
        };

        let stream = LiveStream::connect(io, uuid, period_ms, self.max_frame).await?;
        metrics::LIVESTREAM_SESSIONS.inc();
        info!(uuid = %uuid, addr = %addr, period_ms, "Connected via livestream");
        Ok(stream)
    }

    /// Open a session and deliver each frame to `consumer` on a background task.
    ///
    /// Frames are delivered one at a time; the next read starts only after
    /// `consumer` returns.
    pub async fn subscribe<F>(
        &self,
        uuid: Uuid,
        period_ms: u32,
        consumer: F,
    ) -> Result<LivestreamHandle, LivestreamError>
    where
        F: FnMut(String) + Send + 'static,
    {
        let stream = self.open(&uuid, period_ms).await?;
        Ok(LivestreamHandle::spawn(uuid, stream, consumer))
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle closes the session.
pub struct LivestreamHandle {
    closed: Arc<AtomicBool>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), LivestreamError>>>,
}

impl LivestreamHandle {
    /// Drive `stream` on a new task, feeding frames to `consumer`.
    pub fn spawn<S, F>(uuid: Uuid, mut stream: LiveStream<S>, mut consumer: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnMut(String) + Send + 'static,
    {
        let closed = Arc::new(AtomicBool::new(false));
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let flag = Arc::clone(&closed);

        let task = tokio::spawn(async move {
            let result = loop {
                tokio::select! {
                    biased;
                    _ = &mut close_rx => {
                        debug!(uuid = %uuid, "Livestream closed by caller");
                        break Ok(());
                    }
                    frame = stream.next_frame() => match frame {
                        Ok(Some(frame)) => {
                            if flag.load(Ordering::SeqCst) {
                                break Ok(());
                            }
                            metrics::LIVESTREAM_FRAMES.inc();
                            consumer(frame);
                        }
                        Ok(None) => {
                            info!(uuid = %uuid, "Livestream closed by daemon");
                            break Ok(());
                        }
                        Err(e) => {
                            error!(uuid = %uuid, error = %e, "Livestream terminated");
                            break Err(e);
                        }
                    },
                }
            };

            if let Err(e) = stream.close().await {
                debug!(uuid = %uuid, error = %e, "Error shutting down livestream socket");
            }
            result
        });

        Self {
            closed,
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    /// Stop delivery. No frame reaches the consumer after this returns.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the session to end and return why it ended.
    ///
    /// A close by either side at a frame boundary is `Ok`. Cancel safe; once
    /// it has returned, later calls return `Ok` immediately.
    pub async fn wait(&mut self) -> Result<(), LivestreamError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(LivestreamError::Io(std::io::Error::other(e))),
        };
        self.task = None;
        result
    }
}

impl Drop for LivestreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
