//! TCP transport: bounded connect plus the background writer task.
//!
//! The writer task owns the stream's write half. Producers hand it
//! complete wire messages through a [`WriterHandle`]; the handle keeps
//! a queued-byte gauge so the pointer relay can drop events instead of
//! buffering without bound against an unresponsive server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::ClientError;

/// Messages buffered in the writer channel before backpressure kicks in.
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Open a TCP connection to `host:port`, bounded by `timeout`.
///
/// Failures are fatal to the current session attempt only; the
/// supervisor retries after its cooldown.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ClientError> {
    let addr = format!("{host}:{port}");
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
        .map_err(ClientError::Connect)?;
    stream.set_nodelay(true).map_err(ClientError::Connect)?;
    Ok(stream)
}

// ── WriterHandle ─────────────────────────────────────────────────

/// The capability to emit protocol messages on a session's outbound
/// stream.
///
/// Cloneable and callable from any thread; the gauge counts bytes
/// accepted from producers but not yet flushed to the socket.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    queued: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Create a handle and the receiving end of its message channel.
    ///
    /// Used by [`spawn_writer`] and by test doubles that want to
    /// observe enqueued messages without a socket.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let handle = Self {
            tx,
            queued: Arc::new(AtomicUsize::new(0)),
        };
        (handle, rx)
    }

    /// Bytes accepted for sending but not yet written and flushed.
    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Enqueue a message without blocking.
    ///
    /// Fails only when the writer task is gone or its channel is full;
    /// either way the message is not sent.
    pub fn send(&self, message: Bytes) -> Result<(), ClientError> {
        let len = message.len();
        self.queued.fetch_add(len, Ordering::SeqCst);
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.queued.fetch_sub(len, Ordering::SeqCst);
                Err(ClientError::ChannelClosed)
            }
        }
    }
}

/// Spawn the writer task that drains a [`WriterHandle`]'s channel into
/// `write_half`.
///
/// The task exits when every handle is dropped or the socket fails;
/// a socket failure also surfaces on the receive side, which is what
/// terminates the session.
pub fn spawn_writer<W>(write_half: W) -> WriterHandle
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (handle, mut rx) = WriterHandle::channel();
    let gauge = Arc::clone(&handle.queued);

    tokio::spawn(async move {
        let mut writer = write_half;
        while let Some(message) = rx.recv().await {
            let len = message.len();
            let ok = writer.write_all(&message).await.is_ok() && writer.flush().await.is_ok();
            gauge.fetch_sub(len, Ordering::SeqCst);
            if !ok {
                tracing::debug!("writer task stopping: socket closed");
                break;
            }
        }
    });

    handle
}

// ── Tests ────────────────────────────────────────────────────────
