//! Plain TCP transport.
//!
//! The stream is split into owned read and write halves, each behind its
//! own lock, so a reader parked in `recv` never blocks a broadcast write.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};

use crate::{Connection, ConnectionId, Transport, TransportError, WriteGuard};

/// Size of a single read from the socket.
const READ_CHUNK: usize = 4096;

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::new(stream);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single TCP connection.
///
/// A write that does not run to completion (its future was dropped by a
/// timeout, or the socket errored) leaves part of a line on the wire. The
/// connection is then marked broken and refuses every later write, so
/// nothing is ever appended to a torn line.
pub struct TcpConnection {
    id: ConnectionId,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    /// Set by `close`.
    closed: AtomicBool,
    /// Set when a write was interrupted.
    broken: AtomicBool,
    /// Wakes a reader parked in `recv` when the connection is closed.
    close_notify: Notify,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            id: ConnectionId::next(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_writable(&self) -> bool {
        !self.is_closed() && !self.broken.load(Ordering::Acquire)
    }
}

impl Connection for TcpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_writable() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        let mut writer = self.writer.lock().await;
        // Checked again: the previous holder of the lock may have broken it.
        if !self.is_writable() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }

        let guard = WriteGuard::arm(&self.broken);
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)?;
        guard.disarm();
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let closed = self.close_notify.notified();
        tokio::pin!(closed);
        // Registered before the flag is checked so a concurrent close
        // cannot slip between the two.
        closed.as_mut().enable();
        if self.is_closed() {
            return Ok(None);
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let mut reader = self.reader.lock().await;
        let n = tokio::select! {
            _ = &mut closed => return Ok(None),
            read = reader.read(&mut buf) => read.map_err(TransportError::ReceiveFailed)?,
        };
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.close_notify.notify_waiters();
        // Only the write half can be shut down; the peer observes EOF.
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
