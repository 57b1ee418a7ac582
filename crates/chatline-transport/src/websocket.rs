//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each WebSocket message is treated as one chunk of the byte stream. The
//! line protocol runs unchanged on top, so a client may put several frames
//! in one message or spread one frame over several messages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError, WriteGuard};

type WsStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// How long a peer may take to complete the HTTP upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upgraded connections waiting for `accept`.
const PENDING_CONNECTIONS: usize = 64;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// The upgrade handshake runs in its own task per peer, so a client that
/// opens a socket and never speaks cannot hold up anyone else. Only fully
/// upgraded connections come out of [`accept`](Transport::accept).
/// Dropping the transport stops listening.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<WebSocketConnection>,
    listener_task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with_handshake_timeout(addr, HANDSHAKE_TIMEOUT).await
    }

    /// Like [`bind`](Self::bind) with a custom handshake deadline.
    pub async fn bind_with_handshake_timeout(
        addr: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr =
            listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");

        let (tx, ready) = mpsc::channel(PENDING_CONNECTIONS);
        let listener_task =
            tokio::spawn(listen(listener, tx, handshake_timeout));
        Ok(Self {
            local_addr,
            ready,
            listener_task,
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.listener_task.abort();
    }
}

/// Accepts TCP sockets and upgrades each one in a separate task.
async fn listen(
    listener: TcpListener,
    ready: mpsc::Sender<WebSocketConnection>,
    handshake_timeout: Duration,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "TCP accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };
        if ready.is_closed() {
            return;
        }

        let ready = ready.clone();
        tokio::spawn(async move {
            let ws = match tokio::time::timeout(
                handshake_timeout,
                tokio_tungstenite::accept_async(stream),
            )
            .await
            {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(%addr, "WebSocket handshake timed out");
                    return;
                }
            };

            let id = ConnectionId::next();
            tracing::debug!(%id, %addr, "accepted WebSocket connection");
            let (sink, stream) = ws.split();
            let conn = WebSocketConnection {
                id,
                sink: Mutex::new(sink),
                stream: Mutex::new(stream),
                closed: AtomicBool::new(false),
                broken: AtomicBool::new(false),
                close_notify: Notify::new(),
            };
            // Fails only if the transport is gone, taking the connection with it.
            let _ = ready.send(conn).await;
        });
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        self.ready.recv().await.ok_or_else(|| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener stopped",
            ))
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

/// A single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
    broken: AtomicBool,
    close_notify: Notify,
}

impl WebSocketConnection {
    fn is_writable(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && !self.broken.load(Ordering::Acquire)
    }
}

impl Connection for WebSocketConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_writable() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        // Replies are plain text, so they go out as text messages.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        let mut sink = self.sink.lock().await;
        if !self.is_writable() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }

        let guard = WriteGuard::arm(&self.broken);
        sink.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })?;
        guard.disarm();
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let closed = self.close_notify.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }

        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                _ = &mut closed => return Ok(None),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.close_notify.notify_waiters();
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
