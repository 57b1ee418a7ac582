//! `ChatServer` builder, accept loop, and host handle.
//!
//! This is the entry point for running a Chatline server. It ties the
//! layers together: transport → protocol → session → registry.

use std::sync::Arc;
use std::time::Duration;

use chatline_protocol::Reply;
use chatline_registry::{BroadcastReport, MemberInfo, Registry};
use chatline_session::SharedSecret;
use chatline_transport::{Connection, ConnectionId, TcpTransport, Transport};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::handler::handle_connection;
use crate::{ChatError, ServerConfig};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Connection> {
    pub(crate) registry: Registry<C>,
    pub(crate) secret: SharedSecret,
    pub(crate) config: ServerConfig,
    /// Cancelled once by [`ServerHandle::close`]; every task watches it.
    pub(crate) shutdown: CancellationToken,
}

/// Builder for configuring and starting a Chatline server.
///
/// # Example
///
/// ```rust,no_run
/// use chatline::prelude::*;
///
/// # async fn run() -> Result<(), ChatError> {
/// let server = ChatServer::builder()
///     .bind("0.0.0.0:3333")
///     .shared_secret("s3cret")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ChatServerBuilder {
    config: ServerConfig,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the password clients authenticate with.
    pub fn shared_secret(mut self, secret: &str) -> Self {
        self.config.shared_secret = secret.to_string();
        self
    }

    /// Chooses whether authors receive their own chat lines.
    pub fn echo_to_sender(mut self, echo: bool) -> Self {
        self.config.echo_to_sender = echo;
        self
    }

    /// Bounds each recipient's write during a broadcast.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the longest accepted frame.
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    /// Binds a TCP listener and builds the server.
    pub async fn build(self) -> Result<ChatServer<TcpTransport>, ChatError> {
        self.config.validate()?;
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;
        Ok(self.build_with(transport))
    }

    /// Binds a WebSocket listener and builds the server.
    #[cfg(feature = "websocket")]
    pub async fn build_websocket(
        self,
    ) -> Result<ChatServer<chatline_transport::WebSocketTransport>, ChatError>
    {
        self.config.validate()?;
        let transport =
            chatline_transport::WebSocketTransport::bind(&self.config.bind_addr)
                .await?;
        Ok(self.build_with(transport))
    }

    /// Builds the server around an already bound transport.
    ///
    /// `bind_addr` is ignored; the transport decides where it listens.
    pub fn build_with<T: Transport>(self, transport: T) -> ChatServer<T> {
        let state = Arc::new(ServerState {
            registry: Registry::new(self.config.registry_config()),
            secret: SharedSecret::new(self.config.shared_secret.clone()),
            config: self.config,
            shutdown: CancellationToken::new(),
        });
        ChatServer { transport, state }
    }
}

impl Default for ChatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Chatline server bound to a transport.
///
/// Grab a [`ServerHandle`] before calling [`run()`](Self::run); the handle
/// is how the host stops the server or broadcasts announcements.
pub struct ChatServer<T: Transport> {
    transport: T,
    state: Arc<ServerState<T::Connection>>,
}

impl ChatServer<TcpTransport> {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }
}

impl<T: Transport> ChatServer<T> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a cloneable handle for controlling the running server.
    pub fn handle(&self) -> ServerHandle<T::Connection> {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop.
    ///
    /// Accepts connections and spawns a handler task for each one until
    /// [`ServerHandle::close`] is called. After that it drops the transport
    /// (closing the listener), waits for every handler to observe the
    /// shutdown and remove itself, and returns.
    pub async fn run(self) -> Result<(), ChatError> {
        let Self {
            mut transport,
            state,
        } = self;
        tracing::info!("chat server running");
        let tasks = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = state.shutdown.cancelled() => break,
                accepted = transport.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&state);
                    tasks.spawn(async move {
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                %conn_id,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        // The listener is closed before the handlers drain.
        drop(transport);
        tracing::info!(
            active = tasks.len(),
            "no longer accepting; waiting for connections to close"
        );
        tasks.close();
        tasks.wait().await;
        tracing::info!("chat server stopped");
        Ok(())
    }
}

/// Host-side control of a server: shutdown, announcements, inspection.
pub struct ServerHandle<C: Connection> {
    state: Arc<ServerState<C>>,
}

impl<C: Connection> Clone for ServerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Connection> ServerHandle<C> {
    /// Stops accepting connections and signals every connection handler
    /// to close its client. Idempotent.
    pub fn close(&self) {
        if !self.state.shutdown.is_cancelled() {
            tracing::info!("shutdown requested");
        }
        self.state.shutdown.cancel();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Sends a reply to every connected client, e.g. a server
    /// announcement as `Reply::message("server", "...")`.
    pub async fn broadcast(
        &self,
        reply: &Reply,
    ) -> Result<BroadcastReport, ChatError> {
        Ok(self.state.registry.broadcast(reply, None).await?)
    }

    /// Lists the connected clients.
    pub async fn connected_clients(&self) -> Vec<MemberInfo> {
        self.state.registry.members().await
    }

    /// Returns the chat lines a connected client has sent so far.
    pub async fn messages(&self, id: ConnectionId) -> Option<Vec<String>> {
        self.state.registry.messages(id).await
    }
}
