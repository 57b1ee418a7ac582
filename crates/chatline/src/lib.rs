//! # Chatline
//!
//! A multi-client chat server speaking a small line-based protocol.
//!
//! Clients connect, name themselves with `AUTH_REQUEST`, prove a shared
//! secret with `AUTH_ATTEMPT`, and every `MESSAGE` they send afterwards is
//! broadcast to everyone connected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatline::prelude::*;
//!
//! # async fn start() -> Result<(), ChatError> {
//! let server = ChatServer::builder()
//!     .bind("0.0.0.0:3333")
//!     .shared_secret("s3cret")
//!     .build()
//!     .await?;
//!
//! let handle = server.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.close();
//! });
//!
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ChatError, ConfigError};
pub use server::{ChatServer, ChatServerBuilder, ServerHandle};

/// Everything a host needs to run a server.
pub mod prelude {
    pub use crate::{
        ChatError, ChatServer, ChatServerBuilder, ConfigError, ServerConfig,
        ServerHandle,
    };
    pub use chatline_protocol::{Command, Reply};
    pub use chatline_registry::{BroadcastReport, MemberInfo};
    pub use chatline_transport::{Connection, ConnectionId, Transport};
}
