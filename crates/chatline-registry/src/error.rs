//! Error types for the registry layer.

use std::time::Duration;

use chatline_protocol::ProtocolError;
use chatline_transport::{ConnectionId, TransportError};

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No member with this id is registered (never added, or removed).
    #[error("connection {0} is not registered")]
    NotFound(ConnectionId),

    /// A connection with this id is already registered.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The reply could not be encoded, so nothing was sent.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing a broadcast to one recipient failed.
    #[error("broadcast to {id} failed: {source}")]
    BroadcastWrite {
        id: ConnectionId,
        #[source]
        source: TransportError,
    },

    /// Writing a broadcast to one recipient did not finish in time.
    #[error("broadcast to {id} timed out after {after:?}")]
    WriteTimeout { id: ConnectionId, after: Duration },
}
