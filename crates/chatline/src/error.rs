//! Unified error type for the Chatline server.

use chatline_protocol::ProtocolError;
use chatline_registry::RegistryError;
use chatline_session::SessionError;
use std::time::Duration;

use chatline_transport::{ConnectionId, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, parsing, encoding).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication failure).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A registry-level error (membership, broadcast).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A reply to a client did not finish writing in time.
    #[error("reply to {id} timed out after {after:?}")]
    WriteTimeout { id: ConnectionId, after: Duration },
}

/// Errors raised while loading a [`ServerConfig`](crate::ServerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for `ServerConfig`.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has a value the server cannot run with.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Transport(_)));
        assert!(chat_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownCommand(9);
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthenticationFailure {
            user: "alice".into(),
        };
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Session(_)));
        assert!(chat_err.to_string().contains("alice"));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::NotFound(ConnectionId::new(1));
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Registry(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::Invalid {
            field: "max_frame_len",
            reason: "must be positive".into(),
        };
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Config(_)));
    }
}
