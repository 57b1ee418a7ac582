//! Error types for the session layer.

use chatline_transport::ConnectionId;

/// Errors that end a session's command processing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client failed to prove the shared secret, or tried to chat
    /// before authenticating. The session is terminal.
    #[error("authentication failed for {user:?}")]
    AuthenticationFailure {
        /// The name the client identified as (empty if it never did).
        user: String,
    },

    /// A command was applied to a session that is already terminal.
    #[error("session {0} is terminated")]
    Terminated(ConnectionId),
}
