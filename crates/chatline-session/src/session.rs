//! Session types: the server's record of one chat connection.
//!
//! A session tracks:
//! - WHO the client says it is (`name`, set by `AUTH_REQUEST`)
//! - WHETHER it proved the shared secret ([`AuthState`])
//!
//! The state machine is pure: [`Session::apply`] takes a decoded
//! [`Command`] and returns an [`Action`] describing what the connection
//! handler should do (reply, broadcast, close). No I/O happens here, so
//! every transition is unit-testable.
//!
//! A session is owned by its connection handler task and never shared.
//! Other tasks only ever see the registry's copy of the name.

use chatline_protocol::{Command, Reply};
use chatline_transport::ConnectionId;

use crate::{SessionError, SharedSecret};

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// Authentication progress of a session.
///
/// ```text
///   Unidentified ──(AUTH_REQUEST)──→ Identified ──(AUTH_ATTEMPT ok)──→ Authenticated
///                                        │  ↑
///                                        │  └──(AUTH_REQUEST)
///                                        │
///                     (AUTH_ATTEMPT bad, or MESSAGE before auth)
///                                        ↓
///                                    AuthFailed   (terminal)
/// ```
///
/// A session is never authenticated and failed at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Connected, no name yet.
    Unidentified,
    /// Name set, secret not yet proven.
    Identified,
    /// Secret proven; may send messages.
    Authenticated,
    /// Failed authentication. No further commands are processed.
    AuthFailed,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What the connection handler must do after a command was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The session took a name. The registry's identity should follow.
    Identified { user: String },
    /// Secret accepted; reply `Authentication passed`.
    Authenticated,
    /// Secret rejected or chat before auth; reply `Authentication failed`
    /// and tear the connection down.
    AuthenticationFailed,
    /// Record the text in the session's log and broadcast it.
    Broadcast { user: String, text: String },
    /// The client asked to leave.
    Disconnect,
    /// Nothing to do.
    Ignored,
}

impl Action {
    /// The reply, if any, that goes back to this session's own client.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            Self::Authenticated => Some(Reply::AuthPass),
            Self::AuthenticationFailed => Some(Reply::AuthFailed),
            _ => None,
        }
    }

    /// Returns `true` if the handler must stop reading after this action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::Disconnect)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single client's session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    name: String,
    state: AuthState,
}

impl Session {
    /// Creates a fresh, unidentified session for an accepted connection.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            name: String::new(),
            state: AuthState::Unidentified,
        }
    }

    /// The connection this session belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The name from the last accepted `AUTH_REQUEST`, empty before that.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn auth_failed(&self) -> bool {
        self.state == AuthState::AuthFailed
    }

    /// Applies one decoded command and returns what the handler should do.
    ///
    /// # Errors
    /// Returns [`SessionError::Terminated`] if the session already failed
    /// authentication; the handler should have stopped reading by then.
    pub fn apply(
        &mut self,
        command: Command,
        secret: &SharedSecret,
    ) -> Result<Action, SessionError> {
        if self.auth_failed() {
            return Err(SessionError::Terminated(self.id));
        }

        let action = match command {
            Command::AuthRequest { user } => self.request(user),
            Command::AuthAttempt { user, password } => {
                self.attempt(&user, &password, secret)
            }
            Command::Message { text } => self.message(text),
            Command::Disconnect => {
                tracing::info!(id = %self.id, user = %self.name, "client left");
                Action::Disconnect
            }
        };
        Ok(action)
    }

    fn request(&mut self, user: String) -> Action {
        if self.is_authenticated() {
            tracing::debug!(
                id = %self.id,
                current = %self.name,
                requested = %user,
                "ignoring AUTH_REQUEST from authenticated session"
            );
            return Action::Ignored;
        }
        tracing::info!(id = %self.id, %user, "authentication requested");
        self.name.clone_from(&user);
        self.state = AuthState::Identified;
        Action::Identified { user }
    }

    fn attempt(
        &mut self,
        user: &str,
        password: &str,
        secret: &SharedSecret,
    ) -> Action {
        if self.state == AuthState::Unidentified {
            tracing::info!(id = %self.id, "AUTH_ATTEMPT before AUTH_REQUEST");
            return self.fail();
        }
        if user != self.name {
            // The identity is the one from AUTH_REQUEST.
            tracing::debug!(
                id = %self.id,
                name = %self.name,
                attempted = %user,
                "AUTH_ATTEMPT names a different user"
            );
        }
        if !secret.verify(password) {
            tracing::info!(id = %self.id, user = %self.name, "authentication failed");
            return self.fail();
        }
        tracing::info!(id = %self.id, user = %self.name, "authentication passed");
        self.state = AuthState::Authenticated;
        Action::Authenticated
    }

    fn message(&mut self, text: String) -> Action {
        if !self.is_authenticated() {
            tracing::info!(
                id = %self.id,
                user = %self.name,
                "message before authentication"
            );
            return self.fail();
        }
        Action::Broadcast {
            user: self.name.clone(),
            text,
        }
    }

    fn fail(&mut self) -> Action {
        self.state = AuthState::AuthFailed;
        Action::AuthenticationFailed
    }

    /// Builds the error a handler reports when this session fails.
    pub fn failure(&self) -> SessionError {
        SessionError::AuthenticationFailure {
            user: self.name.clone(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the authentication state machine.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn secret() -> SharedSecret {
        SharedSecret::new("pass")
    }

    fn session() -> Session {
        Session::new(ConnectionId::new(1))
    }

    fn request(user: &str) -> Command {
        Command::AuthRequest { user: user.into() }
    }

    fn attempt(user: &str, password: &str) -> Command {
        Command::AuthAttempt {
            user: user.into(),
            password: password.into(),
        }
    }

    fn message(text: &str) -> Command {
        Command::Message { text: text.into() }
    }

    /// A session that went through AUTH_REQUEST + a good AUTH_ATTEMPT.
    fn authenticated(user: &str) -> Session {
        let mut s = session();
        s.apply(request(user), &secret()).unwrap();
        s.apply(attempt(user, "pass"), &secret()).unwrap();
        assert!(s.is_authenticated());
        s
    }

    // =====================================================================
    // new()
    // =====================================================================

    #[test]
    fn test_new_session_is_unidentified() {
        let s = session();
        assert_eq!(s.state(), AuthState::Unidentified);
        assert_eq!(s.name(), "");
        assert!(!s.is_authenticated());
        assert!(!s.auth_failed());
    }

    // =====================================================================
    // AUTH_REQUEST
    // =====================================================================

    #[test]
    fn test_apply_auth_request_sets_name_and_identifies() {
        let mut s = session();

        let action = s.apply(request("alice"), &secret()).unwrap();

        assert_eq!(
            action,
            Action::Identified {
                user: "alice".into()
            }
        );
        assert_eq!(s.name(), "alice");
        assert_eq!(s.state(), AuthState::Identified);
        assert!(action.reply().is_none());
    }

    #[test]
    fn test_apply_auth_request_twice_renames() {
        let mut s = session();
        s.apply(request("alice"), &secret()).unwrap();

        s.apply(request("alicia"), &secret()).unwrap();

        assert_eq!(s.name(), "alicia");
        assert_eq!(s.state(), AuthState::Identified);
    }

    #[test]
    fn test_apply_auth_request_when_authenticated_is_ignored() {
        let mut s = authenticated("alice");

        let action = s.apply(request("mallory"), &secret()).unwrap();

        assert_eq!(action, Action::Ignored);
        assert_eq!(s.name(), "alice");
        assert!(s.is_authenticated());
    }

    // =====================================================================
    // AUTH_ATTEMPT
    // =====================================================================

    #[test]
    fn test_apply_auth_attempt_correct_secret_authenticates() {
        let mut s = session();
        s.apply(request("alice"), &secret()).unwrap();

        let action = s.apply(attempt("alice", "pass"), &secret()).unwrap();

        assert_eq!(action, Action::Authenticated);
        assert_eq!(action.reply(), Some(Reply::AuthPass));
        assert!(s.is_authenticated());
        assert!(!s.auth_failed());
    }

    #[test]
    fn test_apply_auth_attempt_wrong_secret_fails_terminally() {
        let mut s = session();
        s.apply(request("alice"), &secret()).unwrap();

        let action = s.apply(attempt("alice", "wrong"), &secret()).unwrap();

        assert_eq!(action, Action::AuthenticationFailed);
        assert_eq!(action.reply(), Some(Reply::AuthFailed));
        assert!(action.is_terminal());
        assert!(s.auth_failed());
        assert!(!s.is_authenticated());
    }

    #[test]
    fn test_apply_auth_attempt_before_request_fails() {
        let mut s = session();

        let action = s.apply(attempt("alice", "pass"), &secret()).unwrap();

        assert_eq!(action, Action::AuthenticationFailed);
        assert!(s.auth_failed());
    }

    #[test]
    fn test_apply_auth_attempt_uses_requested_name() {
        let mut s = session();
        s.apply(request("alice"), &secret()).unwrap();

        s.apply(attempt("bob", "pass"), &secret()).unwrap();

        assert!(s.is_authenticated());
        assert_eq!(s.name(), "alice");
    }

    #[test]
    fn test_apply_wrong_secret_after_authenticated_drops_authentication() {
        let mut s = authenticated("alice");

        s.apply(attempt("alice", "nope"), &secret()).unwrap();

        assert!(s.auth_failed());
        assert!(!s.is_authenticated());
    }

    // =====================================================================
    // MESSAGE
    // =====================================================================

    #[test]
    fn test_apply_message_when_authenticated_broadcasts() {
        let mut s = authenticated("alice");

        let action = s.apply(message("hello"), &secret()).unwrap();

        assert_eq!(
            action,
            Action::Broadcast {
                user: "alice".into(),
                text: "hello".into()
            }
        );
        assert!(!action.is_terminal());
    }

    #[test]
    fn test_apply_message_when_unidentified_fails() {
        let mut s = session();

        let action = s.apply(message("hi"), &secret()).unwrap();

        assert_eq!(action, Action::AuthenticationFailed);
        assert!(s.auth_failed());
    }

    #[test]
    fn test_apply_message_when_identified_only_fails() {
        let mut s = session();
        s.apply(request("alice"), &secret()).unwrap();

        let action = s.apply(message("hi"), &secret()).unwrap();

        assert_eq!(action, Action::AuthenticationFailed);
        assert!(s.auth_failed());
    }

    // =====================================================================
    // DISCONNECTION and terminal behavior
    // =====================================================================

    #[test]
    fn test_apply_disconnect_from_any_state_closes() {
        let mut fresh = session();
        let mut identified = session();
        identified.apply(request("bob"), &secret()).unwrap();
        let mut authed = authenticated("carol");

        for s in [&mut fresh, &mut identified, &mut authed] {
            let action = s.apply(Command::Disconnect, &secret()).unwrap();
            assert_eq!(action, Action::Disconnect);
            assert!(action.is_terminal());
        }
    }

    #[test]
    fn test_apply_after_failure_returns_terminated() {
        let mut s = session();
        s.apply(message("too early"), &secret()).unwrap();

        let result = s.apply(request("alice"), &secret());

        assert!(matches!(result, Err(SessionError::Terminated(_))));
    }

    #[test]
    fn test_failure_carries_user_name() {
        let mut s = session();
        s.apply(request("dave"), &secret()).unwrap();
        s.apply(attempt("dave", "bad"), &secret()).unwrap();

        let err = s.failure();

        assert!(matches!(
            err,
            SessionError::AuthenticationFailure { ref user } if user == "dave"
        ));
    }

    #[test]
    fn test_no_state_is_both_authenticated_and_failed() {
        let script = [
            request("a"),
            attempt("a", "pass"),
            message("x"),
            attempt("a", "bad"),
        ];
        let mut s = session();
        for cmd in script {
            let _ = s.apply(cmd, &secret());
            assert!(!(s.is_authenticated() && s.auth_failed()));
        }
    }
}
