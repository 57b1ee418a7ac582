//! Core protocol types for Chatline's wire format.
//!
//! Inbound frames look like `<code> <arg1> <arg2> ...`. The numeric codes
//! are a fixed contract with every client ever written against the server,
//! so their values must never change.
//!
//! Inbound and outbound traffic use two separate enums. A client can never
//! send `Authentication passed`, and the server never sends `AUTH_ATTEMPT`,
//! so keeping them apart lets the compiler reject nonsense like encoding an
//! inbound command.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// CommandCode
// ---------------------------------------------------------------------------

/// The numeric code that leads every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandCode {
    /// `MESSAGE <free text>`
    Message = 0,
    /// `AUTH_REQUEST <user>`
    AuthRequest = 1,
    /// `AUTH_ATTEMPT <user> <password>`
    AuthAttempt = 2,
    /// `DISCONNECTION`
    Disconnection = 3,
}

impl CommandCode {
    /// Returns the wire value of this code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for CommandCode {
    type Error = ProtocolError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Message),
            1 => Ok(Self::AuthRequest),
            2 => Ok(Self::AuthAttempt),
            3 => Ok(Self::Disconnection),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Message => "MESSAGE",
            Self::AuthRequest => "AUTH_REQUEST",
            Self::AuthAttempt => "AUTH_ATTEMPT",
            Self::Disconnection => "DISCONNECTION",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Command (client → server)
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
///
/// A frame whose code is not listed here never becomes a `Command`; the
/// codec reports it as [`ProtocolError::UnknownCommand`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The client announces who it is.
    AuthRequest { user: String },

    /// The client proves it knows the shared secret.
    AuthAttempt { user: String, password: String },

    /// A chat line. The author is whoever the session authenticated as,
    /// so the frame itself carries only the text.
    Message { text: String },

    /// The client is leaving.
    Disconnect,
}

impl Command {
    /// Returns the wire code this command was decoded from.
    pub fn code(&self) -> CommandCode {
        match self {
            Self::AuthRequest { .. } => CommandCode::AuthRequest,
            Self::AuthAttempt { .. } => CommandCode::AuthAttempt,
            Self::Message { .. } => CommandCode::Message,
            Self::Disconnect => CommandCode::Disconnection,
        }
    }
}

// ---------------------------------------------------------------------------
// Reply (server → client)
// ---------------------------------------------------------------------------

/// An outbound line written by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `Authentication passed`
    AuthPass,
    /// `Authentication failed`
    AuthFailed,
    /// `<user>: <text>`, the broadcast form of a chat line.
    Message { user: String, text: String },
}

impl Reply {
    /// Builds a broadcast chat line.
    pub fn message(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            user: user.into(),
            text: text.into(),
        }
    }

    /// Appends the wire form of this reply (terminator included) to `dst`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidReply`] if a message field contains
    /// a line terminator, which would smuggle an extra frame to clients.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Self::AuthPass => dst.put_slice(b"Authentication passed\n"),
            Self::AuthFailed => dst.put_slice(b"Authentication failed\n"),
            Self::Message { user, text } => {
                if contains_terminator(user) || contains_terminator(text) {
                    return Err(ProtocolError::InvalidReply(
                        "message contains a line terminator".into(),
                    ));
                }
                dst.reserve(user.len() + text.len() + 3);
                dst.put_slice(user.as_bytes());
                dst.put_slice(b": ");
                dst.put_slice(text.as_bytes());
                dst.put_u8(b'\n');
            }
        }
        Ok(())
    }

    /// Encodes this reply into a standalone buffer.
    ///
    /// Broadcast encodes once and hands the same `Bytes` to every
    /// recipient; cloning `Bytes` is a reference-count bump.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }
}

fn contains_terminator(s: &str) -> bool {
    s.bytes().any(|b| b == b'\n' || b == b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_values_are_stable() {
        assert_eq!(CommandCode::Message.as_u32(), 0);
        assert_eq!(CommandCode::AuthRequest.as_u32(), 1);
        assert_eq!(CommandCode::AuthAttempt.as_u32(), 2);
        assert_eq!(CommandCode::Disconnection.as_u32(), 3);
    }

    #[test]
    fn test_command_code_try_from_unknown_returns_error() {
        let result = CommandCode::try_from(9);
        assert!(matches!(result, Err(ProtocolError::UnknownCommand(9))));
    }

    #[test]
    fn test_command_code_display_uses_protocol_names() {
        assert_eq!(CommandCode::AuthAttempt.to_string(), "AUTH_ATTEMPT");
        assert_eq!(CommandCode::Disconnection.to_string(), "DISCONNECTION");
    }

    #[test]
    fn test_command_code_matches_variant() {
        let cmd = Command::AuthRequest {
            user: "alice".into(),
        };
        assert_eq!(cmd.code(), CommandCode::AuthRequest);
        assert_eq!(Command::Disconnect.code(), CommandCode::Disconnection);
    }

    #[test]
    fn test_reply_auth_pass_wire_format() {
        let bytes = Reply::AuthPass.to_bytes().unwrap();
        assert_eq!(&bytes[..], b"Authentication passed\n");
    }

    #[test]
    fn test_reply_auth_failed_wire_format() {
        let bytes = Reply::AuthFailed.to_bytes().unwrap();
        assert_eq!(&bytes[..], b"Authentication failed\n");
    }

    #[test]
    fn test_reply_message_wire_format() {
        let bytes = Reply::message("alice", "hello there").to_bytes().unwrap();
        assert_eq!(&bytes[..], b"alice: hello there\n");
    }

    #[test]
    fn test_reply_message_with_newline_is_rejected() {
        let result = Reply::message("alice", "one\ntwo").to_bytes();
        assert!(matches!(result, Err(ProtocolError::InvalidReply(_))));
    }
}
