//! The line codec: turns a byte stream into [`Command`]s and [`Reply`]s
//! into bytes.
//!
//! ## Framing
//!
//! A transport read is just "some bytes". It may hold half a frame, one
//! frame, or a dozen, so the codec never treats one read as one frame.
//! Instead the caller appends every chunk to a `BytesMut` buffer and keeps
//! calling [`Decoder::decode`] until it returns `Ok(None)` ("need more
//! bytes"). Frames end at `\n`; a `\r` right before it is stripped, so both
//! CRLF and bare LF clients work.
//!
//! ## Error recovery
//!
//! A bad frame is removed from the buffer *before* it is parsed. Whatever
//! the parse result, the buffer is left at the next frame boundary, so the
//! caller can log the error and call `decode` again.
//!
//! A client that never sends a terminator would make the buffer grow
//! forever. Past `max_frame_len` bytes the codec reports
//! [`ProtocolError::FrameTooLong`] once, then throws input away until the
//! next `\n` and resumes normal decoding after it.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{Command, CommandCode, ProtocolError, Reply};

/// Default upper bound for a single frame, terminator excluded.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Decoder for inbound [`Command`]s and encoder for outbound [`Reply`]s.
///
/// One codec instance belongs to one connection: it carries per-stream
/// state (scan offset and discard mode) between calls.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    max_frame_len: usize,
    /// Bytes of the buffer already scanned without finding `\n`.
    next_index: usize,
    /// Set after an overlong frame; cleared at the next terminator.
    discarding: bool,
}

impl CommandCodec {
    /// Creates a codec with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a codec that rejects frames longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            next_index: 0,
            discarding: false,
        }
    }

    /// Returns the configured frame limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Command>, ProtocolError> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(pos)) => {
                    // End of the overlong frame: drop it and resume.
                    buf.advance(pos + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(pos)) => {
                    self.next_index = 0;
                    let frame = buf.split_to(pos + 1);
                    let line = strip_terminator(&frame);
                    if line.len() > self.max_frame_len {
                        return Err(ProtocolError::FrameTooLong {
                            limit: self.max_frame_len,
                        });
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return parse_frame(line).map(Some);
                }
                (false, None) => {
                    // A full-length line may still be waiting for its LF
                    // after the CR.
                    let pending = match buf.last() {
                        Some(b'\r') => buf.len() - 1,
                        _ => buf.len(),
                    };
                    if pending > self.max_frame_len {
                        buf.clear();
                        self.next_index = 0;
                        self.discarding = true;
                        return Err(ProtocolError::FrameTooLong {
                            limit: self.max_frame_len,
                        });
                    }
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    /// Called once the stream has ended. A trailing frame without a
    /// terminator is still decoded, so `printf '3'` disconnects cleanly.
    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Command>, ProtocolError> {
        if let Some(command) = self.decode(buf)? {
            return Ok(Some(command));
        }
        self.next_index = 0;
        if self.discarding || buf.is_empty() {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        let frame = buf.split();
        let line = strip_terminator(&frame);
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        parse_frame(line).map(Some)
    }
}

impl Encoder<&Reply> for CommandCodec {
    type Error = ProtocolError;

    fn encode(
        &mut self,
        reply: &Reply,
        dst: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        reply.write_to(dst)
    }
}

/// Removes a trailing `\n` and, if present, the `\r` before it.
fn strip_terminator(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

/// Parses one frame with its terminator already removed.
fn parse_frame(line: &[u8]) -> Result<Command, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| {
        ProtocolError::Malformed("frame is not valid UTF-8".into())
    })?;
    let text = text.trim_start();

    let (code_token, rest) = text.split_once(' ').unwrap_or((text, ""));
    let code: u32 = code_token.parse().map_err(|_| {
        ProtocolError::Malformed(format!(
            "command code {code_token:?} is not numeric"
        ))
    })?;

    match CommandCode::try_from(code)? {
        CommandCode::Message => {
            // Free text is kept verbatim, inner spacing included.
            if rest.is_empty() {
                return Err(ProtocolError::Malformed(
                    "MESSAGE requires text".into(),
                ));
            }
            Ok(Command::Message {
                text: rest.to_owned(),
            })
        }
        CommandCode::AuthRequest => match arguments(rest).as_slice() {
            [user] => Ok(Command::AuthRequest {
                user: (*user).to_owned(),
            }),
            args => Err(wrong_arity(CommandCode::AuthRequest, 1, args.len())),
        },
        CommandCode::AuthAttempt => match arguments(rest).as_slice() {
            [user, password] => Ok(Command::AuthAttempt {
                user: (*user).to_owned(),
                password: (*password).to_owned(),
            }),
            args => Err(wrong_arity(CommandCode::AuthAttempt, 2, args.len())),
        },
        CommandCode::Disconnection => Ok(Command::Disconnect),
    }
}

fn arguments(rest: &str) -> Vec<&str> {
    rest.split_whitespace().collect()
}

fn wrong_arity(code: CommandCode, expected: usize, got: usize) -> ProtocolError {
    ProtocolError::Malformed(format!(
        "{code} expects {expected} argument(s), got {got}"
    ))
}
