//! Error types for the protocol layer.
//!
//! Each crate in Chatline defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in framing or parsing a line,
//! not in networking or authentication.

/// Errors that can occur while decoding frames or encoding replies.
///
/// Every decode error is *frame-local*: the codec has already dropped the
/// offending frame from its buffer, so the caller can log the error and
/// simply ask for the next frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame could not be parsed: non-numeric code, invalid UTF-8,
    /// or missing/surplus positional arguments.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// The leading code is numeric but names no known command.
    #[error("unknown command code {0}")]
    UnknownCommand(u32),

    /// A frame grew past the configured limit without a line terminator.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLong {
        /// The configured maximum frame length.
        limit: usize,
    },

    /// An outbound reply cannot be represented on the wire.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// I/O error surfaced through `tokio_util::codec`.
    ///
    /// The codec itself never produces this; the `Decoder`/`Encoder`
    /// traits require the conversion so the codec can sit under a
    /// `FramedRead`/`FramedWrite`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
