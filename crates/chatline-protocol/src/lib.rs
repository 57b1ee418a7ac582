//! Wire protocol for Chatline.
//!
//! This crate defines the "language" that chat clients and the server speak:
//!
//! - **Types** ([`Command`], [`Reply`], [`CommandCode`]): what travels on
//!   the wire, inbound and outbound.
//! - **Codec** ([`CommandCodec`]): incremental line framing plus parsing,
//!   exposed through `tokio_util`'s `Decoder`/`Encoder` traits.
//! - **Errors** ([`ProtocolError`]): what can go wrong in a single frame.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (authentication state). It doesn't know about connections or other
//! clients; it only turns bytes into commands and replies into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Command) → Session (auth state machine)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{CommandCodec, DEFAULT_MAX_FRAME_LEN};
pub use error::ProtocolError;
pub use types::{Command, CommandCode, Reply};

// Callers drive the codec through these traits.
pub use tokio_util::codec::{Decoder, Encoder};
