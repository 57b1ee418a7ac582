//! Per-connection session state for Chatline.
//!
//! This crate handles the lifecycle of one client's identity:
//!
//! 1. **Identification**: `AUTH_REQUEST` names the client
//! 2. **Authentication**: `AUTH_ATTEMPT` proves the [`SharedSecret`]
//! 3. **Gating**: chat is only accepted from authenticated sessions
//!
//! # How it fits in the stack
//!
//! ```text
//! Registry (above)  ← knows every connected client, broadcasts
//!     ↕
//! Session (this crate)  ← one client's auth state machine
//!     ↕
//! Protocol (below)  ← provides Command and Reply
//! ```

mod auth;
mod error;
mod session;

pub use auth::SharedSecret;
pub use error::SessionError;
pub use session::{Action, AuthState, Session};
