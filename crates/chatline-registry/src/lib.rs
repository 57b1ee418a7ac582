//! Client registry and broadcast for Chatline.
//!
//! Every accepted connection is a member of one shared [`Registry`] from
//! accept until it is removed. The registry owns the only lock in the
//! server and is the only place where one connection's task touches
//! another connection.
//!
//! # Key types
//!
//! - [`Registry`]: add / identify / remove members, log messages,
//!   snapshot-then-write broadcast
//! - [`BroadcastReport`]: who got a broadcast and who did not
//! - [`RegistryConfig`]: per-write timeout for broadcasts

mod config;
mod error;
mod registry;

pub use config::{DEFAULT_WRITE_TIMEOUT, RegistryConfig};
pub use error::RegistryError;
pub use registry::{BroadcastReport, MemberInfo, Registry};
