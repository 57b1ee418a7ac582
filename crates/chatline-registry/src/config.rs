//! Registry configuration.

use std::time::Duration;

/// Default bound on a single broadcast write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`Registry`](crate::Registry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long one recipient's write may take during a broadcast before
    /// it is abandoned. A stuck client costs at most this much; the other
    /// recipients are written concurrently and are not held up.
    pub write_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}
