//! Shared-secret credential check.
//!
//! Chatline has exactly one credential: a password every client must
//! know. There is no user database, so any name may authenticate as long
//! as the password matches.

use std::fmt;

/// The password clients must present in `AUTH_ATTEMPT`.
///
/// `Debug` is redacted so the secret never ends up in a log line through
/// a stray `?config`.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wraps the configured password.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Checks a candidate password.
    ///
    /// The comparison touches every byte of equal-length inputs, so the
    /// time taken does not reveal how long the matching prefix was.
    pub fn verify(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}
