//! Server configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chatline_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Settings for a [`ChatServer`](crate::ChatServer).
///
/// Every field has a default, so a config file only needs the fields it
/// changes:
///
/// ```json
/// { "bind_addr": "0.0.0.0:3333", "shared_secret": "s3cret" }
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// The password every client must send in `AUTH_ATTEMPT`.
    pub shared_secret: String,

    /// Whether the author of a chat line receives its own broadcast.
    pub echo_to_sender: bool,

    /// Upper bound on one recipient's write during a broadcast.
    pub write_timeout_ms: u64,

    /// Longest accepted frame, terminator excluded.
    pub max_frame_len: usize,

    /// Consecutive read errors after which a connection is dropped.
    pub max_read_errors: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3333".to_string(),
            shared_secret: "pass".to_string(),
            echo_to_sender: true,
            write_timeout_ms: 5_000,
            max_frame_len: chatline_protocol::DEFAULT_MAX_FRAME_LEN,
            max_read_errors: 3,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read {
                path: path.display().to_string(),
                source,
            }
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_secret.is_empty() {
            return Err(ConfigError::Invalid {
                field: "shared_secret",
                reason: "must not be empty".into(),
            });
        }
        if self.shared_secret.chars().any(char::is_whitespace) {
            // AUTH_ATTEMPT splits on whitespace, so such a secret could
            // never be sent.
            return Err(ConfigError::Invalid {
                field: "shared_secret",
                reason: "must not contain whitespace".into(),
            });
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid {
                field: "max_frame_len",
                reason: "must be positive".into(),
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        if self.max_read_errors == 0 {
            return Err(ConfigError::Invalid {
                field: "max_read_errors",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub(crate) fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            write_timeout: self.write_timeout(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("shared_secret", &"***")
            .field("echo_to_sender", &self.echo_to_sender)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("max_frame_len", &self.max_frame_len)
            .field("max_read_errors", &self.max_read_errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shared_secret, "pass");
        assert!(config.echo_to_sender);
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_str_partial_document_fills_defaults() {
        let config = ServerConfig::from_json_str(
            r#"{ "bind_addr": "0.0.0.0:4000", "echo_to_sender": false }"#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:4000");
        assert!(!config.echo_to_sender);
        assert_eq!(config.shared_secret, "pass");
        assert_eq!(config.max_frame_len, 4096);
    }

    #[test]
    fn test_from_json_str_malformed_returns_parse_error() {
        let result = ServerConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_json_str_secret_with_space_is_invalid() {
        let result =
            ServerConfig::from_json_str(r#"{ "shared_secret": "two words" }"#);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "shared_secret",
                ..
            })
        ));
    }

    #[test]
    fn test_from_json_str_zero_frame_len_is_invalid() {
        let result = ServerConfig::from_json_str(r#"{ "max_frame_len": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_missing_file_returns_read_error() {
        let result = ServerConfig::load("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig {
            shared_secret: "hunter2".into(),
            ..ServerConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
