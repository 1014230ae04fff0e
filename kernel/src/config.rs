// Ring Configuration
//
// Capacity of the command log and settings for the socket front end.
// Loaded from JSON; every field falls back to its default when absent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::log::DEFAULT_CAPACITY;

pub const DEFAULT_PORT: u16 = 9000;

/// Receive chunk size for one connection.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 30_000;

/// Largest accepted log capacity (number of commands).
pub const MAX_CAPACITY: usize = 1 << 20;

/// Largest accepted receive chunk, allocated once per connection.
pub const MAX_RECV_BUFFER_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Number of commands retained before the oldest is evicted.
    pub capacity: usize,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub recv_buffer_size: usize,

    /// Keep bytes that follow a terminator for the next command instead of
    /// dropping the rest of the chunk.
    pub carry_over_remainder: bool,

    /// Append a `timestamp:` command at this interval when set.
    pub timestamp_interval_secs: Option<u64>,
}

impl RingConfig {
    /// Built-in configuration (used if no config file is provided).
    pub fn default_config() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            server: ServerConfig::default(),
        }
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "capacity must be at most {MAX_CAPACITY}"
            )));
        }
        if self.server.recv_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "server.recv_buffer_size must be at least 1".into(),
            ));
        }
        if self.server.recv_buffer_size > MAX_RECV_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "server.recv_buffer_size must be at most {MAX_RECV_BUFFER_SIZE}"
            )));
        }
        if self.server.timestamp_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "server.timestamp_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            carry_over_remainder: true,
            timestamp_interval_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_system() {
        let config = RingConfig::default_config();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.server.socket_addr(), "0.0.0.0:9000");
        assert_eq!(config.server.recv_buffer_size, 30_000);
        assert!(config.server.carry_over_remainder);
        assert_eq!(config.server.timestamp_interval_secs, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RingConfig::from_json(
            r#"{ "capacity": 3, "server": { "port": 9100, "carry_over_remainder": false } }"#,
        )
        .unwrap();

        assert_eq!(config.capacity, 3);
        assert_eq!(config.server.port, 9100);
        assert!(!config.server.carry_over_remainder);
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = RingConfig::from_json(r#"{ "capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_allocations_are_invalid() {
        let huge = usize::MAX;
        let err = RingConfig::from_json(&format!(r#"{{ "capacity": {huge} }}"#)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RingConfig::from_json(&format!(
            r#"{{ "server": {{ "recv_buffer_size": {huge} }} }}"#
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = RingConfig::default_config();
        config.capacity = MAX_CAPACITY;
        config.server.recv_buffer_size = MAX_RECV_BUFFER_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "server": {{ "timestamp_interval_secs": 10 }} }}"#).unwrap();

        let config = RingConfig::load(file.path()).unwrap();
        assert_eq!(config.server.timestamp_interval_secs, Some(10));
        assert_eq!(config.capacity, 10);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RingConfig::from_json("{ capacity: }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
