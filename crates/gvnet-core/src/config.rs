//! Per-channel configuration.
//!
//! Library defaults, overridable from the environment:
//!
//! | Variable           | Field        | Default |
//! |--------------------|--------------|---------|
//! | `GVNET_READ_CHUNK` | `read_chunk` | 1024    |
//! | `GVNET_NODELAY`    | `nodelay`    | true    |
//!
//! ```ignore
//! let config = ChannelConfig::from_env().read_chunk(16 * 1024);
//! config.validate()?;
//! ```

use thiserror::Error;

use crate::env::{env_get, env_get_bool};

pub mod defaults {
    /// Bytes pulled from the transport per readable event.
    pub const READ_CHUNK: usize = 1024;
    /// Set `TCP_NODELAY` on connected TCP streams.
    pub const NODELAY: bool = true;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Receive size used by `on_read` and the blocking accumulator.
    pub read_chunk: usize,
    /// Disable Nagle on TCP streams this crate connects or accepts.
    pub nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ChannelConfig {
    /// Defaults with `GVNET_*` overrides applied.
    pub fn from_env() -> Self {
        Self {
            read_chunk: env_get("GVNET_READ_CHUNK", defaults::READ_CHUNK),
            nodelay: env_get_bool("GVNET_NODELAY", defaults::NODELAY),
        }
    }

    /// Library defaults, environment ignored.
    pub fn new() -> Self {
        Self {
            read_chunk: defaults::READ_CHUNK,
            nodelay: defaults::NODELAY,
        }
    }

    pub fn read_chunk(mut self, n: usize) -> Self {
        self.read_chunk = n;
        self
    }

    pub fn nodelay(mut self, enable: bool) -> Self {
        self.nodelay = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk == 0 {
            return Err(ConfigError::InvalidValue("read_chunk must be > 0"));
        }
        Ok(())
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ChannelConfig::new();
        assert_eq!(config.read_chunk, 1024);
        assert!(config.nodelay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = ChannelConfig::new().read_chunk(6).nodelay(false);
        assert_eq!(config.read_chunk, 6);
        assert!(!config.nodelay);

        let err = ChannelConfig::new().read_chunk(0).validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid config: read_chunk must be > 0");
    }
}
