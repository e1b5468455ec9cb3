//! Reactor configuration.
//!
//! Environment variables (all optional):
//! - `GVNET_POLL_TIMEOUT_MS`: upper bound on one readiness poll (default 100)
//! - `GVNET_INJECT_BATCH`: injected channels registered per iteration (default 256)
//! - `GVNET_IDLE_TIMEOUT_MS`: idle expiry for accepted connections (default off)

use std::time::Duration;

use gvnet_core::env::{env_get, env_get_millis, env_get_millis_opt};
use gvnet_core::ConfigError;

pub mod defaults {
    pub const POLL_TIMEOUT_MS: u64 = 100;
    pub const INJECT_BATCH: usize = 256;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactorConfig {
    /// Bounds each poll so the stop flag stays responsive.
    pub poll_timeout: Duration,
    /// Cap on injected channels taken per iteration.
    pub inject_batch: usize,
    /// Applications wrap accepted channels in `ExpiringChannel` with this.
    pub idle_timeout: Option<Duration>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ReactorConfig {
    pub fn from_env() -> Self {
        Self {
            poll_timeout: env_get_millis("GVNET_POLL_TIMEOUT_MS", defaults::POLL_TIMEOUT_MS),
            inject_batch: env_get("GVNET_INJECT_BATCH", defaults::INJECT_BATCH),
            idle_timeout: env_get_millis_opt("GVNET_IDLE_TIMEOUT_MS"),
        }
    }

    pub fn new() -> Self {
        Self {
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            inject_batch: defaults::INJECT_BATCH,
            idle_timeout: None,
        }
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn inject_batch(mut self, n: usize) -> Self {
        self.inject_batch = n;
        self
    }

    pub fn idle_timeout(mut self, d: Option<Duration>) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inject_batch == 0 {
            return Err(ConfigError::InvalidValue("inject_batch must be > 0"));
        }
        if self.poll_timeout.as_millis() > i32::MAX as u128 {
            return Err(ConfigError::InvalidValue("poll_timeout must fit in i32 milliseconds"));
        }
        if self.idle_timeout.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue("idle_timeout must be > 0 when set"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("gvnet reactor configuration:");
        eprintln!("  poll_timeout:  {:?}", self.poll_timeout);
        eprintln!("  inject_batch:  {}", self.inject_batch);
        eprintln!("  idle_timeout:  {:?}", self.idle_timeout);
    }
}
