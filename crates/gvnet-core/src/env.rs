//! Environment overrides for `GVNET_*` settings.
//!
//! ```ignore
//! use gvnet_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let chunk: usize = env_get("GVNET_READ_CHUNK", 1024);
//! let nodelay = env_get_bool("GVNET_NODELAY", true);
//! let poll = env_get_millis("GVNET_POLL_TIMEOUT_MS", 100);
//! ```
//!
//! Unset or unparsable values fall back to the default; a typo in the
//! environment never aborts startup.

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `Some(T)` only when `key` is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag. "1", "true", "yes", "on" (any case) are true, anything
/// else that is set is false.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Millisecond duration.
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Optional millisecond duration; unset means "disabled".
#[inline]
pub fn env_get_millis_opt(key: &str) -> Option<Duration> {
    env_get_opt::<u64>(key).map(Duration::from_millis)
}
