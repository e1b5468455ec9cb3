//! Channel error taxonomy.
//!
//! Four classes, and callers are expected to branch on them:
//!
//! | Variant             | Meaning                                   | Reactor reaction |
//! |---------------------|-------------------------------------------|------------------|
//! | `DataNotAvailable`  | transient: short read, timeout, EAGAIN    | none             |
//! | `Closed`            | peer EOF or explicit close                | evict + notify   |
//! | `UnderlyingFailure` | hard transport error                      | evict + notify   |
//! | `InvalidOperation`  | caller misuse                             | logged           |

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by every channel operation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Not enough data yet, or a blocking wait timed out. Retry later.
    #[error("data not available")]
    DataNotAvailable,

    /// The peer closed the stream or the channel was closed locally.
    #[error("channel closed")]
    Closed,

    /// Hard transport error. The channel is inactive afterwards.
    #[error("underlying failure: {0}")]
    UnderlyingFailure(#[source] io::Error),

    /// The operation is not legal in the channel's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

impl ChannelError {
    /// Build an `UnderlyingFailure` from a plain message.
    pub fn failure(msg: impl Into<String>) -> Self {
        ChannelError::UnderlyingFailure(io::Error::other(msg.into()))
    }

    /// Transient errors never tear a channel down.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::DataNotAvailable)
    }

    /// Closed or failed: the channel must be evicted.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::Closed | ChannelError::UnderlyingFailure(_)
        )
    }
}

impl From<ConfigError> for ChannelError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue(what) => ChannelError::InvalidOperation(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
