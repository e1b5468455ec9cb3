//! Blocking mode of a channel.
//!
//! `settimeout(v)` semantics: `Some(0)` is non-blocking, `None` blocks
//! forever, `Some(d)` blocks for at most `d`.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Every operation returns immediately.
    NonBlocking,
    /// Block until the operation completes or the channel fails.
    Forever,
    /// Block for at most the given (non-zero) duration.
    After(Duration),
}

impl Timeout {
    /// Map a `settimeout`-style optional duration onto a mode.
    pub fn from_option(v: Option<Duration>) -> Self {
        match v {
            None => Timeout::Forever,
            Some(d) if d.is_zero() => Timeout::NonBlocking,
            Some(d) => Timeout::After(d),
        }
    }

    /// Inverse of [`Timeout::from_option`].
    pub fn as_option(&self) -> Option<Duration> {
        match self {
            Timeout::NonBlocking => Some(Duration::ZERO),
            Timeout::Forever => None,
            Timeout::After(d) => Some(*d),
        }
    }

    #[inline]
    pub fn is_blocking(&self) -> bool {
        !matches!(self.normalized(), Timeout::NonBlocking)
    }

    /// Deadline for a bounded wait starting at `now`.
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        match self.normalized() {
            Timeout::After(d) => Some(now + d),
            _ => None,
        }
    }

    /// `After(0)` behaves as `NonBlocking`.
    pub fn normalized(self) -> Self {
        match self {
            Timeout::After(d) if d.is_zero() => Timeout::NonBlocking,
            other => other,
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(v: Option<Duration>) -> Self {
        Timeout::from_option(v)
    }
}
