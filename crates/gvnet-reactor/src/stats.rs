//! Reactor counters.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorStats {
    pub iterations: u64,
    /// Client channels registered when the current iteration began.
    pub channels: u64,
    /// Connections produced by listening channels.
    pub accepted: u64,
    /// Accepted connections the `on_accept` hook declined.
    pub discarded: u64,
    /// Channels removed because they closed, failed, expired or broke the poll.
    pub evicted: u64,
    /// Subset of `evicted` removed for idleness.
    pub expired: u64,
    pub poll_failures: u64,
    /// Channels taken from the injection queue.
    pub injected: u64,
}

impl fmt::Display for ReactorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iter={} channels={} accepted={} discarded={} evicted={} expired={} poll_fail={} injected={}",
            self.iterations,
            self.channels,
            self.accepted,
            self.discarded,
            self.evicted,
            self.expired,
            self.poll_failures,
            self.injected,
        )
    }
}
