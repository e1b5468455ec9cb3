//! Application callbacks.
//!
//! Every hook has a no-op default, so an application overrides only the
//! events it cares about. Hooks run on the reactor thread, inside the
//! iteration that produced the event.

use gvnet_core::{Accepted, Channel};

use crate::reactor::ChannelId;
use crate::stats::ReactorStats;

/// Why a channel left the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer EOF or a local `close`.
    Closed,
    /// Hard transport failure.
    Failed,
    /// Idle longer than its expiration interval.
    Expired,
    /// Blamed for a failed readiness poll.
    PollFailure,
    /// Reactor shutdown.
    Shutdown,
}

pub trait ReactorHooks {
    /// A listening channel produced a connection. Return `None` to drop it.
    fn on_accept(&mut self, _listener: ChannelId, accepted: Accepted) -> Option<Box<dyn Channel>> {
        Some(accepted.channel)
    }

    /// `on_read` pulled new data into the channel's rx buffer.
    fn on_readable(&mut self, _id: ChannelId, _channel: &mut dyn Channel) {}

    /// `on_write` flushed (some of) the channel's tx buffer.
    fn on_writable(&mut self, _id: ChannelId, _channel: &mut dyn Channel) {}

    /// The channel was evicted and closed. Residual rx bytes are still
    /// readable here.
    fn on_closed(&mut self, _id: ChannelId, _channel: &mut dyn Channel, _reason: CloseReason) {}

    /// Start of every iteration.
    fn on_tick(&mut self, _stats: &ReactorStats) {}

    fn on_startup(&mut self) {}

    fn on_cleanup(&mut self) {}
}

/// Accept everything, observe nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ReactorHooks for NoHooks {}
