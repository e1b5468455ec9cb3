//! Reactor registration: the injection queue and the token a registered
//! channel carries.
//!
//! The reactor owns every registered channel. A channel only holds a
//! `RegistrationToken`, which points back at the reactor's injection queue
//! through a `Weak`, so dropping the reactor never leaks through a cycle.
//!
//! ```text
//!   foreign thread ── Injector::inject(ch) ──► InjectQueue (SegQueue, MPSC)
//!                                                  │  drained once per iteration
//!                                                  ▼
//!                                            Reactor thread
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use crossbeam_queue::SegQueue;
use log::trace;

use crate::channel::Channel;
use crate::timeout::Timeout;

/// Lock-free queue of channels waiting to be registered.
pub struct InjectQueue {
    queue: SegQueue<Box<dyn Channel>>,
}

impl InjectQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { queue: SegQueue::new() })
    }

    pub fn push(&self, channel: Box<dyn Channel>) {
        self.queue.push(channel);
    }

    pub fn pop(&self) -> Option<Box<dyn Channel>> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for InjectQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectQueue").field("len", &self.len()).finish()
    }
}

/// Cross-thread handle for handing channels to a running reactor.
///
/// This is the only reactor entry point that is safe to use from a thread
/// other than the one driving the loop.
#[derive(Clone, Debug)]
pub struct Injector {
    queue: Arc<InjectQueue>,
}

impl Injector {
    pub fn new(queue: Arc<InjectQueue>) -> Self {
        Self { queue }
    }

    /// Queue a channel; the reactor registers it on its next iteration.
    pub fn inject(&self, channel: Box<dyn Channel>) {
        trace!("inject {}", channel.name());
        self.queue.push(channel);
    }

    /// Number of channels not yet picked up.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Opaque, non-owning link from a channel to the reactor it belongs to.
#[derive(Clone, Debug)]
pub struct RegistrationToken {
    reactor_id: u64,
    queue: Weak<InjectQueue>,
}

impl RegistrationToken {
    pub fn new(reactor_id: u64, queue: &Arc<InjectQueue>) -> Self {
        Self {
            reactor_id,
            queue: Arc::downgrade(queue),
        }
    }

    pub fn reactor_id(&self) -> u64 {
        self.reactor_id
    }

    /// Re-enter the owning reactor's injection queue, if it still exists.
    pub fn injector(&self) -> Option<Injector> {
        self.queue.upgrade().map(Injector::new)
    }
}

/// Registration state stored in the channel: the token plus the blocking
/// mode to restore when the reactor lets go of it.
#[derive(Clone, Debug)]
pub struct Registration {
    token: RegistrationToken,
    prior: Timeout,
}

impl Registration {
    pub fn new(token: RegistrationToken, prior: Timeout) -> Self {
        Self { token, prior }
    }

    pub fn token(&self) -> &RegistrationToken {
        &self.token
    }

    pub fn prior(&self) -> Timeout {
        self.prior
    }
}
