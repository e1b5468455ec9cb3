//! Idle-expiry decorator.
//!
//! Wraps any channel and records when `on_read` last succeeded. The reactor
//! asks `has_expired` once per iteration, before polling, and closes the
//! channel when it reports true.

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use gvnet_core::{Accepted, Channel, ChannelCore, ReadOpts, Result, Timeout};

pub struct ExpiringChannel<C> {
    inner: C,
    last_activity: Instant,
    expiration: Duration,
}

impl<C: Channel> ExpiringChannel<C> {
    /// The idle clock starts now.
    pub fn new(inner: C, expiration: Duration) -> Self {
        Self {
            inner,
            last_activity: Instant::now(),
            expiration,
        }
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Reset the idle clock without reading.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Channel> Channel for ExpiringChannel<C> {
    fn core(&self) -> &ChannelCore {
        self.inner.core()
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        self.inner.core_mut()
    }

    fn apply_timeout(&mut self, timeout: Timeout) -> Result<()> {
        self.inner.apply_timeout(timeout)
    }

    fn fd(&self) -> Result<RawFd> {
        self.inner.fd()
    }

    fn read(&mut self, count: usize, opts: ReadOpts) -> Result<Vec<u8>> {
        self.inner.read(count, opts)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    fn on_read(&mut self) -> Result<()> {
        self.inner.on_read()?;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn on_write(&mut self) -> Result<()> {
        self.inner.on_write()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn is_write_pending(&self) -> bool {
        self.inner.is_write_pending()
    }

    fn accept_channel(&mut self) -> Result<Accepted> {
        self.inner.accept_channel()
    }

    fn is_listening(&self) -> bool {
        self.inner.is_listening()
    }

    fn has_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > self.expiration
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
