//! The channel capability interface.
//!
//! Every transport variant (plain stream, listening socket, TLS stream,
//! expiring decorator) implements [`Channel`]. The reactor only ever sees
//! `Box<dyn Channel>`.
//!
//! Shared state lives in [`ChannelCore`]: the two byte FIFOs, the active
//! flag, the blocking mode and the reactor registration. Implementors expose
//! it through `core()`/`core_mut()` and supply one primitive,
//! `apply_timeout`, that pushes a mode down to the OS handle. Mode changes,
//! registration and unregistration are provided on top of those.
//!
//! ## Read rules
//!
//! | mode            | `count` buffered | short, active                 | short, inactive         |
//! |-----------------|------------------|-------------------------------|-------------------------|
//! | non-blocking    | bytes            | `less_allowed` ? short : DNA  | residual or `Closed`    |
//! | blocking        | bytes            | wait (bounded by timeout)     | residual or `Closed`    |
//!
//! "residual" means the remaining buffered bytes, only with `less_allowed`
//! and only while at least one byte is left.

use std::os::unix::io::RawFd;
use std::time::Instant;

use crate::buffer::ByteFifo;
use crate::error::{ChannelError, Result};
use crate::registry::{Registration, RegistrationToken};
use crate::timeout::Timeout;

/// Flags for [`Channel::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOpts {
    /// Return fewer than `count` bytes instead of failing or waiting.
    pub less_allowed: bool,
    /// Return the bytes without consuming them.
    pub peek: bool,
}

impl ReadOpts {
    /// Exactly `count` bytes, consumed.
    pub const fn exact() -> Self {
        Self { less_allowed: false, peek: false }
    }

    /// Up to `count` bytes, consumed.
    pub const fn up_to() -> Self {
        Self { less_allowed: true, peek: false }
    }

    pub const fn peeking(mut self) -> Self {
        self.peek = true;
        self
    }
}

/// A connection produced by a listening channel.
pub struct Accepted {
    pub channel: Box<dyn Channel>,
    pub peer: String,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("channel", &self.channel.name())
            .field("peer", &self.peer)
            .finish()
    }
}

/// Buffers and flags shared by every channel implementation.
#[derive(Debug)]
pub struct ChannelCore {
    tx: ByteFifo,
    rx: ByteFifo,
    active: bool,
    timeout: Timeout,
    registration: Option<Registration>,
    label: String,
}

impl ChannelCore {
    pub fn new(timeout: Timeout, label: impl Into<String>) -> Self {
        Self {
            tx: ByteFifo::new(),
            rx: ByteFifo::new(),
            active: true,
            timeout,
            registration: None,
            label: label.into(),
        }
    }

    #[inline]
    pub fn tx(&self) -> &ByteFifo {
        &self.tx
    }

    #[inline]
    pub fn tx_mut(&mut self) -> &mut ByteFifo {
        &mut self.tx
    }

    #[inline]
    pub fn rx(&self) -> &ByteFifo {
        &self.rx
    }

    #[inline]
    pub fn rx_mut(&mut self) -> &mut ByteFifo {
        &mut self.rx
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One-way transition: no new data arrives after this.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// `Closed` once the channel went inactive.
    pub fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    #[inline]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Record a mode. Does not touch the transport.
    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout.normalized();
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// Store the token and switch the recorded mode to non-blocking.
    pub fn register(&mut self, token: RegistrationToken, prior: Timeout) {
        self.registration = Some(Registration::new(token, prior));
        self.timeout = Timeout::NonBlocking;
    }

    pub fn unregister(&mut self) -> Option<Registration> {
        self.registration.take()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Serve a read from the rx buffer without touching the transport.
    pub fn take_rx(&mut self, count: usize, opts: ReadOpts) -> Result<Vec<u8>> {
        let available = self.rx.len();
        if available >= count {
            return Ok(self.drain_rx(count, opts.peek));
        }
        if !self.active {
            if opts.less_allowed && available > 0 {
                return Ok(self.drain_rx(available, opts.peek));
            }
            return Err(ChannelError::Closed);
        }
        if opts.less_allowed {
            return Ok(self.drain_rx(available, opts.peek));
        }
        Err(ChannelError::DataNotAvailable)
    }

    fn drain_rx(&mut self, n: usize, peek: bool) -> Vec<u8> {
        if peek {
            self.rx.peek(n)
        } else {
            self.rx.take(n)
        }
    }
}

/// Capability interface the reactor drives.
///
/// `read`/`write` are the application-facing operations. `on_read`/
/// `on_write` are the readiness callbacks, only meaningful in non-blocking
/// mode. Listening channels answer `accept_channel` and reject byte I/O.
pub trait Channel: Send {
    fn core(&self) -> &ChannelCore;

    fn core_mut(&mut self) -> &mut ChannelCore;

    /// Push a blocking mode down to the OS handle.
    fn apply_timeout(&mut self, timeout: Timeout) -> Result<()>;

    /// Descriptor for readiness polling. Fails once the channel is closed.
    fn fd(&self) -> Result<RawFd>;

    /// Read `count` bytes according to the channel's mode and `opts`.
    fn read(&mut self, count: usize, opts: ReadOpts) -> Result<Vec<u8>>;

    /// Queue (non-blocking) or send (blocking) `data`.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Readable callback: pull a chunk from the transport into rx.
    fn on_read(&mut self) -> Result<()>;

    /// Writable callback: flush as much of tx as the transport accepts.
    fn on_write(&mut self) -> Result<()>;

    /// Mark inactive and release the transport. Idempotent.
    fn close(&mut self);

    /// True while there is output waiting for the transport.
    fn is_write_pending(&self) -> bool;

    fn accept_channel(&mut self) -> Result<Accepted> {
        Err(ChannelError::InvalidOperation("accept on a stream channel"))
    }

    fn is_listening(&self) -> bool {
        false
    }

    fn has_expired(&self, _now: Instant) -> bool {
        false
    }

    fn name(&self) -> &str {
        self.core().label()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn timeout(&self) -> Timeout {
        self.core().timeout()
    }

    /// Bytes waiting in the rx buffer.
    fn buffered(&self) -> usize {
        self.core().rx().len()
    }

    fn is_registered(&self) -> bool {
        self.core().is_registered()
    }

    fn registration(&self) -> Option<&RegistrationToken> {
        self.core().registration().map(Registration::token)
    }

    /// `settimeout`: illegal while a reactor owns the channel.
    fn set_timeout(&mut self, timeout: Timeout) -> Result<()> {
        if self.core().is_registered() {
            return Err(ChannelError::InvalidOperation(
                "timeout change on a reactor-registered channel",
            ));
        }
        let timeout = timeout.normalized();
        self.apply_timeout(timeout)?;
        self.core_mut().set_timeout(timeout);
        Ok(())
    }

    /// Hand the channel to a reactor: remember the mode, force non-blocking.
    fn attach(&mut self, token: RegistrationToken) -> Result<()> {
        if self.core().is_registered() {
            return Err(ChannelError::InvalidOperation(
                "channel already registered with a reactor",
            ));
        }
        let prior = self.core().timeout();
        self.apply_timeout(Timeout::NonBlocking)?;
        self.core_mut().register(token, prior);
        Ok(())
    }

    /// Release the channel from its reactor and restore the prior mode.
    fn detach(&mut self) -> Result<()> {
        let Some(registration) = self.core_mut().unregister() else {
            return Ok(());
        };
        let prior = registration.prior();
        self.core_mut().set_timeout(prior);
        if self.core().is_active() {
            self.apply_timeout(prior)?;
        }
        Ok(())
    }
}

/// Lets decorators wrap an already-boxed channel, e.g. the one handed out by
/// `accept_channel`.
impl<C: Channel + ?Sized> Channel for Box<C> {
    fn core(&self) -> &ChannelCore {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        (**self).core_mut()
    }

    fn apply_timeout(&mut self, timeout: Timeout) -> Result<()> {
        (**self).apply_timeout(timeout)
    }

    fn fd(&self) -> Result<RawFd> {
        (**self).fd()
    }

    fn read(&mut self, count: usize, opts: ReadOpts) -> Result<Vec<u8>> {
        (**self).read(count, opts)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn on_read(&mut self) -> Result<()> {
        (**self).on_read()
    }

    fn on_write(&mut self) -> Result<()> {
        (**self).on_write()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_write_pending(&self) -> bool {
        (**self).is_write_pending()
    }

    fn accept_channel(&mut self) -> Result<Accepted> {
        (**self).accept_channel()
    }

    fn is_listening(&self) -> bool {
        (**self).is_listening()
    }

    fn has_expired(&self, now: Instant) -> bool {
        (**self).has_expired(now)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_timeout(&mut self, timeout: Timeout) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn attach(&mut self, token: RegistrationToken) -> Result<()> {
        (**self).attach(token)
    }

    fn detach(&mut self) -> Result<()> {
        (**self).detach()
    }
}
