//! # Reactor — single-threaded readiness dispatcher
//!
//! One thread owns every registered channel and drives them through a fixed
//! iteration:
//!
//! ```text
//!   on_tick ─► expire idle ─► drain injection queue ─► build poll set
//!                                                          │
//!        ┌──────────── poll(timeout) ◄─────────────────────┘
//!        │
//!        ├─ EINTR / timeout ──────────────► done
//!        ├─ failure / POLLNVAL ─► probe, evict one ─► done
//!        └─ ready ─► writes (in order) ─► reads / accepts (in order) ─► done
//! ```
//!
//! Within an iteration every write is dispatched before any read, and
//! channels are visited in registration order. A fatal error from a channel
//! evicts it and ends the current dispatch phase.
//!
//! The only cross-thread entry points are [`Injector::inject`] and
//! [`StopHandle::stop`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use gvnet_core::{Channel, ChannelError, InjectQueue, Injector, RegistrationToken};
use log::{debug, error, trace, warn};
use nix::errno::Errno;

use crate::config::ReactorConfig;
use crate::error::{ReactorError, Result};
use crate::hooks::{CloseReason, NoHooks, ReactorHooks};
use crate::poller::{self, PollSet};
use crate::stats::ReactorStats;

static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Reactor-local channel identifier, stable for the channel's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cross-thread termination flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

struct Entry {
    id: ChannelId,
    channel: Box<dyn Channel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Listener,
    Client,
}

/// Poll-set entry `k` maps to this channel.
#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: Kind,
    index: usize,
    id: ChannelId,
}

pub struct Reactor<H = NoHooks> {
    id: u64,
    config: ReactorConfig,
    hooks: H,
    listeners: Vec<Entry>,
    channels: Vec<Entry>,
    inject: Arc<InjectQueue>,
    stop: StopHandle,
    pollset: PollSet,
    slots: Vec<Slot>,
    next_id: u64,
    stats: ReactorStats,
}

impl Reactor<NoHooks> {
    pub fn new(config: ReactorConfig) -> Result<Self> {
        Self::with_hooks(config, NoHooks)
    }
}

impl<H: ReactorHooks> Reactor<H> {
    pub fn with_hooks(config: ReactorConfig, hooks: H) -> Result<Self> {
        config.validate()?;
        let id = NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed);
        debug!("reactor {} created: {:?}", id, config);
        Ok(Self {
            id,
            config,
            hooks,
            listeners: Vec::new(),
            channels: Vec::new(),
            inject: InjectQueue::new(),
            stop: StopHandle::default(),
            pollset: PollSet::new(),
            slots: Vec::new(),
            next_id: 1,
            stats: ReactorStats::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn stats(&self) -> &ReactorStats {
        &self.stats
    }

    /// Registered client channels (listeners excluded).
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.find(id).is_some()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&dyn Channel> {
        let (kind, i) = self.find(id)?;
        Some(self.entries(kind)[i].channel.as_ref())
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut dyn Channel> {
        let (kind, i) = self.find(id)?;
        let channel: &mut dyn Channel = self.entries_mut(kind)[i].channel.as_mut();
        Some(channel)
    }

    /// Handle for handing channels over from other threads.
    pub fn injector(&self) -> Injector {
        Injector::new(Arc::clone(&self.inject))
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Take ownership of a client channel and switch it to non-blocking.
    /// Listening channels are routed to [`Reactor::listen`].
    pub fn register(&mut self, channel: Box<dyn Channel>) -> Result<ChannelId> {
        if channel.is_listening() {
            return self.listen(channel);
        }
        let entry = self.attach(channel)?;
        let id = entry.id;
        debug!("reactor {}: registered {} {}", self.id, id, entry.channel.name());
        self.channels.push(entry);
        Ok(id)
    }

    /// Register a listening channel. Its readable events become accepts.
    pub fn listen(&mut self, channel: Box<dyn Channel>) -> Result<ChannelId> {
        if !channel.is_listening() {
            return Err(ChannelError::InvalidOperation("listen with a non-listening channel").into());
        }
        let entry = self.attach(channel)?;
        let id = entry.id;
        debug!("reactor {}: listening on {} {}", self.id, id, entry.channel.name());
        self.listeners.push(entry);
        Ok(id)
    }

    /// Remove a channel without closing it and restore its prior blocking
    /// mode.
    pub fn unregister(&mut self, id: ChannelId) -> Result<Box<dyn Channel>> {
        let (kind, i) = self.find(id).ok_or(ReactorError::UnknownChannel(id))?;
        let mut entry = self.entries_mut(kind).remove(i);
        if let Err(e) = entry.channel.detach() {
            warn!("reactor {}: restoring mode of {}: {}", self.id, id, e);
        }
        debug!("reactor {}: unregistered {} {}", self.id, id, entry.channel.name());
        Ok(entry.channel)
    }

    /// Release every listening channel back to the caller.
    pub fn take_listeners(&mut self) -> Vec<Box<dyn Channel>> {
        let mut out = Vec::with_capacity(self.listeners.len());
        for mut entry in self.listeners.drain(..) {
            if let Err(e) = entry.channel.detach() {
                warn!("reactor {}: detaching listener {}: {}", self.id, entry.id, e);
            }
            out.push(entry.channel);
        }
        out
    }

    /// Run until the stop handle fires, then close every client channel.
    /// Listening channels stay registered for the caller to take.
    pub fn run(&mut self) {
        debug!("reactor {} starting", self.id);
        self.hooks.on_startup();
        while !self.stop.is_stopped() {
            if let Err(e) = self.run_once() {
                error!("reactor {}: {}", self.id, e);
                thread::sleep(self.config.poll_timeout);
            }
        }
        self.shutdown();
        self.hooks.on_cleanup();
        debug!("reactor {} stopped: {}", self.id, self.stats);
    }

    /// One iteration. Returns the number of callbacks dispatched.
    pub fn run_once(&mut self) -> Result<usize> {
        self.stats.iterations += 1;
        self.stats.channels = self.channels.len() as u64;
        self.hooks.on_tick(&self.stats);

        self.expire(Instant::now());
        self.drain_injected();
        self.build_pollset();

        let ready = match self.pollset.wait(self.config.poll_timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => return Ok(0),
            Err(e) => return self.recover(e),
        };
        if ready == 0 {
            return Ok(0);
        }
        if self.pollset.any_invalid() {
            return self.recover(Errno::EBADF);
        }
        trace!("reactor {}: {} descriptors ready", self.id, ready);

        let mut dispatched = self.dispatch_writes();
        dispatched += self.dispatch_reads();
        Ok(dispatched)
    }

    // ── registration ────────────────────────────────────────────────

    fn attach(&mut self, mut channel: Box<dyn Channel>) -> Result<Entry> {
        channel.attach(RegistrationToken::new(self.id, &self.inject))?;
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        Ok(Entry { id, channel })
    }

    fn entries(&self, kind: Kind) -> &Vec<Entry> {
        match kind {
            Kind::Listener => &self.listeners,
            Kind::Client => &self.channels,
        }
    }

    fn entries_mut(&mut self, kind: Kind) -> &mut Vec<Entry> {
        match kind {
            Kind::Listener => &mut self.listeners,
            Kind::Client => &mut self.channels,
        }
    }

    fn find(&self, id: ChannelId) -> Option<(Kind, usize)> {
        if let Some(i) = self.channels.iter().position(|e| e.id == id) {
            return Some((Kind::Client, i));
        }
        self.listeners
            .iter()
            .position(|e| e.id == id)
            .map(|i| (Kind::Listener, i))
    }

    /// Current index of a slot's channel. Evictions shift later entries, so
    /// fall back to a search when the recorded index is stale.
    fn locate(&self, slot: Slot) -> Option<usize> {
        let entries = self.entries(slot.kind);
        match entries.get(slot.index) {
            Some(e) if e.id == slot.id => Some(slot.index),
            _ => entries.iter().position(|e| e.id == slot.id),
        }
    }

    /// Remove, close, notify.
    fn evict(&mut self, kind: Kind, index: usize, reason: CloseReason) {
        let mut entry = self.entries_mut(kind).remove(index);
        match reason {
            CloseReason::Closed => debug!(
                "reactor {}: {} {} closed",
                self.id,
                entry.id,
                entry.channel.name()
            ),
            _ => warn!(
                "reactor {}: evicting {} {} ({:?})",
                self.id,
                entry.id,
                entry.channel.name(),
                reason
            ),
        }
        // Drop the registration first so the close is final rather than
        // lingering on a channel nobody polls any more.
        entry.channel.core_mut().unregister();
        entry.channel.close();
        self.stats.evicted += 1;
        if reason == CloseReason::Expired {
            self.stats.expired += 1;
        }
        self.hooks.on_closed(entry.id, entry.channel.as_mut(), reason);
    }

    fn drain_injected(&mut self) {
        for _ in 0..self.config.inject_batch {
            let Some(channel) = self.inject.pop() else {
                break;
            };
            self.stats.injected += 1;
            if let Err(e) = self.register(channel) {
                warn!("reactor {}: dropping injected channel: {}", self.id, e);
            }
        }
    }

    // ── iteration steps ─────────────────────────────────────────────

    fn expire(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.channels.len() {
            if self.channels[i].channel.has_expired(now) {
                self.evict(Kind::Client, i, CloseReason::Expired);
            } else {
                i += 1;
            }
        }
    }

    /// Listeners first (read interest only), then clients (read, plus
    /// write when output is pending). Channels that already lost their
    /// descriptor are evicted instead of polled.
    fn build_pollset(&mut self) {
        loop {
            self.pollset.clear();
            self.slots.clear();
            let mut closed = None;

            for kind in [Kind::Listener, Kind::Client] {
                let entries = match kind {
                    Kind::Listener => &self.listeners,
                    Kind::Client => &self.channels,
                };
                for (index, entry) in entries.iter().enumerate() {
                    match entry.channel.fd() {
                        Ok(fd) => {
                            let write = kind == Kind::Client && entry.channel.is_write_pending();
                            self.pollset.push(fd, true, write);
                            self.slots.push(Slot { kind, index, id: entry.id });
                        }
                        Err(_) => {
                            closed = Some((kind, index));
                            break;
                        }
                    }
                }
                if closed.is_some() {
                    break;
                }
            }

            match closed {
                Some((kind, index)) => self.evict(kind, index, CloseReason::Closed),
                None => return,
            }
        }
    }

    /// Blame one channel for a failed poll. At most one eviction per call.
    fn recover(&mut self, err: Errno) -> Result<usize> {
        self.stats.poll_failures += 1;
        error!("reactor {}: readiness poll failed: {}", self.id, err);

        let broken = |e: &Entry| match e.channel.fd() {
            Ok(fd) => poller::probe(fd).is_err(),
            Err(_) => true,
        };
        let culprit = match self.channels.iter().position(broken) {
            Some(i) => Some((Kind::Client, i)),
            None => self.listeners.iter().position(broken).map(|i| (Kind::Listener, i)),
        };
        match culprit {
            Some((kind, index)) => {
                self.evict(kind, index, CloseReason::PollFailure);
                Ok(0)
            }
            None => Err(ReactorError::Poll(err)),
        }
    }

    fn dispatch_writes(&mut self) -> usize {
        let mut dispatched = 0;
        for k in 0..self.slots.len() {
            let slot = self.slots[k];
            if slot.kind != Kind::Client || !self.pollset.readiness(k).writable {
                continue;
            }
            let Some(i) = self.locate(slot) else {
                continue;
            };
            let entry = &mut self.channels[i];
            match entry.channel.on_write() {
                Ok(()) => {
                    dispatched += 1;
                    self.hooks.on_writable(entry.id, entry.channel.as_mut());
                }
                Err(ChannelError::DataNotAvailable) => {}
                Err(e) if e.is_fatal() => {
                    self.evict(Kind::Client, i, close_reason(&e));
                    break;
                }
                Err(e) => warn!("reactor {}: {} on_write: {}", self.id, slot.id, e),
            }
        }
        dispatched
    }

    fn dispatch_reads(&mut self) -> usize {
        let mut dispatched = 0;
        for k in 0..self.slots.len() {
            let slot = self.slots[k];
            if !self.pollset.readiness(k).readable {
                continue;
            }
            let Some(i) = self.locate(slot) else {
                continue;
            };
            let outcome = match slot.kind {
                Kind::Listener => self.accept_from(i),
                Kind::Client => {
                    let entry = &mut self.channels[i];
                    let result = entry.channel.on_read();
                    if result.is_ok() {
                        self.hooks.on_readable(entry.id, entry.channel.as_mut());
                    }
                    result
                }
            };
            match outcome {
                Ok(()) => dispatched += 1,
                Err(ChannelError::DataNotAvailable) => {}
                Err(e) if e.is_fatal() => {
                    self.evict(slot.kind, i, close_reason(&e));
                    break;
                }
                Err(e) => warn!("reactor {}: {} read: {}", self.id, slot.id, e),
            }
        }
        dispatched
    }

    /// Accept one connection from listener `i` and register it.
    fn accept_from(&mut self, i: usize) -> std::result::Result<(), ChannelError> {
        let listener = &mut self.listeners[i];
        let listener_id = listener.id;
        let accepted = listener.channel.accept_channel()?;
        self.stats.accepted += 1;
        let peer = accepted.peer.clone();
        match self.hooks.on_accept(listener_id, accepted) {
            Some(channel) => match self.register(channel) {
                Ok(id) => debug!("reactor {}: accepted {} from {}", self.id, id, peer),
                Err(e) => warn!("reactor {}: registering {} failed: {}", self.id, peer, e),
            },
            None => {
                self.stats.discarded += 1;
                debug!("reactor {}: discarded connection from {}", self.id, peer);
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        for mut entry in std::mem::take(&mut self.channels) {
            entry.channel.core_mut().unregister();
            entry.channel.close();
            self.hooks
                .on_closed(entry.id, entry.channel.as_mut(), CloseReason::Shutdown);
        }
    }
}

fn close_reason(err: &ChannelError) -> CloseReason {
    match err {
        ChannelError::Closed => CloseReason::Closed,
        _ => CloseReason::Failed,
    }
}

impl<H> fmt::Debug for Reactor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("id", &self.id)
            .field("listeners", &self.listeners.len())
            .field("channels", &self.channels.len())
            .field("pending_inject", &self.inject.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvnet_core::{ChannelConfig, ChannelCore, ReadOpts, Timeout};
    use gvnet_module::{ExpiringChannel, ServerChannel, StreamChannel};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config() -> ReactorConfig {
        ReactorConfig::new().poll_timeout(Duration::from_millis(20))
    }

    fn stream(sock: UnixStream) -> Box<dyn Channel> {
        Box::new(<StreamChannel<UnixStream>>::new(sock).unwrap())
    }

    #[derive(Default)]
    struct Recorder {
        readable: Vec<ChannelId>,
        closed: Vec<(ChannelId, CloseReason)>,
        ticks: usize,
        started: bool,
        cleaned: bool,
        discard: bool,
    }

    impl ReactorHooks for Recorder {
        fn on_accept(&mut self, _listener: ChannelId, accepted: gvnet_core::Accepted) -> Option<Box<dyn Channel>> {
            if self.discard {
                None
            } else {
                Some(accepted.channel)
            }
        }

        fn on_readable(&mut self, id: ChannelId, _channel: &mut dyn Channel) {
            self.readable.push(id);
        }

        fn on_closed(&mut self, id: ChannelId, _channel: &mut dyn Channel, reason: CloseReason) {
            self.closed.push((id, reason));
        }

        fn on_tick(&mut self, _stats: &ReactorStats) {
            self.ticks += 1;
        }

        fn on_startup(&mut self) {
            self.started = true;
        }

        fn on_cleanup(&mut self) {
            self.cleaned = true;
        }
    }

    /// Channel over a descriptor it may not own, whose read, write or accept
    /// path can be told to fail.
    #[derive(Default)]
    struct Faults {
        reads: bool,
        writes: bool,
        accepts: bool,
    }

    struct FaultyChannel {
        core: ChannelCore,
        fd: RawFd,
        _sock: Option<UnixStream>,
        faults: Faults,
    }

    impl FaultyChannel {
        fn invalid_fd(fd: RawFd) -> Self {
            Self {
                core: ChannelCore::new(Timeout::Forever, format!("fake:{fd}")),
                fd,
                _sock: None,
                faults: Faults::default(),
            }
        }

        fn over(sock: UnixStream, faults: Faults) -> Self {
            Self {
                core: ChannelCore::new(Timeout::Forever, "faulty"),
                fd: sock.as_raw_fd(),
                _sock: Some(sock),
                faults,
            }
        }

        fn failing(sock: UnixStream) -> Self {
            Self::over(sock, Faults { reads: true, ..Faults::default() })
        }

        fn broken(&mut self) -> ChannelError {
            self.core.deactivate();
            ChannelError::failure("boom")
        }
    }

    impl Channel for FaultyChannel {
        fn core(&self) -> &ChannelCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ChannelCore {
            &mut self.core
        }

        fn apply_timeout(&mut self, _timeout: Timeout) -> gvnet_core::Result<()> {
            Ok(())
        }

        fn fd(&self) -> gvnet_core::Result<RawFd> {
            if self.core.is_active() {
                Ok(self.fd)
            } else {
                Err(ChannelError::failure("closed"))
            }
        }

        fn read(&mut self, count: usize, opts: ReadOpts) -> gvnet_core::Result<Vec<u8>> {
            self.core.take_rx(count, opts)
        }

        fn write(&mut self, data: &[u8]) -> gvnet_core::Result<()> {
            self.core.tx_mut().push(data);
            Ok(())
        }

        fn on_read(&mut self) -> gvnet_core::Result<()> {
            if self.faults.reads {
                return Err(self.broken());
            }
            Ok(())
        }

        fn on_write(&mut self) -> gvnet_core::Result<()> {
            if self.faults.writes {
                return Err(self.broken());
            }
            Ok(())
        }

        fn close(&mut self) {
            self.core.deactivate();
        }

        fn is_write_pending(&self) -> bool {
            self.faults.writes
        }

        fn is_listening(&self) -> bool {
            self.faults.accepts
        }

        fn accept_channel(&mut self) -> gvnet_core::Result<gvnet_core::Accepted> {
            Err(self.broken())
        }
    }

    #[test]
    fn test_failing_channel_is_isolated() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let mut peers = Vec::new();
        let mut ids = Vec::new();
        for n in 0..4 {
            let (ours, theirs) = UnixStream::pair().unwrap();
            let channel: Box<dyn Channel> = if n == 1 {
                Box::new(FaultyChannel::failing(ours))
            } else {
                stream(ours)
            };
            ids.push(reactor.register(channel).unwrap());
            peers.push(theirs);
        }
        for peer in &mut peers {
            peer.write_all(b"ping").unwrap();
        }

        for _ in 0..3 {
            reactor.run_once().unwrap();
        }

        assert_eq!(reactor.len(), 3);
        assert!(!reactor.contains(ids[1]));
        assert_eq!(reactor.hooks().closed, vec![(ids[1], CloseReason::Failed)]);
        assert_eq!(reactor.stats().evicted, 1);
        for id in [ids[0], ids[2], ids[3]] {
            let channel = reactor.channel_mut(id).unwrap();
            assert_eq!(channel.read(4, ReadOpts::exact()).unwrap(), b"ping");
        }
    }

    #[test]
    fn test_poll_failure_evicts_one_per_iteration() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let good = reactor.register(stream(ours)).unwrap();
        let bad1 = reactor
            .register(Box::new(FaultyChannel::invalid_fd(1_000_000)))
            .unwrap();
        let bad2 = reactor
            .register(Box::new(FaultyChannel::invalid_fd(1_000_001)))
            .unwrap();
        theirs.write_all(b"x").unwrap();

        reactor.run_once().unwrap();
        assert_eq!(reactor.len(), 2);
        assert!(!reactor.contains(bad1));
        assert_eq!(reactor.hooks().closed, vec![(bad1, CloseReason::PollFailure)]);
        // The rest of the iteration was abandoned.
        assert!(reactor.hooks().readable.is_empty());

        reactor.run_once().unwrap();
        assert_eq!(reactor.len(), 1);
        assert!(!reactor.contains(bad2));

        reactor.run_once().unwrap();
        assert_eq!(reactor.hooks().readable, vec![good]);
        assert_eq!(reactor.stats().poll_failures, 2);
    }

    #[test]
    fn test_idle_channel_expires_after_interval() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let inner = <StreamChannel<UnixStream>>::new(ours).unwrap();
        let id = reactor
            .register(Box::new(ExpiringChannel::new(inner, Duration::from_millis(80))))
            .unwrap();

        reactor.run_once().unwrap();
        assert!(reactor.contains(id));

        thread::sleep(Duration::from_millis(120));
        reactor.run_once().unwrap();
        assert!(!reactor.contains(id));
        assert_eq!(reactor.hooks().closed, vec![(id, CloseReason::Expired)]);
        assert_eq!(reactor.stats().expired, 1);
    }

    #[test]
    fn test_peer_close_evicts_with_closed_reason() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let (ours, theirs) = UnixStream::pair().unwrap();
        let id = reactor.register(stream(ours)).unwrap();
        drop(theirs);

        reactor.run_once().unwrap();
        assert!(reactor.is_empty());
        assert_eq!(reactor.hooks().closed, vec![(id, CloseReason::Closed)]);
    }

    #[test]
    fn test_injection_from_another_thread() {
        init();
        let mut reactor = Reactor::new(config().inject_batch(2)).unwrap();
        let injector = reactor.injector();

        let producer = thread::spawn(move || {
            let mut peers = Vec::new();
            for _ in 0..3 {
                let (ours, theirs) = UnixStream::pair().unwrap();
                let channel = <StreamChannel<UnixStream>>::new(ours).unwrap();
                injector.inject(Box::new(channel));
                peers.push(theirs);
            }
            (injector.pending(), peers)
        });
        // Peers stay open so the injected channels see no EOF.
        let (pending, _peers) = producer.join().unwrap();
        assert_eq!(pending, 3);
        assert!(reactor.is_empty());

        reactor.run_once().unwrap();
        assert_eq!(reactor.len(), 2);
        reactor.run_once().unwrap();
        assert_eq!(reactor.len(), 3);
        assert_eq!(reactor.stats().injected, 3);
    }

    #[test]
    fn test_register_unregister_restores_mode() {
        init();
        let mut reactor = Reactor::new(config()).unwrap();
        let reactor_id = reactor.id();
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut channel = <StreamChannel<UnixStream>>::new(ours).unwrap();
        channel.set_timeout(Timeout::After(Duration::from_secs(2))).unwrap();
        let id = reactor.register(Box::new(channel)).unwrap();

        let registered = reactor.channel_mut(id).unwrap();
        assert_eq!(registered.timeout(), Timeout::NonBlocking);
        assert!(registered
            .registration()
            .is_some_and(|token| token.reactor_id() == reactor_id));
        assert!(matches!(
            registered.set_timeout(Timeout::Forever),
            Err(ChannelError::InvalidOperation(_))
        ));

        let back = reactor.unregister(id).unwrap();
        assert_eq!(back.timeout(), Timeout::After(Duration::from_secs(2)));
        assert!(!back.is_registered());
        assert!(matches!(
            reactor.unregister(id),
            Err(ReactorError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_listen_rejects_stream_channel() {
        let mut reactor = Reactor::new(config()).unwrap();
        let (ours, _theirs) = UnixStream::pair().unwrap();
        assert!(matches!(
            reactor.listen(stream(ours)),
            Err(ReactorError::Channel(ChannelError::InvalidOperation(_)))
        ));
    }

    #[test]
    fn test_accept_and_discard() {
        init();
        let server = ServerChannel::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        reactor.register(Box::new(server)).unwrap();
        assert_eq!(reactor.listener_count(), 1);
        assert!(reactor.is_empty());

        let _first = TcpStream::connect(addr).unwrap();
        for _ in 0..50 {
            reactor.run_once().unwrap();
            if reactor.len() == 1 {
                break;
            }
        }
        assert_eq!(reactor.len(), 1);
        assert_eq!(reactor.stats().accepted, 1);

        reactor.hooks_mut().discard = true;
        let _second = TcpStream::connect(addr).unwrap();
        for _ in 0..50 {
            reactor.run_once().unwrap();
            if reactor.stats().discarded == 1 {
                break;
            }
        }
        assert_eq!(reactor.stats().discarded, 1);
        assert_eq!(reactor.len(), 1);
        assert_eq!(reactor.stats().channels, 1);

        let listeners = reactor.take_listeners();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].timeout(), Timeout::Forever);
    }

    struct HelloHooks;

    impl ReactorHooks for HelloHooks {
        fn on_readable(&mut self, _id: ChannelId, channel: &mut dyn Channel) {
            if channel.buffered() < 11 {
                return;
            }
            assert_eq!(channel.read(6, ReadOpts::exact()).unwrap(), b"Hello ");
            assert_eq!(channel.read(5, ReadOpts::exact()).unwrap(), b"World");
            channel.write(b"Yes").unwrap();
        }
    }

    #[test]
    fn test_hello_world_yes_over_tcp() {
        init();
        let server = ServerChannel::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let mut reactor = Reactor::with_hooks(config(), HelloHooks).unwrap();
        reactor.listen(Box::new(server)).unwrap();

        let client = thread::spawn(move || {
            let mut sock = TcpStream::connect(addr).unwrap();
            sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            sock.write_all(b"Hello World").unwrap();
            let mut reply = [0u8; 3];
            sock.read_exact(&mut reply).unwrap();
            reply
        });

        for _ in 0..250 {
            reactor.run_once().unwrap();
            if client.is_finished() {
                break;
            }
        }
        assert_eq!(&client.join().unwrap(), b"Yes");
    }

    #[test]
    fn test_write_failure_ends_write_phase_only() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();

        let (bad_sock, _bad_peer) = UnixStream::pair().unwrap();
        let bad = reactor
            .register(Box::new(FaultyChannel::over(
                bad_sock,
                Faults { writes: true, ..Faults::default() },
            )))
            .unwrap();
        let (queued_sock, mut queued_peer) = UnixStream::pair().unwrap();
        let queued = reactor.register(stream(queued_sock)).unwrap();
        let (reader_sock, mut reader_peer) = UnixStream::pair().unwrap();
        let reader = reactor.register(stream(reader_sock)).unwrap();

        reactor.channel_mut(queued).unwrap().write(b"x").unwrap();
        reader_peer.write_all(b"ping").unwrap();

        reactor.run_once().unwrap();
        assert!(!reactor.contains(bad));
        assert_eq!(reactor.hooks().closed, vec![(bad, CloseReason::Failed)]);
        // The write phase stopped at the failure; reads still ran.
        assert!(reactor.channel(queued).unwrap().is_write_pending());
        assert_eq!(reactor.hooks().readable, vec![reader]);

        reactor.run_once().unwrap();
        assert!(!reactor.channel(queued).unwrap().is_write_pending());
        let mut buf = [0u8; 1];
        queued_peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn test_hard_accept_failure_evicts_listener() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let (sock, mut peer) = UnixStream::pair().unwrap();
        let listener = reactor
            .register(Box::new(FaultyChannel::over(
                sock,
                Faults { accepts: true, ..Faults::default() },
            )))
            .unwrap();
        assert_eq!(reactor.listener_count(), 1);

        peer.write_all(b"!").unwrap();
        reactor.run_once().unwrap();

        assert_eq!(reactor.listener_count(), 0);
        assert!(!reactor.contains(listener));
        assert_eq!(reactor.hooks().closed, vec![(listener, CloseReason::Failed)]);
        assert_eq!(reactor.stats().accepted, 0);
    }

    /// Answers "Hello World" with "Yes" and closes straight away, recording
    /// how much was buffered at each readable event.
    #[derive(Default)]
    struct ReplyAndClose {
        buffered: Vec<usize>,
        closed: Vec<CloseReason>,
    }

    impl ReactorHooks for ReplyAndClose {
        fn on_readable(&mut self, _id: ChannelId, channel: &mut dyn Channel) {
            self.buffered.push(channel.buffered());
            if channel.buffered() < 11 {
                return;
            }
            assert_eq!(channel.read(6, ReadOpts::exact()).unwrap(), b"Hello ");
            assert_eq!(channel.read(5, ReadOpts::exact()).unwrap(), b"World");
            channel.write(b"Yes").unwrap();
            channel.close();
        }

        fn on_closed(&mut self, _id: ChannelId, _channel: &mut dyn Channel, reason: CloseReason) {
            self.closed.push(reason);
        }
    }

    #[test]
    fn test_reply_then_close_reaches_client() {
        init();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server: ServerChannel<std::net::TcpListener> =
            ServerChannel::with_config(listener, ChannelConfig::new().read_chunk(6)).unwrap();
        let mut reactor = Reactor::with_hooks(config(), ReplyAndClose::default()).unwrap();
        reactor.listen(Box::new(server)).unwrap();

        let client = thread::spawn(move || {
            let mut ch = StreamChannel::<TcpStream>::connect(addr).unwrap();
            ch.set_timeout(Timeout::After(Duration::from_secs(3))).unwrap();
            ch.write(b"Hello World").unwrap();
            let reply = ch.read(3, ReadOpts::exact());
            let after = ch.read(1, ReadOpts::exact());
            (reply, after)
        });

        for _ in 0..250 {
            reactor.run_once().unwrap();
            if client.is_finished() && reactor.is_empty() {
                break;
            }
        }
        let (reply, after) = client.join().unwrap();
        assert_eq!(reply.unwrap(), b"Yes");
        assert!(matches!(after, Err(ChannelError::Closed)));

        let hooks = reactor.hooks();
        assert_eq!(hooks.buffered, vec![6, 11]);
        assert_eq!(hooks.closed, vec![CloseReason::Closed]);
        assert!(reactor.is_empty());
    }

    #[test]
    fn test_run_until_stopped_closes_clients() {
        init();
        let mut reactor = Reactor::with_hooks(config(), Recorder::default()).unwrap();
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let id = reactor.register(stream(ours)).unwrap();

        let stop = reactor.stop_handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            stop.stop();
        });
        reactor.run();
        stopper.join().unwrap();

        assert!(reactor.is_stopped());
        assert!(reactor.is_empty());
        let hooks = reactor.hooks();
        assert!(hooks.started && hooks.cleaned);
        assert!(hooks.ticks >= 1);
        assert_eq!(hooks.closed, vec![(id, CloseReason::Shutdown)]);

        let mut buf = [0u8; 1];
        assert_eq!(theirs.read(&mut buf).unwrap(), 0);
    }
}
