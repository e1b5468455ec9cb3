//! Connected byte-stream channel over any [`Transport`].
//!
//! In non-blocking mode (the reactor's mode) `write` only queues and the
//! readiness callbacks move bytes. In blocking mode `read` and `write` talk
//! to the transport directly, bounded by the channel's timeout.
//!
//! `close` flushes what it can. A registered channel whose output cannot be
//! sent right away lingers: it stays inactive for the application, keeps its
//! transport, and finishes closing from `on_write` once tx has drained.

use std::io;
use std::marker::PhantomData;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::io::RawFd;
use std::time::Instant;

use gvnet_core::{
    Channel, ChannelConfig, ChannelCore, ChannelError, ReadOpts, Result, Timeout, Transport,
};
use log::{debug, trace};

use crate::policy::{ErrorClass, ErrorPolicy, IoOp, PlainPolicy};

/// Outcome of one receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recv {
    Data(usize),
    Eof,
    WouldBlock,
}

/// Outcome of a tx flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flush {
    Drained,
    Blocked,
}

pub struct StreamChannel<T, P = PlainPolicy> {
    core: ChannelCore,
    transport: Option<T>,
    scratch: Box<[u8]>,
    /// Closed by the application with output still queued.
    lingering: bool,
    _policy: PhantomData<fn() -> P>,
}

impl<T: Transport, P: ErrorPolicy> StreamChannel<T, P> {
    /// Wrap a connected transport. The channel starts in blocking mode.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, &ChannelConfig::from_env())
    }

    pub fn with_config(mut transport: T, config: &ChannelConfig) -> Result<Self> {
        config.validate()?;
        transport
            .set_timeout(Timeout::Forever)
            .map_err(ChannelError::UnderlyingFailure)?;
        let label = transport.describe();
        debug!("channel {} opened", label);
        Ok(Self {
            core: ChannelCore::new(Timeout::Forever, label),
            transport: Some(transport),
            scratch: vec![0u8; config.read_chunk].into_boxed_slice(),
            lingering: false,
            _policy: PhantomData,
        })
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// True between a `close` that left output queued and the flush that
    /// completes it.
    pub fn is_lingering(&self) -> bool {
        self.lingering
    }

    fn fail(&mut self, err: io::Error) -> ChannelError {
        debug!("channel {} failed: {}", self.core.label(), err);
        self.core.deactivate();
        ChannelError::UnderlyingFailure(err)
    }

    /// One receive call into rx.
    pub(crate) fn recv_chunk(&mut self) -> Result<Recv> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(ChannelError::Closed);
        };
        loop {
            match transport.recv(&mut self.scratch) {
                Ok(0) => {
                    debug!("channel {} reached eof", self.core.label());
                    self.core.deactivate();
                    return Ok(Recv::Eof);
                }
                Ok(n) => {
                    trace!("channel {} received {} bytes", self.core.label(), n);
                    self.core.rx_mut().push(&self.scratch[..n]);
                    return Ok(Recv::Data(n));
                }
                Err(e) => match P::classify(IoOp::Recv, &e) {
                    ErrorClass::Retry => return Ok(Recv::WouldBlock),
                    ErrorClass::Interrupted => continue,
                    ErrorClass::Fatal => return Err(self.fail(e)),
                },
            }
        }
    }

    /// Send tx until it is empty or the transport pushes back.
    pub(crate) fn flush_tx(&mut self) -> Result<Flush> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(ChannelError::Closed);
        };
        while !self.core.tx().is_empty() {
            match transport.send(self.core.tx().front()) {
                Ok(0) => {
                    let err = io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes");
                    return Err(self.fail(err));
                }
                Ok(n) => {
                    trace!("channel {} sent {} bytes", self.core.label(), n);
                    self.core.tx_mut().consume(n);
                }
                Err(e) => match P::classify(IoOp::Send, &e) {
                    ErrorClass::Retry => return Ok(Flush::Blocked),
                    ErrorClass::Interrupted => continue,
                    ErrorClass::Fatal => return Err(self.fail(e)),
                },
            }
        }
        loop {
            match transport.flush() {
                Ok(()) if transport.wants_write() => return Ok(Flush::Blocked),
                Ok(()) => return Ok(Flush::Drained),
                Err(e) => match P::classify(IoOp::Send, &e) {
                    ErrorClass::Retry => return Ok(Flush::Blocked),
                    ErrorClass::Interrupted => continue,
                    ErrorClass::Fatal => return Err(self.fail(e)),
                },
            }
        }
    }

    /// Drop queued output and shut the transport down.
    fn release(&mut self) {
        self.lingering = false;
        self.core.tx_mut().clear();
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                debug!("channel {} close: {}", self.core.label(), e);
            }
            debug!("channel {} closed", self.core.label());
        }
    }

    /// Accumulate until `count` bytes are buffered, the channel closes, or
    /// the deadline passes. Whatever arrived stays in rx either way.
    fn fill_blocking(&mut self, count: usize) -> Result<()> {
        let mode = self.core.timeout();
        let deadline = mode.deadline(Instant::now());
        let result = loop {
            if self.core.rx().len() >= count || !self.core.is_active() {
                break Ok(());
            }
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    break Ok(());
                }
                if let Err(e) = self.apply_timeout(Timeout::After(deadline - now)) {
                    break Err(e);
                }
            }
            match self.recv_chunk() {
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        if deadline.is_some() && self.transport.is_some() {
            self.apply_timeout(mode)?;
        }
        result
    }
}

impl<P: ErrorPolicy> StreamChannel<TcpStream, P> {
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        let sock = self.transport.as_ref().ok_or(ChannelError::Closed)?;
        sock.peer_addr().map_err(ChannelError::UnderlyingFailure)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let sock = self.transport.as_ref().ok_or(ChannelError::Closed)?;
        sock.local_addr().map_err(ChannelError::UnderlyingFailure)
    }
}

impl StreamChannel<TcpStream> {
    /// Blocking TCP connect.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::connect_with(addr, &ChannelConfig::from_env())
    }

    pub fn connect_with<A: ToSocketAddrs>(addr: A, config: &ChannelConfig) -> Result<Self> {
        let mut sock = TcpStream::connect(addr).map_err(ChannelError::UnderlyingFailure)?;
        Transport::set_nodelay(&mut sock, config.nodelay).map_err(ChannelError::UnderlyingFailure)?;
        Self::with_config(sock, config)
    }
}

impl<T: Transport, P: ErrorPolicy> Channel for StreamChannel<T, P> {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn apply_timeout(&mut self, timeout: Timeout) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(ChannelError::Closed)?;
        transport
            .set_timeout(timeout)
            .map_err(ChannelError::UnderlyingFailure)
    }

    fn fd(&self) -> Result<RawFd> {
        self.transport
            .as_ref()
            .map(Transport::raw_fd)
            .ok_or_else(|| ChannelError::failure("channel is closed"))
    }

    fn read(&mut self, count: usize, opts: ReadOpts) -> Result<Vec<u8>> {
        if self.core.timeout().is_blocking()
            && self.core.is_active()
            && self.core.rx().len() < count
        {
            self.fill_blocking(count)?;
        }
        self.core.take_rx(count, opts)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.core.ensure_active()?;
        self.core.tx_mut().push(data);
        if !self.core.timeout().is_blocking() {
            return Ok(());
        }
        match self.flush_tx()? {
            Flush::Drained => Ok(()),
            Flush::Blocked => Err(ChannelError::DataNotAvailable),
        }
    }

    fn on_read(&mut self) -> Result<()> {
        if self.lingering {
            return Err(ChannelError::DataNotAvailable);
        }
        self.core.ensure_active()?;
        let drain = P::DRAIN_READS && !self.core.timeout().is_blocking();
        let mut received = false;
        loop {
            match self.recv_chunk()? {
                Recv::Data(_) => {
                    // Only input the transport already decoded; the socket
                    // itself gets one recv per readiness event.
                    let more = drain
                        && self
                            .transport
                            .as_mut()
                            .is_some_and(|t| t.pending_input() > 0);
                    if !more {
                        return Ok(());
                    }
                    received = true;
                }
                Recv::WouldBlock => return Ok(()),
                // Report the close on the next call so the data read in
                // this one reaches the application first.
                Recv::Eof if received => return Ok(()),
                Recv::Eof => return Err(ChannelError::Closed),
            }
        }
    }

    fn on_write(&mut self) -> Result<()> {
        let flushed = self.flush_tx();
        if !self.lingering {
            return flushed.map(|_| ());
        }
        match flushed {
            Ok(Flush::Blocked) => Ok(()),
            Ok(Flush::Drained) => {
                self.release();
                Err(ChannelError::Closed)
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.core.deactivate();
        if self.transport.is_none() || (self.lingering && self.core.is_registered()) {
            return;
        }
        if !self.lingering && self.is_write_pending() {
            match self.flush_tx() {
                Ok(Flush::Drained) => {}
                Ok(Flush::Blocked) if self.core.is_registered() => {
                    debug!(
                        "channel {} lingering with {} bytes queued",
                        self.core.label(),
                        self.core.tx().len()
                    );
                    self.lingering = true;
                    return;
                }
                Ok(Flush::Blocked) => debug!(
                    "channel {} dropping {} unsent bytes",
                    self.core.label(),
                    self.core.tx().len()
                ),
                Err(e) => debug!("channel {} final flush: {}", self.core.label(), e),
            }
        }
        self.release();
    }

    fn is_write_pending(&self) -> bool {
        !self.core.tx().is_empty()
            || self.transport.as_ref().is_some_and(Transport::wants_write)
    }
}
