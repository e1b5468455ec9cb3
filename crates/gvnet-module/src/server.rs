//! Listening channel.
//!
//! Its only "read" is an accept. Byte I/O is rejected with
//! `InvalidOperation`, and it never has pending output.

use std::marker::PhantomData;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::io::RawFd;

use gvnet_core::{
    Acceptor, Accepted, Channel, ChannelConfig, ChannelCore, ChannelError, ReadOpts, Result,
    Timeout, Transport,
};
use log::{debug, warn};

use crate::policy::{ErrorClass, ErrorPolicy, IoOp, PlainPolicy};
use crate::stream::StreamChannel;

pub struct ServerChannel<A, P = PlainPolicy> {
    core: ChannelCore,
    acceptor: Option<A>,
    config: ChannelConfig,
    _policy: PhantomData<fn() -> P>,
}

impl<A: Acceptor, P: ErrorPolicy> ServerChannel<A, P> {
    pub fn new(acceptor: A) -> Result<Self> {
        Self::with_config(acceptor, ChannelConfig::from_env())
    }

    pub fn with_config(mut acceptor: A, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        acceptor
            .set_timeout(Timeout::Forever)
            .map_err(ChannelError::UnderlyingFailure)?;
        let label = acceptor.describe();
        debug!("listener {} opened", label);
        Ok(Self {
            core: ChannelCore::new(Timeout::Forever, label),
            acceptor: Some(acceptor),
            config,
            _policy: PhantomData,
        })
    }

    pub fn acceptor(&self) -> Option<&A> {
        self.acceptor.as_ref()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Accept one raw connection with `TCP_NODELAY` applied per config.
    pub fn accept_raw(&mut self) -> Result<(A::Stream, A::Addr)> {
        self.core.ensure_active()?;
        let Some(acceptor) = self.acceptor.as_mut() else {
            return Err(ChannelError::Closed);
        };
        loop {
            match acceptor.accept() {
                Ok((mut stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(self.config.nodelay) {
                        debug!("listener {}: nodelay on {:?}: {}", self.core.label(), addr, e);
                    }
                    return Ok((stream, addr));
                }
                Err(e) => match P::classify(IoOp::Accept, &e) {
                    ErrorClass::Retry => return Err(ChannelError::DataNotAvailable),
                    ErrorClass::Interrupted => continue,
                    ErrorClass::Fatal => {
                        warn!("listener {} accept failed: {}", self.core.label(), e);
                        self.core.deactivate();
                        return Err(ChannelError::UnderlyingFailure(e));
                    }
                },
            }
        }
    }

    /// Accept one connection as a blocking-mode stream channel.
    pub fn accept(&mut self) -> Result<(StreamChannel<A::Stream, P>, A::Addr)> {
        let (stream, addr) = self.accept_raw()?;
        let channel = StreamChannel::with_config(stream, &self.config)?;
        debug!("listener {} accepted {:?}", self.core.label(), addr);
        Ok((channel, addr))
    }
}

impl ServerChannel<TcpListener> {
    /// Bind a TCP listener.
    pub fn bind<S: ToSocketAddrs>(addr: S) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(ChannelError::UnderlyingFailure)?;
        Self::new(listener)
    }
}

impl<P: ErrorPolicy> ServerChannel<TcpListener, P> {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self.acceptor.as_ref().ok_or(ChannelError::Closed)?;
        listener.local_addr().map_err(ChannelError::UnderlyingFailure)
    }
}

impl<A: Acceptor, P: ErrorPolicy> Channel for ServerChannel<A, P> {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn apply_timeout(&mut self, timeout: Timeout) -> Result<()> {
        let acceptor = self.acceptor.as_mut().ok_or(ChannelError::Closed)?;
        acceptor
            .set_timeout(timeout)
            .map_err(ChannelError::UnderlyingFailure)
    }

    fn fd(&self) -> Result<RawFd> {
        self.acceptor
            .as_ref()
            .map(Acceptor::raw_fd)
            .ok_or_else(|| ChannelError::failure("listener is closed"))
    }

    fn read(&mut self, _count: usize, _opts: ReadOpts) -> Result<Vec<u8>> {
        Err(ChannelError::InvalidOperation("read on a listening channel"))
    }

    fn write(&mut self, _data: &[u8]) -> Result<()> {
        Err(ChannelError::InvalidOperation("write on a listening channel"))
    }

    fn on_read(&mut self) -> Result<()> {
        Err(ChannelError::InvalidOperation("on_read on a listening channel"))
    }

    fn on_write(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.core.deactivate();
        if self.acceptor.take().is_some() {
            debug!("listener {} closed", self.core.label());
        }
    }

    fn is_write_pending(&self) -> bool {
        false
    }

    fn is_listening(&self) -> bool {
        true
    }

    fn accept_channel(&mut self) -> Result<Accepted> {
        let (channel, addr) = self.accept()?;
        Ok(Accepted {
            channel: Box::new(channel),
            peer: format!("{:?}", addr),
        })
    }
}
