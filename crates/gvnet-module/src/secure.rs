//! TLS channels.
//!
//! Same contract as the plain ones. The difference is error classification:
//! the TLS layer surfaces record errors and would-block/timeout through the
//! same error type, so [`SecurePolicy`] sorts them by message text.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::RawFd;
use std::sync::Arc;

use gvnet_core::{
    Accepted, Channel, ChannelConfig, ChannelCore, ChannelError, ReadOpts, Result, Timeout,
};
use log::warn;
use rustls::{ClientConfig, ServerConfig};

use crate::policy::{ErrorClass, ErrorPolicy, IoOp};
use crate::server::ServerChannel;
use crate::stream::StreamChannel;
use crate::tls::TlsTransport;

/// Message fragments that mean "try again later".
const TRANSIENT_MARKERS: [&str; 3] = ["timed out", "would block", "temporarily unavailable"];

/// Only tolerated on accept: the client gave up before we got to it.
const ACCEPT_RESET_MARKER: &str = "connection reset by peer";

/// Message-text classification for TLS transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurePolicy;

/// Classify an error message. Case-insensitive substring match.
pub fn classify_message(op: IoOp, msg: &str) -> ErrorClass {
    let msg = msg.to_ascii_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| msg.contains(m)) {
        return ErrorClass::Retry;
    }
    if op == IoOp::Accept && msg.contains(ACCEPT_RESET_MARKER) {
        return ErrorClass::Retry;
    }
    ErrorClass::Fatal
}

impl ErrorPolicy for SecurePolicy {
    const DRAIN_READS: bool = true;

    fn classify(op: IoOp, err: &io::Error) -> ErrorClass {
        if err.kind() == io::ErrorKind::Interrupted {
            return ErrorClass::Interrupted;
        }
        classify_message(op, &err.to_string())
    }
}

pub type SecureStreamChannel<T = TlsTransport> = StreamChannel<T, SecurePolicy>;

impl StreamChannel<TlsTransport, SecurePolicy> {
    /// TCP connect plus a client-side TLS session. The handshake completes
    /// on first I/O.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        server_name: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<Self> {
        Self::connect_with(addr, server_name, tls, &ChannelConfig::from_env())
    }

    pub fn connect_with<A: ToSocketAddrs>(
        addr: A,
        server_name: &str,
        tls: Arc<ClientConfig>,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let sock = TcpStream::connect(addr).map_err(ChannelError::UnderlyingFailure)?;
        sock.set_nodelay(config.nodelay)
            .map_err(ChannelError::UnderlyingFailure)?;
        let transport = TlsTransport::client(sock, server_name, tls)
            .map_err(ChannelError::UnderlyingFailure)?;
        Self::with_config(transport, config)
    }
}

/// Listening TCP socket whose accepted connections speak TLS.
pub struct SecureServerChannel {
    inner: ServerChannel<TcpListener, SecurePolicy>,
    tls: Arc<ServerConfig>,
}

impl SecureServerChannel {
    pub fn bind<S: ToSocketAddrs>(addr: S, tls: Arc<ServerConfig>) -> Result<Self> {
        Self::bind_with(addr, tls, ChannelConfig::from_env())
    }

    pub fn bind_with<S: ToSocketAddrs>(
        addr: S,
        tls: Arc<ServerConfig>,
        config: ChannelConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(ChannelError::UnderlyingFailure)?;
        Ok(Self {
            inner: ServerChannel::with_config(listener, config)?,
            tls,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept one connection and wrap it in a server-side TLS session.
    pub fn accept(&mut self) -> Result<(SecureStreamChannel, SocketAddr)> {
        let (sock, addr) = self.inner.accept_raw()?;
        let transport = match TlsTransport::server(sock, Arc::clone(&self.tls)) {
            Ok(t) => t,
            Err(e) => {
                warn!("listener {}: tls session for {} refused: {}", self.name(), addr, e);
                return Err(ChannelError::DataNotAvailable);
            }
        };
        let channel = SecureStreamChannel::with_config(transport, self.inner.config())?;
        Ok((channel, addr))
    }
}

impl Channel for SecureServerChannel {
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
        self.inner.on_read()
    }

    fn on_write(&mut self) -> Result<()> {
        self.inner.on_write()
    }

    fn close(&mut self) {
        self.inner.close()
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
            peer: addr.to_string(),
        })
    }
}
