//! Transport handle contract.
//!
//! A channel owns exactly one transport. The contract is the minimum the
//! channel layer needs from an OS handle: send, recv, set-timeout, close and
//! the descriptor number used for readiness polling. Buffering transports
//! (TLS) additionally report output they still hold via `wants_write` and
//! decoded input via `pending_input`.
//!
//! Implementations here cover the std socket types. `gvnet-module` adds the
//! rustls-backed one.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use socket2::SockRef;

use crate::timeout::Timeout;

/// A connected byte-stream handle.
pub trait Transport: Send + 'static {
    /// Send some prefix of `buf`, returning how much was accepted.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receive into `buf`. `Ok(0)` is graceful EOF.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Switch between non-blocking, blocking and bounded-blocking I/O.
    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()>;

    /// Shut the stream down in both directions.
    fn close(&mut self) -> io::Result<()>;

    /// Descriptor used for readiness polling.
    fn raw_fd(&self) -> RawFd;

    /// Push out any bytes the transport buffers internally.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// True while the transport itself holds unsent output.
    fn wants_write(&self) -> bool {
        false
    }

    /// Bytes already received and decoded inside the transport. A readiness
    /// poll cannot see them, so a reader keeps calling `recv` while this is
    /// non-zero.
    fn pending_input(&mut self) -> usize {
        0
    }

    /// `TCP_NODELAY`; a no-op for non-TCP transports.
    fn set_nodelay(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    /// Short label for log lines.
    fn describe(&self) -> String {
        format!("fd:{}", self.raw_fd())
    }
}

/// A listening handle producing connected transports.
pub trait Acceptor: Send + 'static {
    type Stream: Transport;
    type Addr: fmt::Debug + Send + 'static;

    fn accept(&mut self) -> io::Result<(Self::Stream, Self::Addr)>;

    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()>;

    fn raw_fd(&self) -> RawFd;

    fn describe(&self) -> String {
        format!("listen-fd:{}", self.raw_fd())
    }
}

// ── Connected sockets ────────────────────────────────────────────────

macro_rules! impl_socket_transport {
    ($ty:ty, $describe:expr $(, $extra:item)*) => {
        impl Transport for $ty {
            fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
                Write::write(self, buf)
            }

            fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                Read::read(self, buf)
            }

            fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
                match timeout.normalized() {
                    Timeout::NonBlocking => self.set_nonblocking(true),
                    Timeout::Forever => {
                        self.set_nonblocking(false)?;
                        self.set_read_timeout(None)?;
                        self.set_write_timeout(None)
                    }
                    Timeout::After(d) => {
                        self.set_nonblocking(false)?;
                        self.set_read_timeout(Some(d))?;
                        self.set_write_timeout(Some(d))
                    }
                }
            }

            fn close(&mut self) -> io::Result<()> {
                match self.shutdown(Shutdown::Both) {
                    // Peer already gone: nothing left to shut down.
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    other => other,
                }
            }

            fn raw_fd(&self) -> RawFd {
                self.as_raw_fd()
            }

            fn describe(&self) -> String {
                let describe: fn(&$ty) -> String = $describe;
                describe(self)
            }

            $($extra)*
        }
    };
}

impl_socket_transport!(
    TcpStream,
    |s| match s.peer_addr() {
        Ok(addr) => format!("tcp:{}", addr),
        Err(_) => format!("tcp:fd{}", s.as_raw_fd()),
    },
    fn set_nodelay(&mut self, on: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, on)
    }
);

impl_socket_transport!(UnixStream, |s| format!("unix:fd{}", s.as_raw_fd()));

// ── Listening sockets ────────────────────────────────────────────────

/// Apply a timeout mode to a listening socket. `SO_RCVTIMEO` bounds
/// `accept()` on Linux, which std does not expose for listeners.
fn set_listener_timeout<S: AsFd>(sock: &S, timeout: Timeout) -> io::Result<()> {
    let sock = SockRef::from(sock);
    match timeout.normalized() {
        Timeout::NonBlocking => sock.set_nonblocking(true),
        Timeout::Forever => {
            sock.set_nonblocking(false)?;
            sock.set_read_timeout(None)
        }
        Timeout::After(d) => {
            sock.set_nonblocking(false)?;
            sock.set_read_timeout(Some(d))
        }
    }
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;
    type Addr = std::net::SocketAddr;

    fn accept(&mut self) -> io::Result<(TcpStream, std::net::SocketAddr)> {
        TcpListener::accept(self)
    }

    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        set_listener_timeout(self, timeout)
    }

    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn describe(&self) -> String {
        match self.local_addr() {
            Ok(addr) => format!("tcp-listen:{}", addr),
            Err(_) => format!("tcp-listen:fd{}", self.as_raw_fd()),
        }
    }
}

impl Acceptor for UnixListener {
    type Stream = UnixStream;
    type Addr = std::os::unix::net::SocketAddr;

    fn accept(&mut self) -> io::Result<(UnixStream, std::os::unix::net::SocketAddr)> {
        UnixListener::accept(self)
    }

    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        set_listener_timeout(self, timeout)
    }

    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn describe(&self) -> String {
        format!("unix-listen:fd{}", self.as_raw_fd())
    }
}
