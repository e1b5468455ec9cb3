//! rustls-backed [`Transport`].
//!
//! The handshake is driven lazily by the first `recv`/`send`, so a freshly
//! accepted connection can be handed to the reactor straight away. rustls
//! buffers both directions: decrypted plaintext on the read side (reported
//! through `pending_input`, which the draining `on_read` of
//! [`SecurePolicy`](crate::SecurePolicy) follows) and encrypted records on
//! the write side (reported through `wants_write`).

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use gvnet_core::{Timeout, Transport};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection, StreamOwned};

pub enum TlsTransport {
    Client(StreamOwned<ClientConnection, TcpStream>),
    Server(StreamOwned<ServerConnection, TcpStream>),
}

/// Run `$body` against whichever side `$self` is.
macro_rules! each_side {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            TlsTransport::Client($s) => $body,
            TlsTransport::Server($s) => $body,
        }
    };
}

impl TlsTransport {
    pub fn client(sock: TcpStream, server_name: &str, config: Arc<ClientConfig>) -> io::Result<Self> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn = ClientConnection::new(config, name).map_err(io::Error::other)?;
        Ok(TlsTransport::Client(StreamOwned::new(conn, sock)))
    }

    pub fn server(sock: TcpStream, config: Arc<ServerConfig>) -> Result<Self, rustls::Error> {
        let conn = ServerConnection::new(config)?;
        Ok(TlsTransport::Server(StreamOwned::new(conn, sock)))
    }

    pub fn sock(&self) -> &TcpStream {
        each_side!(self, s => &s.sock)
    }

    pub fn is_handshaking(&self) -> bool {
        each_side!(self, s => s.conn.is_handshaking())
    }

    /// Best-effort write of records rustls already produced.
    fn write_pending_records(&mut self) {
        each_side!(self, s => {
            while s.conn.wants_write() {
                match s.conn.write_tls(&mut s.sock) {
                    Ok(n) if n > 0 => continue,
                    _ => break,
                }
            }
        })
    }
}

impl Transport for TlsTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        each_side!(self, s => s.write(buf))
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        each_side!(self, s => s.read(buf))
    }

    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        each_side!(self, s => Transport::set_timeout(&mut s.sock, timeout))
    }

    fn close(&mut self) -> io::Result<()> {
        each_side!(self, s => s.conn.send_close_notify());
        self.write_pending_records();
        each_side!(self, s => Transport::close(&mut s.sock))
    }

    fn raw_fd(&self) -> RawFd {
        self.sock().as_raw_fd()
    }

    fn flush(&mut self) -> io::Result<()> {
        each_side!(self, s => s.flush())
    }

    fn wants_write(&self) -> bool {
        each_side!(self, s => s.conn.wants_write())
    }

    fn pending_input(&mut self) -> usize {
        each_side!(self, s => match s.conn.process_new_packets() {
            Ok(state) => state.plaintext_bytes_to_read(),
            // The next recv reports the error.
            Err(_) => 0,
        })
    }

    fn set_nodelay(&mut self, on: bool) -> io::Result<()> {
        self.sock().set_nodelay(on)
    }

    fn describe(&self) -> String {
        match self.sock().peer_addr() {
            Ok(addr) => format!("tls:{}", addr),
            Err(_) => format!("tls:fd{}", self.raw_fd()),
        }
    }
}
