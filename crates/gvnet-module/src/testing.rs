//! Scripted transport for driving channels without sockets.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use gvnet_core::{Timeout, Transport};

/// Route `log` output through the test harness; `RUST_LOG` picks the level.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Replays queued `recv` results (an empty `Ok` is EOF, an exhausted queue
/// is would-block) and records everything sent. Queued results count as
/// input already decoded by the transport.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub recv: VecDeque<io::Result<Vec<u8>>>,
    /// With an empty queue, fill every `recv` buffer instead of blocking.
    pub flood: bool,
    pub recv_calls: Arc<Mutex<usize>>,
    pub send_errors: VecDeque<io::Error>,
    /// Max bytes accepted per `send`; 0 means unlimited.
    pub send_limit: usize,
    /// Alternate accepted sends with would-block.
    pub stall: bool,
    stalled: bool,
    pub sent: Arc<Mutex<Vec<u8>>>,
    pub modes: Arc<Mutex<Vec<Timeout>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recv<I>(items: I) -> Self
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
    {
        Self {
            recv: items.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(err) = self.send_errors.pop_front() {
            return Err(err);
        }
        if self.stall {
            self.stalled = !self.stalled;
            if !self.stalled {
                return Err(io::ErrorKind::WouldBlock.into());
            }
        }
        let n = match self.send_limit {
            0 => buf.len(),
            limit => buf.len().min(limit),
        };
        self.sent.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        *self.recv_calls.lock().unwrap() += 1;
        match self.recv.pop_front() {
            None if self.flood => {
                buf.fill(b'x');
                Ok(buf.len())
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(Err(e)) => Err(e),
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.recv.push_front(Ok(data[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }

    fn set_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        self.modes.lock().unwrap().push(timeout);
        Ok(())
    }

    fn pending_input(&mut self) -> usize {
        self.recv.len()
    }

    fn close(&mut self) -> io::Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }

    fn raw_fd(&self) -> RawFd {
        1_000_000
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
