//! Thin `poll(2)` wrapper.
//!
//! The set is rebuilt every iteration, so it is a plain `Vec<pollfd>` that
//! keeps its allocation between rounds.

use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;

/// What `poll` reported for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// `POLLNVAL`: the descriptor is not open.
    pub invalid: bool,
}

#[derive(Debug, Default)]
pub struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    pub fn new() -> Self {
        Self { fds: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.fds.clear();
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Add an entry; returns its index for [`PollSet::readiness`].
    pub fn push(&mut self, fd: RawFd, read: bool, write: bool) -> usize {
        let mut events = 0;
        if read {
            events |= libc::POLLIN;
        }
        if write {
            events |= libc::POLLOUT;
        }
        self.fds.push(libc::pollfd { fd, events, revents: 0 });
        self.fds.len() - 1
    }

    /// Block for at most `timeout`. Returns the number of entries with events.
    pub fn wait(&mut self, timeout: Duration) -> nix::Result<usize> {
        let ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: `fds` is a live, exclusively borrowed buffer of `len` pollfds.
        let rc = unsafe {
            libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, ms)
        };
        Errno::result(rc).map(|n| n as usize)
    }

    pub fn readiness(&self, idx: usize) -> Readiness {
        let Some(pfd) = self.fds.get(idx) else {
            return Readiness::default();
        };
        let r = pfd.revents;
        // Hangup and error are delivered to whichever callback is interested
        // so the channel observes EOF or the failure itself.
        let broken = r & (libc::POLLHUP | libc::POLLERR) != 0;
        Readiness {
            readable: pfd.events & libc::POLLIN != 0 && (r & libc::POLLIN != 0 || broken),
            writable: pfd.events & libc::POLLOUT != 0 && (r & libc::POLLOUT != 0 || broken),
            invalid: r & libc::POLLNVAL != 0,
        }
    }

    pub fn any_invalid(&self) -> bool {
        self.fds.iter().any(|p| p.revents & libc::POLLNVAL != 0)
    }
}

/// Zero-timeout poll of a single descriptor. `Err(EBADF)` when the kernel
/// reports it invalid.
pub fn probe(fd: RawFd) -> nix::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        // SAFETY: one pollfd on the stack, nfds = 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        match Errno::result(rc) {
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
            Ok(_) if pfd.revents & libc::POLLNVAL != 0 => return Err(Errno::EBADF),
            Ok(_) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_readable_after_write() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let mut set = PollSet::new();
        let idx = set.push(b.as_raw_fd(), true, false);

        assert_eq!(set.wait(Duration::ZERO).unwrap(), 0);
        assert!(!set.readiness(idx).readable);

        a.write_all(b"x").unwrap();
        assert_eq!(set.wait(Duration::from_millis(100)).unwrap(), 1);
        assert!(set.readiness(idx).readable);
        assert!(!set.readiness(idx).writable);
    }

    #[test]
    fn test_write_interest_only_when_asked() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut set = PollSet::new();
        let ro = set.push(a.as_raw_fd(), true, false);
        let rw = set.push(a.as_raw_fd(), true, true);

        set.wait(Duration::from_millis(10)).unwrap();
        assert!(!set.readiness(ro).writable);
        assert!(set.readiness(rw).writable);
    }

    #[test]
    fn test_invalid_descriptor() {
        let mut set = PollSet::new();
        let idx = set.push(1_000_000, true, false);
        assert_eq!(set.wait(Duration::ZERO).unwrap(), 1);
        assert!(set.readiness(idx).invalid);
        assert!(set.any_invalid());

        assert_eq!(probe(1_000_000), Err(Errno::EBADF));
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(probe(a.as_raw_fd()).is_ok());
    }

    #[test]
    fn test_hangup_reads_as_readable() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let mut set = PollSet::new();
        let idx = set.push(b.as_raw_fd(), true, false);
        set.wait(Duration::from_millis(10)).unwrap();
        assert!(set.readiness(idx).readable);
    }
}
