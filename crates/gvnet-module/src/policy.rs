//! Transport error classification.
//!
//! A channel never inspects `io::Error`s itself; it asks its policy which of
//! three buckets an error falls into and acts on that:
//!
//! - `Retry`: nothing to do right now (`DataNotAvailable` upward)
//! - `Interrupted`: reissue the same call
//! - `Fatal`: the channel goes inactive (`UnderlyingFailure` upward)

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retry,
    Interrupted,
    Fatal,
}

/// Which transport call produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Recv,
    Send,
    Accept,
}

pub trait ErrorPolicy: Send + 'static {
    /// Keep calling `recv` in `on_read` while the transport still holds
    /// decoded input (`Transport::pending_input`). Needed when the transport
    /// buffers data that the readiness poll cannot see.
    const DRAIN_READS: bool = false;

    fn classify(op: IoOp, err: &io::Error) -> ErrorClass;
}

/// Classification by `io::ErrorKind`, for plain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPolicy;

impl ErrorPolicy for PlainPolicy {
    fn classify(op: IoOp, err: &io::Error) -> ErrorClass {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorClass::Retry,
            io::ErrorKind::Interrupted => ErrorClass::Interrupted,
            // The half-open connection died in the backlog; the listener is fine.
            io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
                if op == IoOp::Accept =>
            {
                ErrorClass::Retry
            }
            _ => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_policy_by_kind() {
        let would_block = io::Error::from(io::ErrorKind::WouldBlock);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        let eintr = io::Error::from(io::ErrorKind::Interrupted);
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);

        assert_eq!(PlainPolicy::classify(IoOp::Recv, &would_block), ErrorClass::Retry);
        assert_eq!(PlainPolicy::classify(IoOp::Send, &timed_out), ErrorClass::Retry);
        assert_eq!(PlainPolicy::classify(IoOp::Recv, &eintr), ErrorClass::Interrupted);
        assert_eq!(PlainPolicy::classify(IoOp::Recv, &reset), ErrorClass::Fatal);
        assert_eq!(PlainPolicy::classify(IoOp::Accept, &reset), ErrorClass::Retry);
    }

    #[test]
    fn test_plain_policy_ignores_message_text() {
        let err = io::Error::other("timed out");
        assert_eq!(PlainPolicy::classify(IoOp::Recv, &err), ErrorClass::Fatal);
    }
}
