//! Byte FIFO backing a channel's tx and rx buffers.
//!
//! Appends go to the back, consumers take from the front. The tx side is
//! drained with `front()` + `consume(n)` so a partial send never copies the
//! unsent tail; the rx side hands out owned `Vec<u8>`s via `take`/`peek`.

use std::collections::VecDeque;

#[derive(Debug, Default, Clone)]
pub struct ByteFifo {
    buf: VecDeque<u8>,
}

impl ByteFifo {
    pub fn new() -> Self {
        Self { buf: VecDeque::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: VecDeque::with_capacity(cap) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append bytes at the back.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend(data);
    }

    /// Copy up to `n` bytes from the front without consuming them.
    pub fn peek(&self, n: usize) -> Vec<u8> {
        self.buf.iter().take(n).copied().collect()
    }

    /// Remove and return up to `n` bytes from the front.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buf.len());
        self.buf.drain(..n).collect()
    }

    /// Longest contiguous run at the front. Non-empty whenever the FIFO is.
    #[inline]
    pub fn front(&self) -> &[u8] {
        self.buf.as_slices().0
    }

    /// Drop `n` bytes from the front (after a successful partial send).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
