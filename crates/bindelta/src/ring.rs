//! Bounded circular byte queue
//!
//! Decouples the decompressor's output rate from the patch applier's
//! consumption rate: the decoder inserts bursts as they come off the
//! inflater, the applier pops exactly what the current control triple needs.
//!
//! Not safe for concurrent access: the contract assumes at most one
//! inserting party and one removing party, never simultaneously. Callers
//! needing concurrency must serialize externally.

use crate::error::Result;

/// Fixed-capacity FIFO byte queue backed by a circular buffer
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    head: usize,
    used: usize,
}

impl RingBuffer {
    /// Create a queue holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)?;
        buf.resize(capacity, 0);
        Ok(Self {
            buf: buf.into_boxed_slice(),
            head: 0,
            used: 0,
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.used
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Remaining room in bytes.
    pub fn available(&self) -> usize {
        self.buf.len() - self.used
    }

    /// Queue up to `data.len()` bytes; returns how many were accepted.
    /// Accepts less than requested when the queue is (or becomes) full.
    pub fn insert(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available());
        if n == 0 {
            return 0;
        }
        let tail = (self.head + self.used) % self.buf.len();
        let first = n.min(self.buf.len() - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.used += n;
        n
    }

    /// Copy up to `out.len()` queued bytes starting `offset` bytes past the
    /// head, without consuming them. Returns the number copied.
    pub fn peek(&self, offset: usize, out: &mut [u8]) -> usize {
        if offset >= self.used {
            return 0;
        }
        let n = out.len().min(self.used - offset);
        let start = (self.head + offset) % self.buf.len();
        let first = n.min(self.buf.len() - start);
        out[..first].copy_from_slice(&self.buf[start..start + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        n
    }

    /// Copy and consume up to `out.len()` bytes from the head.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(0, out);
        self.delete(n)
    }

    /// Drop up to `count` bytes from the head; returns how many were
    /// dropped.
    pub fn delete(&mut self, count: usize) -> usize {
        let n = count.min(self.used);
        if n == 0 {
            return 0;
        }
        self.head = (self.head + n) % self.buf.len();
        self.used -= n;
        n
    }
}
