//! Fixed-capacity buffer pool.
//!
//! All outbound data is held in pool buffers so that no allocation happens
//! on the hot path once the pool is created. The pool is sized for a
//! modest per-connection send depth, not for one buffer per connection;
//! exhaustion means a runaway sender or a misconfiguration, not ordinary
//! load, so it is treated as fatal rather than backpressured.

use super::{BUF_CAP, POOL_SIZE};
use tracing::error;

/// A fixed-capacity byte container. Bytes beyond `used` are undefined.
pub struct Buffer {
    data: [u8; BUF_CAP],
    used: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            data: [0u8; BUF_CAP],
            used: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free_space(&self) -> usize {
        self.data.len() - self.used
    }

    pub fn is_full(&self) -> bool {
        self.used == self.data.len()
    }

    /// Writable remainder of the buffer, starting at `used`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.used..]
    }

    /// Record that `n` more bytes were written into `spare_mut()`.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.used + n <= self.data.len());
        self.used += n;
    }

    /// Append `bytes` into free space, returning how many bytes fit.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free_space());
        self.data[self.used..self.used + n].copy_from_slice(&bytes[..n]);
        self.used += n;
        n
    }

    /// Shift `[from..used]` down to the front and truncate `used` to match,
    /// discarding the consumed prefix. Used after framing a request line.
    pub fn consume_prefix(&mut self, from: usize) {
        debug_assert!(from <= self.used);
        let remaining = self.used - from;
        self.data.copy_within(from..self.used, 0);
        self.used = remaining;
    }

    fn reset(&mut self) {
        self.used = 0;
    }
}

/// Fixed-size freelist of `Buffer`s. Created once at startup; no
/// allocation occurs after that.
pub struct Pool {
    buffers: Vec<Buffer>,
    free: Vec<usize>,
}

impl Pool {
    pub fn new() -> Self {
        let buffers: Vec<Buffer> = (0..POOL_SIZE).map(|_| Buffer::new()).collect();
        let free: Vec<usize> = (0..POOL_SIZE).collect();
        Pool { buffers, free }
    }

    /// Remove a buffer from the free list. Fatal when the pool is
    /// exhausted: the pool is sized against `MAX_CONN` and a modest send
    /// depth, so running out indicates a design violation rather than a
    /// transient condition the process can recover from.
    pub fn take(&mut self) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.buffers[idx].reset();
                idx
            }
            None => {
                error!("buffer pool exhausted: memory limit exceeded");
                std::process::exit(1);
            }
        }
    }

    /// Return a buffer to the free list. The caller must ensure `idx` is
    /// not presently linked into any send queue.
    pub fn release(&mut self, idx: usize) {
        self.free.push(idx);
    }

    pub fn get(&self, idx: usize) -> &Buffer {
        &self.buffers[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Buffer {
        &mut self.buffers[idx]
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_release_round_trip() {
        let mut pool = Pool::new();
        let total = pool.available();

        let a = pool.take();
        let b = pool.take();
        assert_eq!(pool.available(), total - 2);
        assert_ne!(a, b);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), total);
    }

    #[test]
    fn taken_buffer_starts_empty() {
        let mut pool = Pool::new();
        let idx = pool.take();
        pool.get_mut(idx).fill(b"stale");
        pool.release(idx);

        let idx2 = pool.take();
        assert_eq!(pool.get(idx2).used(), 0);
    }

    #[test]
    fn fill_reports_bytes_written_and_stops_at_capacity() {
        let mut buf = Buffer::new();
        let n = buf.fill(&[1u8; 4]);
        assert_eq!(n, 4);
        assert_eq!(buf.used(), 4);

        let huge = vec![2u8; BUF_CAP * 2];
        let n2 = buf.fill(&huge);
        assert_eq!(n2, BUF_CAP - 4);
        assert!(buf.is_full());
    }

    #[test]
    fn consume_prefix_shifts_tail_to_front() {
        let mut buf = Buffer::new();
        buf.fill(b"abc\r\ndef");
        buf.consume_prefix(5);
        assert_eq!(buf.as_slice(), b"def");
    }
}
