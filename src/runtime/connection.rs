//! Per-connection state: nickname, history cursor, input buffer, and the
//! outbound send queue.

use super::buffer::{Buffer, Pool};
use mio::net::TcpStream;
use mio::Interest;
use std::collections::VecDeque;

/// Default nickname assigned to a freshly accepted connection.
pub const DEFAULT_NICK: &[u8] = b"anonym";

/// FIFO of pool buffers carrying bytes pending transmission on one
/// connection. Every buffer but the tail is full; the tail accepts more
/// bytes until it saturates, at which point a fresh buffer becomes the
/// new tail.
#[derive(Default)]
pub struct SendQueue {
    buffers: VecDeque<usize>,
    /// Bytes of the head buffer already written to the socket.
    head_written: usize,
}

impl SendQueue {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn head(&self) -> Option<usize> {
        self.buffers.front().copied()
    }

    pub fn head_written(&self) -> usize {
        self.head_written
    }

    pub fn set_head_written(&mut self, n: usize) {
        self.head_written = n;
    }

    /// Drop the head buffer once it has been fully transmitted, releasing
    /// it back to the pool and resetting the write cursor for the new
    /// head.
    pub fn pop_head(&mut self, pool: &mut Pool) {
        if let Some(idx) = self.buffers.pop_front() {
            pool.release(idx);
        }
        self.head_written = 0;
    }

    /// Append `bytes` onto the queue, pulling fresh buffers from `pool` as
    /// the current tail saturates. A single call may span multiple
    /// buffers.
    pub fn enqueue(&mut self, pool: &mut Pool, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let tail = match self.buffers.back().copied() {
                Some(idx) if !pool.get(idx).is_full() => idx,
                _ => {
                    let idx = pool.take();
                    self.buffers.push_back(idx);
                    idx
                }
            };
            let n = pool.get_mut(tail).fill(bytes);
            bytes = &bytes[n..];
        }
    }

    /// `enqueue` followed by a line terminator; the only path the
    /// protocol layer uses to produce output.
    pub fn send_package(&mut self, pool: &mut Pool, text: &[u8]) {
        self.enqueue(pool, text);
        self.enqueue(pool, b"\r\n");
    }

    #[cfg(test)]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

/// One peer connection.
pub struct Connection {
    pub stream: TcpStream,
    pub nick: Vec<u8>,
    /// Cursor for `new`: entries strictly newer than this are unseen.
    pub last_seen: i64,
    pub input: Buffer,
    pub send_queue: SendQueue,
    /// Readiness currently registered with the poller. Readable and
    /// writable are never both registered at once: a connection with
    /// pending output is not also read from.
    pub registered_interest: Interest,
}

impl Connection {
    pub fn new(stream: TcpStream, now: i64) -> Self {
        Connection {
            stream,
            nick: DEFAULT_NICK.to_vec(),
            last_seen: now,
            input: Buffer::new(),
            send_queue: SendQueue::default(),
            registered_interest: Interest::READABLE,
        }
    }

    /// The interest the connection *should* have registered, given its
    /// current send queue. The event loop reregisters with the poller
    /// whenever this differs from `registered_interest`.
    pub fn desired_interest(&self) -> Interest {
        if self.send_queue.is_empty() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::buffer::Pool;

    #[test]
    fn enqueue_spans_multiple_buffers_when_needed() {
        let mut pool = Pool::new();
        let mut queue = SendQueue::default();

        let big = vec![b'x'; crate::runtime::BUF_CAP * 2 + 5];
        queue.enqueue(&mut pool, &big);

        assert!(queue.buffer_count() >= 2);
        let mut total = 0;
        for _ in 0..queue.buffer_count() {
            let idx = queue.head().unwrap();
            total += pool.get(idx).used();
            queue.pop_head(&mut pool);
        }
        assert_eq!(total, big.len());
    }

    #[test]
    fn send_package_appends_crlf() {
        let mut pool = Pool::new();
        let mut queue = SendQueue::default();
        queue.send_package(&mut pool, b"ok");

        let idx = queue.head().unwrap();
        assert_eq!(pool.get(idx).as_slice(), b"ok\r\n");
    }

    #[test]
    fn empty_queue_wants_readable() {
        let queue = SendQueue::default();
        assert!(queue.is_empty());
    }
}
