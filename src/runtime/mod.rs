//! Single-threaded, readiness-driven runtime for the chat relay.
//!
//! One `mio::Poll` instance drives accept, read, and write readiness for
//! every connection from a single thread. There is no worker pool: the
//! protocol is cheap enough per line that multiplexing beats the
//! complexity of sharding connections across threads.

mod buffer;
mod connection;
mod event_loop;
mod history;
pub mod protocol;

use crate::config::Config;

/// Longest nickname, in bytes, accepted by `my name is`.
pub const MAX_NICK: usize = 20;
/// Longest message body, in bytes, accepted by `send`.
pub const MAX_MSG: usize = 140;
/// Width reserved for a rendered `HH:MM:SS` timestamp.
pub const TS_LEN: usize = 10;
/// Per-buffer capacity: a full history line plus its framing punctuation.
pub const BUF_CAP: usize = TS_LEN + MAX_NICK + MAX_MSG + 3;
/// Maximum number of broadcast messages retained for `new` to replay.
pub const MAX_HIST: usize = 50;
/// Maximum number of simultaneously open connections.
pub const MAX_CONN: usize = 1024;
/// Number of fixed-capacity buffers available for outbound data.
pub const POOL_SIZE: usize = 16;

/// Bind the listener and run the event loop until a fatal I/O error.
pub fn run(config: Config) -> std::io::Result<()> {
    event_loop::run(config.port)
}
