//! Line-framed request parsing and dispatch.
//!
//! Each request is exactly one line, already split out of a connection's
//! input buffer by the event loop. Matching is purely byte-oriented: no
//! charset decoding is performed, so a nickname or message can carry
//! arbitrary bytes and is only ever copied, never interpreted as UTF-8.

use super::buffer::Pool;
use super::connection::Connection;
use super::history::{format_local_time, now, History};
use super::{MAX_MSG, MAX_NICK};
use slab::Slab;

/// What the event loop should do with the connection after a dispatch.
pub enum Outcome {
    Continue,
    Close,
}

/// Parse and execute one request line against the shared server state.
pub fn dispatch_line(
    connections: &mut Slab<Connection>,
    conn_id: usize,
    pool: &mut Pool,
    history: &mut History,
    line: &[u8],
) -> Outcome {
    if let Some(nick) = line.strip_prefix(b"my name is ") {
        set_name(connections, conn_id, pool, nick)
    } else if line == b"folks" {
        list_folks(connections, conn_id, pool)
    } else if let Some(msg) = line.strip_prefix(b"send ") {
        broadcast(connections, conn_id, pool, history, msg)
    } else if line == b"new" {
        poll_new(connections, conn_id, pool, history)
    } else {
        Outcome::Close
    }
}

fn set_name(connections: &mut Slab<Connection>, conn_id: usize, pool: &mut Pool, nick: &[u8]) -> Outcome {
    if nick.is_empty() || nick.len() > MAX_NICK {
        return Outcome::Close;
    }
    let conn = &mut connections[conn_id];
    conn.nick = nick.to_vec();
    conn.send_queue.send_package(pool, b"ok");
    Outcome::Continue
}

fn list_folks(connections: &mut Slab<Connection>, conn_id: usize, pool: &mut Pool) -> Outcome {
    let names: Vec<Vec<u8>> = connections.iter().map(|(_, c)| c.nick.clone()).collect();

    let conn = &mut connections[conn_id];
    conn.send_queue
        .send_package(pool, names.len().to_string().as_bytes());
    for name in &names {
        conn.send_queue.send_package(pool, name);
    }
    Outcome::Continue
}

fn broadcast(
    connections: &mut Slab<Connection>,
    conn_id: usize,
    pool: &mut Pool,
    history: &mut History,
    msg: &[u8],
) -> Outcome {
    if msg.len() > MAX_MSG {
        return Outcome::Close;
    }
    let nick = connections[conn_id].nick.clone();
    history.append(nick, msg.to_vec(), now());

    connections[conn_id].send_queue.send_package(pool, b"ok");
    Outcome::Continue
}

fn poll_new(connections: &mut Slab<Connection>, conn_id: usize, pool: &mut Pool, history: &History) -> Outcome {
    let cursor = connections[conn_id].last_seen;
    let (count, entries) = history.since(cursor);

    let conn = &mut connections[conn_id];
    conn.send_queue
        .send_package(pool, count.to_string().as_bytes());

    for entry in entries {
        let timestamp = match format_local_time(entry.timestamp) {
            Some(s) => s,
            None => return Outcome::Close,
        };
        conn.send_queue
            .send_package(pool, &format_history_line(&timestamp, &entry.nick, &entry.body));
    }

    conn.last_seen = now();
    Outcome::Continue
}

/// `[HH:MM:SS] <nick>: <msg>`, built over raw bytes since nick/message are
/// not guaranteed to be valid UTF-8.
fn format_history_line(timestamp: &str, nick: &[u8], body: &[u8]) -> Vec<u8> {
    let mut line = Vec::with_capacity(timestamp.len() + nick.len() + body.len() + 6);
    line.push(b'[');
    line.extend_from_slice(timestamp.as_bytes());
    line.extend_from_slice(b"] ");
    line.extend_from_slice(nick);
    line.extend_from_slice(b": ");
    line.extend_from_slice(body);
    line
}
