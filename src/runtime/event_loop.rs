//! The readiness-driven main loop: one `mio::Poll`, one thread, every
//! connection addressed by its slab index as a mio `Token`.

use super::buffer::Pool;
use super::connection::Connection;
use super::history::History;
use super::protocol::{self, Outcome};
use super::MAX_CONN;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 256;
/// `MAX_CONN` counts the listener as index 0 in the spec's connection
/// table; the slab holds only peers, so its capacity is one less.
const MAX_PEER_CONN: usize = MAX_CONN - 1;

/// Bind the listener and run the server until a fatal I/O error.
pub fn run(port: u16) -> io::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(EVENTS_CAPACITY);

    let std_listener = create_listener(addr)?;
    let mut listener = TcpListener::from_std(std_listener);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut pool = Pool::new();
    let mut history = History::new();
    let mut connections: Slab<Connection> = Slab::with_capacity(MAX_CONN);

    info!(port, "Listening for connections");

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!(error = %e, "Poll failed");
            std::process::exit(1);
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept_connections(&listener, &mut poll, &mut connections),
                Token(conn_id) => {
                    if !connections.contains(conn_id) {
                        continue;
                    }

                    if event.is_readable() {
                        if let Err(e) = handle_readable(
                            conn_id,
                            &mut connections,
                            &mut pool,
                            &mut history,
                        ) {
                            debug!(conn_id, error = %e, "Closing connection");
                            close_connection(&mut poll, &mut connections, &mut pool, conn_id);
                            continue;
                        }
                    }

                    if !connections.contains(conn_id) {
                        continue;
                    }

                    if event.is_writable() {
                        if let Err(e) = handle_writable(conn_id, &mut connections, &mut pool) {
                            error!(conn_id, error = %e, "Send failed");
                            std::process::exit(1);
                        }
                    }

                    if connections.contains(conn_id) {
                        reregister_if_needed(&mut poll, &mut connections, conn_id);
                    }
                }
            }
        }
    }
}

fn accept_connections(listener: &TcpListener, poll: &mut Poll, connections: &mut Slab<Connection>) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if connections.len() >= MAX_PEER_CONN {
                    warn!(peer = %peer_addr, "Connection limit reached, dropping");
                    drop(stream);
                    continue;
                }

                let now = super::history::now();
                let conn_id = connections.insert(Connection::new(stream, now));
                let conn = &mut connections[conn_id];

                if let Err(e) =
                    poll.registry()
                        .register(&mut conn.stream, Token(conn_id), Interest::READABLE)
                {
                    error!(error = %e, "Failed to register new connection");
                    connections.remove(conn_id);
                    continue;
                }

                debug!(conn_id, peer = %peer_addr, "Accepted connection");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                error!(error = %e, "Accept failed");
                std::process::exit(1);
            }
        }
    }
}

/// Read available bytes, frame complete `\r\n`-terminated lines out of the
/// input buffer, and dispatch each one. A line that never terminates
/// before the buffer fills closes the connection: there is no mechanism
/// to grow past `BUF_CAP`.
fn handle_readable(
    conn_id: usize,
    connections: &mut Slab<Connection>,
    pool: &mut Pool,
    history: &mut History,
) -> io::Result<()> {
    loop {
        let conn = &mut connections[conn_id];
        let n = match conn.stream.read(conn.input.spare_mut()) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed")),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        };
        conn.input.advance(n);

        loop {
            let conn = &connections[conn_id];
            let consumed_to = match find_terminator(conn.input.as_slice()) {
                Some(end) => end,
                None => break,
            };
            let line = conn.input.as_slice()[..consumed_to - 2].to_vec();

            match protocol::dispatch_line(connections, conn_id, pool, history, &line) {
                Outcome::Continue => {
                    connections[conn_id].input.consume_prefix(consumed_to);
                }
                Outcome::Close => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "protocol violation"));
                }
            }
        }

        let conn = &connections[conn_id];
        if conn.input.is_full() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n").map(|i| i + 2)
}

/// Drain as much of the send queue as the socket accepts without blocking.
fn handle_writable(
    conn_id: usize,
    connections: &mut Slab<Connection>,
    pool: &mut Pool,
) -> io::Result<()> {
    loop {
        let conn = &mut connections[conn_id];
        let buf_idx = match conn.send_queue.head() {
            Some(idx) => idx,
            None => return Ok(()),
        };

        let written = conn.send_queue.head_written();
        let data = pool.get(buf_idx).as_slice();
        let n = match conn.stream.write(&data[written..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        };

        let total_written = written + n;
        if total_written >= data.len() {
            conn.send_queue.pop_head(pool);
        } else {
            conn.send_queue.set_head_written(total_written);
        }
    }
}

fn reregister_if_needed(poll: &mut Poll, connections: &mut Slab<Connection>, conn_id: usize) {
    let conn = &mut connections[conn_id];
    let desired = conn.desired_interest();
    if desired != conn.registered_interest {
        if poll
            .registry()
            .reregister(&mut conn.stream, Token(conn_id), desired)
            .is_ok()
        {
            conn.registered_interest = desired;
        }
    }
}

fn close_connection(poll: &mut Poll, connections: &mut Slab<Connection>, pool: &mut Pool, conn_id: usize) {
    if let Some(mut conn) = connections.try_remove(conn_id) {
        let _ = poll.registry().deregister(&mut conn.stream);
        while conn.send_queue.head().is_some() {
            conn.send_queue.pop_head(pool);
        }
    }
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    Ok(socket.into())
}
