use crate::{SERVER, protocol, storage::Keyspace, util::would_block};
use log::{debug, info, trace};
use mio::{
    Interest, Token,
    net::{TcpListener, TcpStream},
};
use std::{
    collections::HashMap,
    io::{self, Read, Write},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    WantRead,
    WantWrite,
    WantClose,
}

#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub token: mio::Token,
    state: ConnectionState,
    pub incoming: Vec<u8>,
    pub outgoing: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream, token: mio::Token) -> Self {
        Self {
            stream,
            token,
            state: ConnectionState::WantRead,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::WantClose;
    }

    pub fn want_read(&self) -> bool {
        matches!(self.state, ConnectionState::WantRead)
    }
    pub fn want_write(&self) -> bool {
        matches!(self.state, ConnectionState::WantWrite)
    }
    pub fn want_close(&self) -> bool {
        matches!(self.state, ConnectionState::WantClose)
    }

    /// Drains the socket, then runs every complete request against `keyspace`
    pub fn on_read(&mut self, keyspace: &mut Keyspace) -> io::Result<()> {
        assert_eq!(
            ConnectionState::WantRead,
            self.state,
            "calling read on non WantRead state"
        );
        let mut buf = [0; 1024 * 64];
        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => {
                    trace!(target:"on_read", "{}", if self.incoming.is_empty() { "client dropped connection" } else { "unexpected eof" } );
                    // let the main loop close the connection
                    self.close();
                    return Ok(());
                }
                Ok(n) => n,
                Err(ref e) if would_block(e) => {
                    break;
                }
                Err(ref e) if crate::util::interrupted(e) => continue,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            self.incoming.extend_from_slice(&buf[..n]);
        }

        trace!(target: "on_read", "buffered {} bytes", self.incoming.len());

        let mut last_state;
        loop {
            // WantWrite means one request was answered, try the next
            last_state = self.try_one_request(keyspace);
            if last_state != ConnectionState::WantWrite {
                break;
            }
        }

        if last_state == ConnectionState::WantClose {
            self.close();
            return Ok(());
        }

        if !self.outgoing.is_empty() {
            // skip one round trip through poll
            self.state = ConnectionState::WantWrite;
            return self.on_write();
        }
        self.state = last_state;
        Ok(())
    }

    pub fn on_write(&mut self) -> io::Result<()> {
        assert_eq!(
            ConnectionState::WantWrite,
            self.state,
            "calling write on non WantWrite state"
        );
        assert!(!self.outgoing.is_empty(), "calling write on empty buffer");

        let n = match self.stream.write(&self.outgoing) {
            Ok(0) => {
                info!(target: "on_write", "wrote 0 bytes to buffer");
                self.close();
                return Ok(());
            }
            Ok(n) => n,
            Err(ref e) if would_block(e) => return Ok(()),
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        trace!(target: "on_write", "wrote {} bytes, out of {}", n, self.outgoing.len());
        self.outgoing.drain(..n);

        if self.outgoing.is_empty() {
            self.state = ConnectionState::WantRead;
        } else {
            self.state = ConnectionState::WantWrite;
        }

        Ok(())
    }

    /// Tries to parse and execute one request, returning the new state
    /// for the connection:
    /// -   **WantWrite:** one request was executed and its response is in
    ///     the outgoing buffer
    ///
    /// -   **WantRead:** not enough bytes for a whole request yet
    ///
    /// -   **WantClose:** protocol error, the main loop should drop the connection
    fn try_one_request(&mut self, keyspace: &mut Keyspace) -> ConnectionState {
        use protocol::ParseError::*;

        if self.incoming.is_empty() {
            return ConnectionState::WantRead;
        }

        let result = protocol::parse_request(&self.incoming)
            .inspect_err(|e| trace!(target: "parse_request", "{e}"));

        let (cmd, offset) = match result {
            Ok(v) => v,
            Err(ProtocolError) => return ConnectionState::WantClose,
            Err(NotEnoughBytes { .. }) => return ConnectionState::WantRead,
        };

        self.incoming.drain(..offset);
        debug!(target: "on_request", "{:?}", cmd.first());
        protocol::request::handle_and_encode_request(&cmd, keyspace, &mut self.outgoing);

        ConnectionState::WantWrite
    }
}

pub struct ConnectionManager {
    pub map: HashMap<Token, Connection>,
    token_gen: TokenGen,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            token_gen: TokenGen::new(),
        }
    }

    /// Accepts one pending connection. Returns `false` once there is none left.
    pub fn handle_accept(&mut self, server: &TcpListener, poll: &mio::Poll) -> io::Result<bool> {
        let stream = match server.accept() {
            Ok((s, _)) => s,
            Err(ref e) if would_block(e) => return Ok(false),
            Err(e) => return Err(e),
        };
        trace!("new connection from {}", stream.peer_addr()?);

        let token = self.token_gen.next();
        let mut conn = Connection::new(stream, token);

        poll.registry().register(
            &mut conn.stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        self.map.insert(token, conn);
        Ok(true)
    }

    pub fn handle_close(&mut self, poll: &mio::Poll, token: mio::Token) -> io::Result<()> {
        let Some(mut conn) = self.map.remove(&token) else {
            return Ok(());
        };
        trace!("closing connection {}", token.0);
        poll.registry().deregister(&mut conn.stream)
    }

    pub fn get_connection_mut(&mut self, t: &Token) -> Option<&mut Connection> {
        self.map.get_mut(t)
    }
}

struct TokenGen {
    next: usize,
}

impl TokenGen {
    pub const fn new() -> Self {
        Self { next: SERVER.0 + 1 }
    }
    pub fn next(&mut self) -> mio::Token {
        let t = mio::Token(self.next);
        self.next += 1;
        t
    }
}

#[cfg(test)]
mod test {
    use std::io::{ErrorKind, Read, Write};
    use std::time::{Duration, Instant};

    use mio::net::TcpListener;
    use mio::{Events, Interest, Poll};

    use super::ConnectionManager;
    use crate::SERVER;
    use crate::protocol::request::{RES_NX, RES_OK};
    use crate::protocol::{encode_request, parse_response};
    use crate::storage::Keyspace;

    #[test]
    fn serves_pipelined_requests() {
        let mut poll = Poll::new().unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        poll.registry()
            .register(&mut listener, SERVER, Interest::READABLE)
            .unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();

        let mut manager = ConnectionManager::new();
        let mut keyspace = Keyspace::new(Duration::from_millis(1));
        let mut events = Events::with_capacity(16);
        let deadline = Instant::now() + Duration::from_secs(5);

        while manager.map.is_empty() && Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(10))).unwrap();
            while manager.handle_accept(&listener, &poll).unwrap() {}
        }
        let token = *manager.map.keys().next().unwrap();

        let mut req = Vec::new();
        encode_request(&["set", "a", "1"], &mut req);
        encode_request(&["get", "a"], &mut req);
        encode_request(&["get", "b"], &mut req);
        client.write_all(&req).unwrap();

        let mut received = Vec::new();
        let mut responses = Vec::new();
        let mut buf = [0; 1024];
        while responses.len() < 3 && Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(10))).unwrap();
            let conn = manager.get_connection_mut(&token).unwrap();
            if conn.want_read() {
                conn.on_read(&mut keyspace).unwrap();
            }
            if conn.want_write() {
                conn.on_write().unwrap();
            }

            match client.read(&mut buf) {
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => panic!("client read failed: {e}"),
            }
            while let Ok((status, payload, used)) = parse_response(&received) {
                responses.push((status, payload.to_vec()));
                received.drain(..used);
            }
        }

        assert_eq!(
            responses,
            [
                (RES_OK, b"1".to_vec()),
                (RES_OK, b"1".to_vec()),
                (RES_NX, vec![])
            ]
        );
        assert_eq!(keyspace.len(), 1);

        drop(client);
        manager.handle_close(&poll, token).unwrap();
        assert!(manager.map.is_empty());
    }
}
