//! Reliable game channel: newline-delimited JSON over TCP

use super::protocol::GameMessage;
use super::{NetError, Recv};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest line accepted before the peer is treated as broken
const MAX_LINE: usize = 64 * 1024;

/// One end of an established game connection.
///
/// Bytes read past the end of a line are kept for the next receive, so a
/// timed-out wait never loses a partially received message.
pub struct Channel {
    stream: TcpStream,
    peer: SocketAddr,
    pending: Vec<u8>,
    closed: bool,
}

impl Channel {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(Channel {
            stream,
            peer,
            pending: Vec::new(),
            closed: false,
        })
    }

    /// Connect to a peer at the given address
    pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Self::new(stream)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&mut self, msg: &GameMessage) -> Result<(), NetError> {
        self.stream
            .write_all(&msg.to_line())
            .and_then(|_| self.stream.flush())
            .map_err(|e| match e.kind() {
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    NetError::TransportClosed
                }
                _ => NetError::Io(e),
            })
    }

    /// Block until the next message, the peer closing, or a bad line
    pub fn recv(&mut self) -> Recv<GameMessage> {
        self.recv_until(None)
    }

    /// Like [`Channel::recv`] but gives up after `timeout`
    pub fn recv_timeout(&mut self, timeout: Duration) -> Recv<GameMessage> {
        self.recv_until(Some(Instant::now() + timeout))
    }

    fn recv_until(&mut self, deadline: Option<Instant>) -> Recv<GameMessage> {
        loop {
            if let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return match GameMessage::decode(&line) {
                    Ok(msg) => Recv::Message(msg),
                    Err(e) => Recv::Malformed(e.to_string()),
                };
            }
            if self.closed {
                return Recv::PeerClosed;
            }
            if self.pending.len() > MAX_LINE {
                self.closed = true;
                return Recv::Malformed("line too long".to_string());
            }

            let read_timeout = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Recv::Timeout;
                    }
                    Some(remaining)
                }
                None => None,
            };
            if let Err(e) = self.stream.set_read_timeout(read_timeout) {
                debug!(error = %e, "could not set read timeout");
                return Recv::PeerClosed;
            }

            let mut buf = [0u8; 1024];
            match self.stream.read(&mut buf) {
                Ok(0) => self.closed = true,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Recv::Timeout;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "game channel read failed");
                    self.closed = true;
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    /// Handle that can announce a disconnect from another thread
    pub fn disconnect_handle(&self) -> io::Result<DisconnectHandle> {
        Ok(DisconnectHandle {
            stream: self.stream.try_clone()?,
        })
    }
}

/// Sends `DISCONNECT` and closes the connection, e.g. from an interrupt handler
pub struct DisconnectHandle {
    stream: TcpStream,
}

impl DisconnectHandle {
    /// Best-effort; errors are ignored
    pub fn disconnect(&self, reason: &str) {
        let msg = GameMessage::Disconnect {
            reason: reason.to_string(),
        };
        let mut stream = &self.stream;
        let _ = stream.write_all(&msg.to_line());
        let _ = stream.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
