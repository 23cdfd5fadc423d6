//! TCP client for the lobby

use super::protocol::{LobbyReply, LobbyRequest};
use crate::game::StatusSink;
use crate::storage::StatusDelta;
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to wait for a reply before giving up
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `sign_off_now` waits for a request in flight on another thread
const SIGN_OFF_LOCK_WAIT: Duration = Duration::from_millis(200);

struct Inner {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    username: Option<String>,
}

/// Shared connection to the lobby.
///
/// Clones share one stream; a request and its reply are exchanged under one
/// lock so the heartbeat thread never reads another caller's reply.
#[derive(Clone)]
pub struct LobbyClient {
    addr: SocketAddr,
    inner: Arc<Mutex<Inner>>,
}

impl LobbyClient {
    /// Connect to a lobby at `addr` ("host:port")
    pub fn connect(addr: &str) -> io::Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "could not resolve address"))?;
        let stream = TcpStream::connect_timeout(&addr, REPLY_TIMEOUT)?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        stream.set_write_timeout(Some(REPLY_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);

        Ok(LobbyClient {
            addr,
            inner: Arc::new(Mutex::new(Inner {
                writer: stream,
                reader,
                username: None,
            })),
        })
    }

    /// Get the lobby's address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Username of the last successful login, if still signed in
    pub fn username(&self) -> Option<String> {
        self.inner.lock().username.clone()
    }

    fn request(&self, request: &LobbyRequest) -> io::Result<LobbyReply> {
        let mut inner = self.inner.lock();
        inner.writer.write_all(request.to_line().as_bytes())?;
        inner.writer.flush()?;

        let mut line = String::new();
        if inner.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "lobby closed the connection"));
        }
        LobbyReply::parse(&line).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognised lobby reply: {}", line.trim()),
            )
        })
    }

    pub fn register(&self, username: &str, password: &str) -> io::Result<LobbyReply> {
        self.request(&LobbyRequest::Register {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Log in; on success the username is remembered for status reports
    pub fn login(&self, username: &str, password: &str) -> io::Result<LobbyReply> {
        let reply = self.request(&LobbyRequest::Login {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        if matches!(reply, LobbyReply::LoginSuccess(_)) {
            self.inner.lock().username = Some(username.to_string());
        }
        Ok(reply)
    }

    /// Push a status report. Fire-and-forget; the lobby sends no reply.
    pub fn status_report(&self, delta: StatusDelta) {
        let mut inner = self.inner.lock();
        let Some(username) = inner.username.clone() else {
            return;
        };
        let line = LobbyRequest::StatusReport {
            username,
            status: delta,
        }
        .to_line();
        if let Err(e) = inner.writer.write_all(line.as_bytes()) {
            debug!(error = %e, "status report not delivered");
        }
    }

    /// Log out if signed in. Best-effort; failures are logged.
    pub fn logout(&self) {
        let Some(username) = self.inner.lock().username.take() else {
            return;
        };
        match self.request(&LobbyRequest::Logout { username }) {
            Ok(LobbyReply::LogoutOk) => debug!("logged out"),
            Ok(other) => warn!(reply = ?other, "unexpected logout reply"),
            Err(e) => debug!(error = %e, "logout not acknowledged"),
        }
    }
}

impl LobbyClient {
    /// Write an idle status report and a logout without waiting for the reply.
    ///
    /// For process exit. Gives up if another request holds the connection for
    /// longer than `SIGN_OFF_LOCK_WAIT`.
    pub fn sign_off_now(&self) {
        let Some(mut inner) = self.inner.try_lock_for(SIGN_OFF_LOCK_WAIT) else {
            debug!("lobby connection busy, skipping sign-off");
            return;
        };
        let Some(username) = inner.username.take() else {
            return;
        };
        let mut lines = LobbyRequest::StatusReport {
            username: username.clone(),
            status: StatusDelta::idle(),
        }
        .to_line();
        lines.push_str(&LobbyRequest::Logout { username }.to_line());
        if let Err(e) = inner.writer.write_all(lines.as_bytes()) {
            debug!(error = %e, "sign-off not delivered");
        }
    }
}

impl StatusSink for LobbyClient {
    fn report(&self, delta: StatusDelta) {
        self.status_report(delta);
    }
}
