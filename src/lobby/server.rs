//! Threaded TCP front end for the lobby
//!
//! One worker thread per accepted connection, plus a liveness sweep thread.

use super::protocol::{decode_request, DecodedRequest, LobbyReply, LobbyRequest};
use super::{ConnectionHandle, ConnectionId, LobbyError, LobbyService};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A running lobby server
pub struct LobbyServer {
    addr: SocketAddr,
    service: Arc<LobbyService>,
    running: Arc<AtomicBool>,
    players: Arc<AtomicUsize>,
    sweep_stop: Option<Sender<()>>,
    acceptor: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl LobbyServer {
    /// Bind `bind_addr`, clear stale online flags, and start the acceptor and sweep threads
    pub fn start(
        bind_addr: &str,
        service: Arc<LobbyService>,
        sweep_interval: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        match service.store().reset_online_flags() {
            Ok(0) => {}
            Ok(n) => info!(count = n, "cleared stale online flags"),
            Err(e) => warn!(error = %e, "failed to clear online flags"),
        }

        let running = Arc::new(AtomicBool::new(true));
        let players = Arc::new(AtomicUsize::new(0));

        let acceptor = {
            let service = Arc::clone(&service);
            let running = Arc::clone(&running);
            let players = Arc::clone(&players);
            thread::spawn(move || accept_loop(listener, service, running, players))
        };

        let (sweep_stop, sweep_rx) = channel();
        let sweeper = {
            let service = Arc::clone(&service);
            thread::spawn(move || sweep_loop(service, sweep_interval, sweep_rx))
        };

        info!(addr = %addr, "lobby listening");

        Ok(LobbyServer {
            addr,
            service,
            running,
            players,
            sweep_stop: Some(sweep_stop),
            acceptor: Some(acceptor),
            sweeper: Some(sweeper),
        })
    }

    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn service(&self) -> &Arc<LobbyService> {
        &self.service
    }

    /// Number of currently connected peers
    pub fn player_count(&self) -> usize {
        self.players.load(Ordering::SeqCst)
    }

    /// Check if the server is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting connections and stop the sweep
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.sweep_stop.take();
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LobbyServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    service: Arc<LobbyService>,
    running: Arc<AtomicBool>,
    players: Arc<AtomicUsize>,
) {
    let next_id = AtomicU64::new(1);
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let handle = ConnectionHandle {
                    id: ConnectionId(next_id.fetch_add(1, Ordering::SeqCst)),
                    addr,
                };
                let count = players.fetch_add(1, Ordering::SeqCst) + 1;
                info!(peer = %addr, players = count, "peer connected");

                let service = Arc::clone(&service);
                let players = Arc::clone(&players);
                thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, handle, &service) {
                        debug!(peer = %addr, error = %e, "connection ended with error");
                    }
                    let count = players.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                    info!(peer = %addr, players = count, "peer disconnected");
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                break;
            }
        }
    }
}

fn sweep_loop(service: Arc<LobbyService>, interval: Duration, stop: Receiver<()>) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let expired = service.sweep_once(Instant::now());
                if !expired.is_empty() {
                    debug!(count = expired.len(), "sweep expired sessions");
                }
            }
            _ => break,
        }
    }
}

/// Per-connection worker: read request lines until the peer closes
fn serve_connection(
    stream: TcpStream,
    handle: ConnectionHandle,
    service: &LobbyService,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    let mut bound: Option<String> = None;

    let result = read_requests(reader, &mut writer, handle, service, &mut bound);

    if let Some(username) = bound.take() {
        service.disconnect(&username, handle.id);
    }
    result
}

fn read_requests(
    reader: BufReader<TcpStream>,
    writer: &mut TcpStream,
    handle: ConnectionHandle,
    service: &LobbyService,
    bound: &mut Option<String>,
) -> io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = handle_line(service, &line, handle, bound, Instant::now()) {
            writer.write_all(reply.to_line().as_bytes())?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Decode and dispatch one request line.
///
/// `bound` tracks the username this connection logged in as, so teardown can
/// release it. Returns the reply to send, if any.
pub(crate) fn handle_line(
    service: &LobbyService,
    line: &str,
    handle: ConnectionHandle,
    bound: &mut Option<String>,
    now: Instant,
) -> Option<LobbyReply> {
    let request = match decode_request(line) {
        DecodedRequest::Request(request) => request,
        DecodedRequest::UnknownAction(action) => {
            warn!(peer = %handle.addr, action = %action, "unknown lobby action");
            return Some(LobbyReply::ErrorUnknownAction);
        }
        DecodedRequest::Malformed(reason) => {
            warn!(peer = %handle.addr, reason = %reason, "dropping malformed lobby request");
            return None;
        }
    };

    service.touch(request.username(), handle.id, now);

    match request {
        LobbyRequest::Register { username, password } => {
            Some(match service.register(&username, &password) {
                Ok(()) => LobbyReply::RegisterSuccess,
                Err(LobbyError::DuplicateUser(_)) => LobbyReply::RegisterFailedUserExists,
                Err(e) => {
                    error!(username = %username, error = %e, "register failed");
                    LobbyReply::RegisterFailed
                }
            })
        }
        LobbyRequest::Login { username, password } => {
            Some(match service.login(&username, &password, handle, now) {
                Ok(record) => {
                    if let Some(previous) = bound.replace(username) {
                        if Some(&previous) != bound.as_ref() {
                            service.disconnect(&previous, handle.id);
                        }
                    }
                    LobbyReply::LoginSuccess(record)
                }
                Err(e) => {
                    info!(username = %username, reason = %e, "login rejected");
                    match e {
                        LobbyError::NoSuchUser(_) => LobbyReply::LoginFailedNoUser,
                        LobbyError::BadCredential(_) => LobbyReply::LoginFailedWrongPassword,
                        LobbyError::AlreadyActive(_) => LobbyReply::LoginFailedDuplicate,
                        _ => LobbyReply::LoginFailed,
                    }
                }
            })
        }
        LobbyRequest::StatusReport { username, status } => {
            let signed_in = bound.as_deref() == Some(username.as_str());
            service.status_report(&username, handle, signed_in, &status, now);
            None
        }
        LobbyRequest::Logout { username } => {
            service.logout(&username);
            if bound.as_deref() == Some(username.as_str()) {
                *bound = None;
            }
            Some(LobbyReply::LogoutOk)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PresenceStore, StatusDelta};

    fn service() -> LobbyService {
        LobbyService::new(
            Arc::new(PresenceStore::open_in_memory().unwrap()),
            Duration::from_secs(15),
        )
    }

    fn conn(id: u64) -> ConnectionHandle {
        ConnectionHandle {
            id: ConnectionId(id),
            addr: "127.0.0.1:40000".parse().unwrap(),
        }
    }

    fn request(line: &str, service: &LobbyService, bound: &mut Option<String>) -> Option<LobbyReply> {
        handle_line(service, line, conn(1), bound, Instant::now())
    }

    #[test]
    fn test_dispatch_register_and_login() {
        let service = service();
        let mut bound = None;

        let reg = r#"{"action":"register","username":"alice","password":"pw"}"#;
        assert_eq!(request(reg, &service, &mut bound), Some(LobbyReply::RegisterSuccess));
        assert_eq!(
            request(reg, &service, &mut bound),
            Some(LobbyReply::RegisterFailedUserExists)
        );

        let bad = r#"{"action":"login","username":"alice","password":"nope"}"#;
        assert_eq!(
            request(bad, &service, &mut bound),
            Some(LobbyReply::LoginFailedWrongPassword)
        );
        assert!(bound.is_none());

        let good = r#"{"action":"login","username":"alice","password":"pw"}"#;
        assert!(matches!(
            request(good, &service, &mut bound),
            Some(LobbyReply::LoginSuccess(record)) if record.login_count == 1
        ));
        assert_eq!(bound.as_deref(), Some("alice"));
    }

    #[test]
    fn test_dispatch_status_report_has_no_reply() {
        let service = service();
        let mut bound = None;
        let line = r#"{"action":"status_report","username":"alice","status":{"wins_delta":1,"losses_delta":0,"in_game":false}}"#;
        assert_eq!(request(line, &service, &mut bound), None);
    }

    #[test]
    fn test_dispatch_unknown_and_malformed() {
        let service = service();
        let mut bound = None;
        assert_eq!(
            request(r#"{"action":"fly"}"#, &service, &mut bound),
            Some(LobbyReply::ErrorUnknownAction)
        );
        assert_eq!(request("{{{", &service, &mut bound), None);
    }

    #[test]
    fn test_dispatch_logout_clears_binding() {
        let service = service();
        let mut bound = None;
        service.register("alice", "pw").unwrap();
        request(
            r#"{"action":"login","username":"alice","password":"pw"}"#,
            &service,
            &mut bound,
        );
        assert_eq!(
            request(r#"{"action":"logout","username":"alice"}"#, &service, &mut bound),
            Some(LobbyReply::LogoutOk)
        );
        assert!(bound.is_none());
    }

    fn send_line(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &str) -> String {
        stream.write_all(line.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        reply
    }

    #[test]
    fn test_server_round_trip_and_teardown() {
        let service = Arc::new(service());
        service.register("alice", "pw").unwrap();
        let mut server =
            LobbyServer::start("127.0.0.1:0", Arc::clone(&service), Duration::from_secs(10)).unwrap();

        let mut stream = TcpStream::connect(server.addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let reply = send_line(
            &mut stream,
            &mut reader,
            r#"{"action":"login","username":"alice","password":"pw"}"#,
        );
        assert!(matches!(LobbyReply::parse(&reply), Some(LobbyReply::LoginSuccess(_))));

        // second connection is rejected while the first is live
        let mut other = TcpStream::connect(server.addr()).unwrap();
        let mut other_reader = BufReader::new(other.try_clone().unwrap());
        let reply = send_line(
            &mut other,
            &mut other_reader,
            r#"{"action":"login","username":"alice","password":"pw"}"#,
        );
        assert_eq!(reply, "LOGIN_FAILED_DUPLICATE\n");

        drop(reader);
        drop(stream);

        let deadline = Instant::now() + Duration::from_secs(2);
        while service.store().presence("alice").unwrap().unwrap().online {
            assert!(Instant::now() < deadline, "teardown did not mark alice offline");
            thread::sleep(Duration::from_millis(20));
        }

        let reply = send_line(
            &mut other,
            &mut other_reader,
            r#"{"action":"login","username":"alice","password":"pw"}"#,
        );
        assert!(reply.starts_with(r#"{"type":"LOGIN_SUCCESS""#));
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn test_status_report_from_stranger_cannot_hold_session() {
        let service = Arc::new(service());
        service.register("bob", "pw").unwrap();
        let mut server =
            LobbyServer::start("127.0.0.1:0", Arc::clone(&service), Duration::from_secs(10)).unwrap();

        let mut stranger = TcpStream::connect(server.addr()).unwrap();
        stranger
            .write_all(b"{\"action\":\"status_report\",\"username\":\"bob\"}\n")
            .unwrap();
        // a reply to the next request proves the report was handled
        let mut stranger_reader = BufReader::new(stranger.try_clone().unwrap());
        assert_eq!(
            send_line(&mut stranger, &mut stranger_reader, r#"{"action":"fly"}"#),
            "ERROR_UNKNOWN_ACTION\n"
        );
        assert!(!service.store().presence("bob").unwrap().unwrap().online);
        assert_eq!(service.registry().len(), 0);

        let mut owner = TcpStream::connect(server.addr()).unwrap();
        let mut owner_reader = BufReader::new(owner.try_clone().unwrap());
        let reply = send_line(
            &mut owner,
            &mut owner_reader,
            r#"{"action":"login","username":"bob","password":"pw"}"#,
        );
        assert!(matches!(LobbyReply::parse(&reply), Some(LobbyReply::LoginSuccess(_))));

        drop(stranger_reader);
        drop(stranger);
        thread::sleep(Duration::from_millis(200));
        assert!(service.store().presence("bob").unwrap().unwrap().online);
        assert_eq!(service.registry().len(), 1);
        server.stop();
    }

    #[test]
    fn test_server_start_clears_online_flags() {
        let store = Arc::new(PresenceStore::open_in_memory().unwrap());
        store.create_user("alice", "hash").unwrap();
        store.record_login("alice").unwrap();
        store
            .apply_status("alice", &StatusDelta::idle(), Some(true))
            .unwrap();

        let service = Arc::new(LobbyService::new(Arc::clone(&store), Duration::from_secs(15)));
        let _server = LobbyServer::start("127.0.0.1:0", service, Duration::from_secs(10)).unwrap();
        assert!(!store.presence("alice").unwrap().unwrap().online);
    }
}
