//! UDP discovery, invitation, and TCP rendezvous
//!
//! Inviting side: `scan` → `invite` → `rendezvous`.
//! Invited side: a [`Listener`] state machine that answers searches, asks an
//! [`InviteResponder`] about invitations, and connects once the inviter
//! advertises its TCP port.

use super::channel::Channel;
use super::protocol::{Datagram, MAX_DATAGRAM};
use super::NetError;
use crate::config::DiscoveryConfig;
use std::fmt;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long an idle listener blocks before returning control to its caller
const LISTEN_POLL: Duration = Duration::from_millis(500);

/// A peer that answered a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCandidate {
    pub addr: SocketAddr,
    pub name: String,
}

impl fmt::Display for PeerCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.addr)
    }
}

/// Result of inviting one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    Accepted,
    Declined,
    TimedOut,
}

/// Receive one datagram before `deadline`.
///
/// `Ok(None)` on timeout. Undecodable datagrams are logged and skipped.
fn recv_datagram(
    socket: &UdpSocket,
    deadline: Instant,
) -> io::Result<Option<(Datagram, SocketAddr)>> {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        socket.set_read_timeout(Some(remaining))?;
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => match Datagram::decode(&buf[..n]) {
                Ok(datagram) => return Ok(Some((datagram, from))),
                Err(e) => debug!(peer = %from, error = %e, "dropping malformed datagram"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn send_datagram(socket: &UdpSocket, datagram: &Datagram, to: SocketAddr) -> Result<(), NetError> {
    socket.send_to(&datagram.encode(), to)?;
    Ok(())
}

/// The inviting side's UDP endpoint
pub struct Scanner {
    socket: UdpSocket,
    name: String,
    config: DiscoveryConfig,
}

impl Scanner {
    /// Bind an ephemeral broadcast-capable UDP socket
    pub fn bind(config: &DiscoveryConfig, name: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;
        Ok(Scanner {
            socket,
            name: name.to_string(),
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Probe every port in the configured range once.
    ///
    /// Each port gets one SEARCH, then every REPLY from that exact port is
    /// collected until the per-port timeout. Several hosts may answer on the
    /// same port; results are deduplicated by address. An empty result means
    /// nobody is listening.
    pub fn scan(&self) -> Vec<PeerCandidate> {
        let mut found: Vec<PeerCandidate> = Vec::new();
        for port in self.config.scan_ports() {
            let target = SocketAddr::new(self.config.broadcast_addr, port);
            if let Err(e) = send_datagram(&self.socket, &Datagram::Search, target) {
                debug!(port, error = %e, "search not sent");
                continue;
            }

            let deadline = Instant::now() + self.config.scan_timeout();
            loop {
                match recv_datagram(&self.socket, deadline) {
                    Ok(Some((Datagram::Reply { name }, from))) if from.port() == port => {
                        if !found.iter().any(|c| c.addr == from) {
                            info!(peer = %from, name = %name, "found player");
                            found.push(PeerCandidate { addr: from, name });
                        }
                    }
                    Ok(Some((other, from))) => {
                        debug!(peer = %from, message = ?other, "ignoring datagram while scanning");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(port, error = %e, "scan receive failed");
                        break;
                    }
                }
            }
        }
        found
    }

    /// Invite `target` and wait for its answer, resending on the retry interval
    pub fn invite(&self, target: &PeerCandidate) -> Result<InviteOutcome, NetError> {
        let invite = Datagram::Invite {
            from: self.name.clone(),
        };
        let window_end = Instant::now() + self.config.invite_window();
        let retry = self.config.invite_retry();

        send_datagram(&self.socket, &invite, target.addr)?;
        let mut last_send = Instant::now();
        info!(peer = %target.addr, name = %target.name, "invitation sent");

        while Instant::now() < window_end {
            let deadline = (last_send + retry).min(window_end);
            match recv_datagram(&self.socket, deadline)? {
                Some((Datagram::Accept, from)) if from == target.addr => {
                    return Ok(InviteOutcome::Accepted);
                }
                Some((Datagram::Decline, from)) if from == target.addr => {
                    return Ok(InviteOutcome::Declined);
                }
                Some((other, from)) => {
                    debug!(peer = %from, message = ?other, "ignoring datagram while inviting");
                }
                None => {
                    if last_send.elapsed() >= retry && Instant::now() < window_end {
                        debug!(peer = %target.addr, "resending invitation");
                        send_datagram(&self.socket, &invite, target.addr)?;
                        last_send = Instant::now();
                    }
                }
            }
        }
        Ok(InviteOutcome::TimedOut)
    }

    /// Tell `target` the accepted invitation is withdrawn
    pub fn cancel(&self, target: &PeerCandidate) {
        if let Err(e) = send_datagram(&self.socket, &Datagram::Cancel, target.addr) {
            debug!(peer = %target.addr, error = %e, "cancel not sent");
        }
    }

    /// Open the TCP listener, advertise it, and accept the invited peer.
    ///
    /// Only a connection from the target's IP is accepted; others are closed.
    pub fn rendezvous(&self, target: &PeerCandidate) -> Result<Channel, NetError> {
        let listener = match bind_in_range(self.config.tcp_base_port, self.config.tcp_port_attempts) {
            Some(listener) => listener,
            None => {
                warn!(
                    base = self.config.tcp_base_port,
                    attempts = self.config.tcp_port_attempts,
                    "no available TCP port in range"
                );
                self.cancel(target);
                return Err(NetError::ResourceExhaustion);
            }
        };
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;
        if port != self.config.tcp_base_port {
            info!(base = self.config.tcp_base_port, port, "TCP base port in use, switched");
        }

        send_datagram(&self.socket, &Datagram::TcpInfo { port }, target.addr)?;
        info!(port, peer = %target.addr, "waiting for peer to connect");

        let deadline = Instant::now() + self.config.accept_timeout();
        while Instant::now() < deadline {
            match listener.accept() {
                Ok((stream, from)) if from.ip() == target.addr.ip() => {
                    info!(peer = %from, name = %target.name, "peer connected");
                    return Ok(Channel::new(stream)?);
                }
                Ok((stream, from)) => {
                    warn!(peer = %from, "rejected connection from unexpected address");
                    drop(stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(NetError::PeerUnreachable)
    }
}

/// Bind the first free TCP port in `base..base + attempts`
fn bind_in_range(base: u16, attempts: u16) -> Option<TcpListener> {
    (0..attempts)
        .filter_map(|offset| base.checked_add(offset))
        .find_map(|port| TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).ok())
}

/// Decides whether to accept an incoming invitation
pub trait InviteResponder {
    fn accept_invite(&mut self, from: &str, addr: SocketAddr) -> bool;
}

/// Invited side state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenState {
    Listening,
    InvitePending {
        inviter: SocketAddr,
        deadline: Instant,
    },
}

/// What one listener step did
pub enum ListenEvent {
    /// Nothing arrived within the poll interval
    Idle,
    /// Answered a search
    Replied(SocketAddr),
    Declined(SocketAddr),
    /// Accepted an invitation; now waiting for TCP_INFO
    Accepted(SocketAddr),
    /// Datagram ignored (wrong sender or type for this state)
    Ignored,
    /// Pending window ran out
    Expired,
    /// Inviter cancelled
    Cancelled,
    /// Connected to the inviter
    Connected(Channel),
}

/// The invited side's UDP endpoint
pub struct Listener {
    socket: UdpSocket,
    name: String,
    config: DiscoveryConfig,
    state: ListenState,
}

impl Listener {
    /// Bind the configured listen port on all interfaces
    pub fn bind(config: &DiscoveryConfig, name: &str) -> io::Result<Self> {
        Self::bind_addr(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.listen_port),
            config,
            name,
        )
    }

    pub fn bind_addr(addr: SocketAddr, config: &DiscoveryConfig, name: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Listener {
            socket,
            name: name.to_string(),
            config: config.clone(),
            state: ListenState::Listening,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn state(&self) -> &ListenState {
        &self.state
    }

    /// Handle at most one datagram (or one timeout) and report what happened
    pub fn step(&mut self, responder: &mut dyn InviteResponder) -> Result<ListenEvent, NetError> {
        match self.state.clone() {
            ListenState::Listening => self.step_listening(responder),
            ListenState::InvitePending { inviter, deadline } => self.step_pending(inviter, deadline),
        }
    }

    fn step_listening(&mut self, responder: &mut dyn InviteResponder) -> Result<ListenEvent, NetError> {
        let Some((datagram, from)) = recv_datagram(&self.socket, Instant::now() + LISTEN_POLL)? else {
            return Ok(ListenEvent::Idle);
        };
        match datagram {
            Datagram::Search => {
                send_datagram(
                    &self.socket,
                    &Datagram::Reply {
                        name: self.name.clone(),
                    },
                    from,
                )?;
                debug!(peer = %from, "answered search");
                Ok(ListenEvent::Replied(from))
            }
            Datagram::Invite { from: inviter_name } => {
                info!(peer = %from, name = %inviter_name, "invitation received");
                if responder.accept_invite(&inviter_name, from) {
                    send_datagram(&self.socket, &Datagram::Accept, from)?;
                    self.state = ListenState::InvitePending {
                        inviter: from,
                        deadline: Instant::now() + self.config.pending_window(),
                    };
                    Ok(ListenEvent::Accepted(from))
                } else {
                    send_datagram(&self.socket, &Datagram::Decline, from)?;
                    Ok(ListenEvent::Declined(from))
                }
            }
            other => {
                debug!(peer = %from, message = ?other, "ignoring datagram while listening");
                Ok(ListenEvent::Ignored)
            }
        }
    }

    fn step_pending(&mut self, inviter: SocketAddr, deadline: Instant) -> Result<ListenEvent, NetError> {
        let Some((datagram, from)) = recv_datagram(&self.socket, deadline)? else {
            info!(peer = %inviter, "invite window expired");
            self.state = ListenState::Listening;
            return Ok(ListenEvent::Expired);
        };
        if from != inviter {
            debug!(peer = %from, "ignoring datagram from another address while invite pending");
            return Ok(ListenEvent::Ignored);
        }
        match datagram {
            Datagram::TcpInfo { port } => {
                self.state = ListenState::Listening;
                let addr = SocketAddr::new(inviter.ip(), port);
                info!(peer = %addr, "connecting to inviter");
                match Channel::connect(addr, self.config.accept_timeout()) {
                    Ok(channel) => Ok(ListenEvent::Connected(channel)),
                    Err(e) => {
                        warn!(peer = %addr, error = %e, "could not connect to inviter");
                        Err(NetError::PeerUnreachable)
                    }
                }
            }
            Datagram::Cancel => {
                info!(peer = %inviter, "inviter cancelled");
                self.state = ListenState::Listening;
                Ok(ListenEvent::Cancelled)
            }
            other => {
                debug!(peer = %from, message = ?other, "ignoring datagram while invite pending");
                Ok(ListenEvent::Ignored)
            }
        }
    }

    /// Step until connected to an inviter. Connection failures return to listening.
    pub fn wait_for_match(&mut self, responder: &mut dyn InviteResponder) -> Result<Channel, NetError> {
        loop {
            match self.step(responder) {
                Ok(ListenEvent::Connected(channel)) => return Ok(channel),
                Ok(_) => {}
                Err(NetError::PeerUnreachable) => {}
                Err(e) => return Err(e),
            }
        }
    }
}
