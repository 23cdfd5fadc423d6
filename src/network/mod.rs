//! Networking: UDP discovery, TCP rendezvous, game channel
//!
//! This module provides:
//! - JSON datagrams for search/invite/accept over UDP (`protocol::Datagram`)
//! - `Scanner` and `Listener`, the two sides of the discovery handshake
//! - TCP rendezvous with port auto-increment from a configurable base
//! - `Channel`, newline-delimited JSON game messages over TCP

pub mod channel;
pub mod discovery;
pub mod protocol;

pub use channel::{Channel, DisconnectHandle};
pub use discovery::{InviteOutcome, InviteResponder, Listener, PeerCandidate, Scanner};
pub use protocol::{Datagram, GameMessage};

use thiserror::Error;

/// Errors from discovery and the game channel
#[derive(Error, Debug)]
pub enum NetError {
    #[error("peer unreachable")]
    PeerUnreachable,

    #[error("peer closed the connection")]
    TransportClosed,

    #[error("no bindable port in the configured range")]
    ResourceExhaustion,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of waiting for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv<T> {
    Message(T),
    Timeout,
    PeerClosed,
    /// A line arrived but did not decode; the reason is for logging
    Malformed(String),
}
