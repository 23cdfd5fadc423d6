#![allow(dead_code)]
//! Wire message types
//!
//! Two closed message sets, both JSON objects tagged by `type`:
//! - [`Datagram`]: one object per UDP datagram (discovery and invitation)
//! - [`GameMessage`]: one object per line over the TCP game channel
//!
//! Unknown fields are ignored. An unknown `type` or a missing required field
//! fails to decode and the message is dropped by the caller.

use crate::game::Side;
use serde::{Deserialize, Serialize};

/// Largest datagram we expect to receive
pub const MAX_DATAGRAM: usize = 1024;

/// Discovery/invitation datagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Datagram {
    /// Scanner asks who is listening on a port
    Search,
    /// Listener answers a search with its display name
    Reply { name: String },
    /// Inviter asks the target to play
    Invite { from: String },
    Accept,
    Decline,
    /// Inviter advertises the TCP port it is listening on
    TcpInfo { port: u16 },
    /// Inviter withdraws an accepted invitation
    Cancel,
}

impl Datagram {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Game channel message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMessage {
    /// Host starts (or restarts) a match and tells the guest its side
    Start { you_are: Side, target_wins: u32 },
    /// Cards played this round
    Move { cards: Vec<u8> },
    /// Host's authoritative round outcome; plays are card sums, `*_left` are hand sizes
    RoundResult {
        a_play: u32,
        b_play: u32,
        winner: Side,
        a_wins: u32,
        b_wins: u32,
        a_left: usize,
        b_left: usize,
    },
    GameOver { winner: Side, a_wins: u32, b_wins: u32 },
    Rematch,
    Disconnect {
        #[serde(default)]
        reason: String,
    },
}

impl GameMessage {
    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_default();
        line.push(b'\n');
        line
    }

    pub fn decode(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GameMessage::Start { .. } => "START",
            GameMessage::Move { .. } => "MOVE",
            GameMessage::RoundResult { .. } => "ROUND_RESULT",
            GameMessage::GameOver { .. } => "GAME_OVER",
            GameMessage::Rematch => "REMATCH",
            GameMessage::Disconnect { .. } => "DISCONNECT",
        }
    }
}
