//! Game logic: hands, moves, scoring, and the match protocol
//!
//! Side A is always the host (the inviter) and side B the guest. The host
//! is the single source of truth for scores and match termination.

pub mod arbitrator;
pub mod hand;
pub mod session;

pub use arbitrator::{score_round, MatchPhase, MatchState, RoundOutcome};
pub use hand::{Move, MoveError, PlayerHand};
pub use session::{run_guest, run_host, SessionEnd};

use crate::storage::StatusDelta;
use serde::{Deserialize, Serialize};

/// One of the two seats in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "A", alias = "PlayerA")]
    A,
    #[serde(rename = "B", alias = "PlayerB")]
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Something the local player should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Started {
        you_are: Side,
        target_wins: u32,
    },
    /// Your turn: current hand and how many cards the opponent still holds
    YourTurn {
        round: u32,
        hand: Vec<u8>,
        opponent_left: usize,
    },
    InvalidMove(MoveError),
    RoundResult {
        you_played: u32,
        opponent_played: u32,
        you_won: bool,
        your_wins: u32,
        opponent_wins: u32,
    },
    GameOver {
        you_won: bool,
        your_wins: u32,
        opponent_wins: u32,
    },
    RematchAgreed,
    RematchDeclined,
    OpponentDisconnected {
        reason: String,
    },
    ConnectionLost,
}

/// The local decision maker for one side of a match
pub trait Player {
    fn on_event(&mut self, event: &GameEvent);

    /// Cards to play this round. Rejected picks are reported as
    /// `InvalidMove` and this is asked again.
    fn choose_move(&mut self, hand: &PlayerHand) -> Vec<u8>;

    fn wants_rematch(&mut self) -> bool;
}

/// Receives presence updates produced by a match. Must not block.
pub trait StatusSink {
    fn report(&self, delta: StatusDelta);
}
