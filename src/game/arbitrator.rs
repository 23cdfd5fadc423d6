#![allow(dead_code)]
//! Round arbitration for the host
//!
//! The host owns the only authoritative `MatchState`. It scores every round,
//! tracks round wins, and decides when the match is over. The guest only
//! mirrors what the host reports.

use super::hand::{card_sum, PlayerHand};
use super::Side;
use rand::Rng;

/// Amount added to or subtracted from the host's sum on a tie
pub const TIE_BREAK: f64 = 0.1;

/// Protocol phase of one match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Start,
    RoundActive,
    RoundResult,
    GameOver,
    RematchNegotiation,
    Terminal,
}

/// Scored outcome of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub a_play: u32,
    pub b_play: u32,
    pub winner: Side,
    /// Sums were equal and the host perturbation decided
    pub tie_broken: bool,
}

/// Decide a round from the two card sums.
///
/// On a tie the host's sum alone is nudged by ±0.1, so there is always
/// exactly one winner and a tie is never replayed.
pub fn score_round<R: Rng + ?Sized>(a_play: u32, b_play: u32, rng: &mut R) -> RoundOutcome {
    let mut a = f64::from(a_play);
    let b = f64::from(b_play);
    let tie_broken = a_play == b_play;
    if tie_broken {
        a += if rng.random_bool(0.5) { TIE_BREAK } else { -TIE_BREAK };
    }
    RoundOutcome {
        a_play,
        b_play,
        winner: if a > b { Side::A } else { Side::B },
        tie_broken,
    }
}

/// State of the match the host is running
#[derive(Debug, Clone)]
pub struct MatchState {
    host: PlayerHand,
    guest: PlayerHand,
    round: u32,
    target_wins: u32,
    phase: MatchPhase,
}

impl MatchState {
    pub fn new(target_wins: u32) -> Self {
        Self {
            host: PlayerHand::full(),
            guest: PlayerHand::full(),
            round: 1,
            target_wins: target_wins.max(1),
            phase: MatchPhase::Start,
        }
    }

    /// Fresh hands and zeroed counters for a rematch
    pub fn reset(&mut self) {
        *self = Self::new(self.target_wins);
    }

    pub fn hand(&self, side: Side) -> &PlayerHand {
        match side {
            Side::A => &self.host,
            Side::B => &self.guest,
        }
    }

    fn hand_mut(&mut self, side: Side) -> &mut PlayerHand {
        match side {
            Side::A => &mut self.host,
            Side::B => &mut self.guest,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn target_wins(&self) -> u32 {
        self.target_wins
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: MatchPhase) {
        self.phase = phase;
    }

    /// Side that wins because the other has no cards left to play
    pub fn forfeit_winner(&self) -> Option<Side> {
        if self.host.is_empty() {
            Some(Side::B)
        } else if self.guest.is_empty() {
            Some(Side::A)
        } else {
            None
        }
    }

    /// Side that has reached the target, if any
    pub fn winner(&self) -> Option<Side> {
        [Side::A, Side::B]
            .into_iter()
            .find(|side| self.hand(*side).round_wins() >= self.target_wins)
    }

    /// Score a round and apply it.
    ///
    /// Both plays are removed from their hands as submitted. The phase moves
    /// to `GameOver` once a side reaches the target.
    pub fn record_round<R: Rng + ?Sized>(
        &mut self,
        a_cards: &[u8],
        b_cards: &[u8],
        rng: &mut R,
    ) -> RoundOutcome {
        let outcome = score_round(card_sum(a_cards), card_sum(b_cards), rng);
        self.host.discard(a_cards);
        self.guest.discard(b_cards);
        self.hand_mut(outcome.winner).win_round();
        self.round += 1;
        self.phase = if self.winner().is_some() {
            MatchPhase::GameOver
        } else {
            MatchPhase::RoundResult
        };
        outcome
    }
}
