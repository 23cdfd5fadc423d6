//! Player hands and move validation
//!
//! A move is one or two distinct cards from 1..=7, all currently held.
//! Checks run in order: card count, range, duplicates, possession.

use std::collections::BTreeSet;
use thiserror::Error;

pub const MIN_CARD: u8 = 1;
pub const MAX_CARD: u8 = 7;
pub const MAX_CARDS_PER_MOVE: usize = 2;

/// Why a submitted move was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("play 1 or 2 cards (got {0})")]
    WrongCount(usize),

    #[error("card {0} is not between 1 and 7")]
    OutOfRange(u8),

    #[error("card {0} played twice")]
    Duplicate(u8),

    #[error("you do not hold card {0}")]
    NotInHand(u8),
}

/// One side's remaining cards and round wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerHand {
    cards: BTreeSet<u8>,
    round_wins: u32,
}

impl Default for PlayerHand {
    fn default() -> Self {
        Self::full()
    }
}

impl PlayerHand {
    /// A fresh hand holding every card
    pub fn full() -> Self {
        Self {
            cards: (MIN_CARD..=MAX_CARD).collect(),
            round_wins: 0,
        }
    }

    /// Cards in ascending order
    pub fn cards(&self) -> Vec<u8> {
        self.cards.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, card: u8) -> bool {
        self.cards.contains(&card)
    }

    pub fn round_wins(&self) -> u32 {
        self.round_wins
    }

    pub fn win_round(&mut self) {
        self.round_wins += 1;
    }

    /// Remove the cards of a validated move
    pub fn play(&mut self, mv: &Move) {
        for card in mv.cards() {
            self.cards.remove(card);
        }
    }

    /// Remove whichever of `cards` are still held; returns how many were.
    ///
    /// Used for an opponent's move, which is not re-validated.
    pub fn discard(&mut self, cards: &[u8]) -> usize {
        cards.iter().filter(|&&card| self.cards.remove(&card)).count()
    }
}

/// Check `cards` against `hand` without building a [`Move`]
pub fn validate_cards(cards: &[u8], hand: &PlayerHand) -> Result<(), MoveError> {
    if cards.is_empty() || cards.len() > MAX_CARDS_PER_MOVE {
        return Err(MoveError::WrongCount(cards.len()));
    }
    if let Some(&card) = cards.iter().find(|c| !(MIN_CARD..=MAX_CARD).contains(*c)) {
        return Err(MoveError::OutOfRange(card));
    }
    if cards.len() == 2 && cards[0] == cards[1] {
        return Err(MoveError::Duplicate(cards[0]));
    }
    if let Some(&card) = cards.iter().find(|c| !hand.contains(**c)) {
        return Err(MoveError::NotInHand(card));
    }
    Ok(())
}

/// A move that passed validation against the hand it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    cards: Vec<u8>,
}

impl Move {
    pub fn new(cards: Vec<u8>, hand: &PlayerHand) -> Result<Self, MoveError> {
        validate_cards(&cards, hand)?;
        Ok(Self { cards })
    }

    pub fn cards(&self) -> &[u8] {
        &self.cards
    }

    pub fn sum(&self) -> u32 {
        card_sum(&self.cards)
    }
}

pub fn card_sum(cards: &[u8]) -> u32 {
    cards.iter().map(|&c| u32::from(c)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_hand() {
        let hand = PlayerHand::full();
        assert_eq!(hand.cards(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(hand.round_wins(), 0);
    }

    #[test]
    fn test_validation_order() {
        let mut hand = PlayerHand::full();
        hand.discard(&[4]);
        assert_eq!(validate_cards(&[], &hand), Err(MoveError::WrongCount(0)));
        assert_eq!(validate_cards(&[1, 2, 3], &hand), Err(MoveError::WrongCount(3)));
        assert_eq!(validate_cards(&[0], &hand), Err(MoveError::OutOfRange(0)));
        assert_eq!(validate_cards(&[2, 8], &hand), Err(MoveError::OutOfRange(8)));
        assert_eq!(validate_cards(&[5, 5], &hand), Err(MoveError::Duplicate(5)));
        assert_eq!(validate_cards(&[4], &hand), Err(MoveError::NotInHand(4)));
        assert_eq!(validate_cards(&[7, 1], &hand), Ok(()));
    }

    #[test]
    fn test_move_sum() {
        let hand = PlayerHand::full();
        assert_eq!(Move::new(vec![7, 6], &hand).unwrap().sum(), 13);
    }

    #[test]
    fn test_discard_ignores_missing_cards() {
        let mut hand = PlayerHand::full();
        assert_eq!(hand.discard(&[3, 3, 9]), 1);
        assert_eq!(hand.len(), 6);
    }

    proptest! {
        #[test]
        fn prop_valid_move_shrinks_hand_exactly(
            removed in proptest::collection::btree_set(MIN_CARD..=MAX_CARD, 0..6),
            picks in proptest::collection::vec(MIN_CARD..=MAX_CARD, 1..=2),
        ) {
            let mut hand = PlayerHand::full();
            hand.discard(&removed.iter().copied().collect::<Vec<_>>());

            if let Ok(mv) = Move::new(picks.clone(), &hand) {
                let before = hand.len();
                hand.play(&mv);
                prop_assert_eq!(hand.len(), before - mv.cards().len());
                for card in mv.cards() {
                    prop_assert!(!hand.contains(*card));
                }
            }
        }

        #[test]
        fn prop_hand_stays_in_range_and_unique(
            plays in proptest::collection::vec(proptest::collection::vec(0u8..10, 0..4), 0..10),
        ) {
            let mut hand = PlayerHand::full();
            for cards in plays {
                if let Ok(mv) = Move::new(cards, &hand) {
                    hand.play(&mv);
                }
                let cards = hand.cards();
                prop_assert!(cards.iter().all(|c| (MIN_CARD..=MAX_CARD).contains(c)));
                let mut deduped = cards.clone();
                deduped.dedup();
                prop_assert_eq!(deduped, cards);
            }
        }
    }
}
