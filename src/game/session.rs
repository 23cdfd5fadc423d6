//! Match protocol drivers for the host and the guest
//!
//! Per round the host sends its MOVE first, then waits for the guest's MOVE,
//! scores, and sends ROUND_RESULT. After GAME_OVER both sides negotiate a
//! rematch; the host then sends a fresh START.

use super::arbitrator::{MatchPhase, MatchState};
use super::hand::{validate_cards, Move, PlayerHand};
use super::{GameEvent, Player, Side, StatusSink};
use crate::config::GameConfig;
use crate::network::{Channel, GameMessage, Recv};
use crate::storage::StatusDelta;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a game session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// At least one match completed and no rematch was agreed
    Finished,
    OpponentDisconnected(String),
    ConnectionLost,
}

enum Rematch {
    /// Both sides want another match. On the guest this carries the host's
    /// START, already read off the channel.
    Agreed(Option<GameMessage>),
    Declined,
    Ended(SessionEnd),
}

fn send(channel: &mut Channel, msg: &GameMessage) -> Result<(), SessionEnd> {
    channel.send(msg).map_err(|e| {
        debug!(kind = msg.kind(), error = %e, "send failed");
        SessionEnd::ConnectionLost
    })
}

fn choose_valid_move(player: &mut dyn Player, hand: &PlayerHand) -> Move {
    loop {
        match Move::new(player.choose_move(hand), hand) {
            Ok(mv) => return mv,
            Err(e) => player.on_event(&GameEvent::InvalidMove(e)),
        }
    }
}

/// Block until the opponent's MOVE. Other messages are logged and skipped.
fn await_move(channel: &mut Channel) -> Result<Vec<u8>, SessionEnd> {
    loop {
        match channel.recv() {
            Recv::Message(GameMessage::Move { cards }) => return Ok(cards),
            Recv::Message(GameMessage::Disconnect { reason }) => {
                return Err(SessionEnd::OpponentDisconnected(reason));
            }
            Recv::Message(other) => {
                warn!(kind = other.kind(), "ignoring unexpected message while waiting for a move");
            }
            Recv::Malformed(reason) => debug!(reason = %reason, "dropping malformed line"),
            Recv::Timeout => {}
            Recv::PeerClosed => return Err(SessionEnd::ConnectionLost),
        }
    }
}

fn decline(channel: &mut Channel, player: &mut dyn Player, reason: &str) -> Rematch {
    let _ = channel.send(&GameMessage::Disconnect {
        reason: reason.to_string(),
    });
    player.on_event(&GameEvent::RematchDeclined);
    Rematch::Declined
}

/// Ask the local player, announce REMATCH, and wait for the peer.
///
/// The host agrees once the guest's REMATCH arrives inside the window. The
/// guest agrees only when the host's START follows; a DISCONNECT instead means
/// the host's window closed first.
fn negotiate_rematch(
    channel: &mut Channel,
    player: &mut dyn Player,
    window: Duration,
    side: Side,
) -> Rematch {
    if !player.wants_rematch() {
        return decline(channel, player, "no rematch");
    }
    if let Err(end) = send(channel, &GameMessage::Rematch) {
        return Rematch::Ended(end);
    }

    let mut deadline = Instant::now() + window;
    let mut host_agreed = false;
    loop {
        match channel.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Recv::Message(GameMessage::Rematch) if side == Side::A => {
                player.on_event(&GameEvent::RematchAgreed);
                return Rematch::Agreed(None);
            }
            Recv::Message(GameMessage::Rematch) => {
                // the host answers with START or DISCONNECT
                if !host_agreed {
                    host_agreed = true;
                    deadline = Instant::now() + window;
                }
            }
            Recv::Message(start @ GameMessage::Start { .. }) if side == Side::B => {
                player.on_event(&GameEvent::RematchAgreed);
                return Rematch::Agreed(Some(start));
            }
            Recv::Message(GameMessage::Disconnect { reason }) => {
                debug!(reason = %reason, "peer left during rematch window");
                player.on_event(&GameEvent::RematchDeclined);
                return Rematch::Declined;
            }
            Recv::Message(other) => {
                debug!(kind = other.kind(), "ignoring message during rematch window");
            }
            Recv::Malformed(reason) => debug!(reason = %reason, "dropping malformed line"),
            Recv::Timeout => return decline(channel, player, "rematch timed out"),
            Recv::PeerClosed => return Rematch::Ended(SessionEnd::ConnectionLost),
        }
    }
}

/// Tell the player how the session ended; abnormal ends post an idle status
fn finish(end: SessionEnd, player: &mut dyn Player, sink: &dyn StatusSink) -> SessionEnd {
    match &end {
        SessionEnd::Finished => return end,
        SessionEnd::OpponentDisconnected(reason) => {
            info!(reason = %reason, "opponent disconnected");
            player.on_event(&GameEvent::OpponentDisconnected {
                reason: reason.clone(),
            });
        }
        SessionEnd::ConnectionLost => {
            info!("connection to opponent lost");
            player.on_event(&GameEvent::ConnectionLost);
        }
    }
    sink.report(StatusDelta::idle());
    end
}

/// Run matches as the host until no rematch is agreed or the connection ends
pub fn run_host<R: Rng + ?Sized>(
    channel: &mut Channel,
    player: &mut dyn Player,
    sink: &dyn StatusSink,
    config: &GameConfig,
    rng: &mut R,
) -> SessionEnd {
    let mut state = MatchState::new(config.target_wins);
    let end = loop {
        if let Err(end) = host_match(channel, player, sink, &mut state, rng) {
            break end;
        }
        state.set_phase(MatchPhase::RematchNegotiation);
        match negotiate_rematch(channel, player, config.rematch_window(), Side::A) {
            Rematch::Agreed(_) => state.reset(),
            Rematch::Declined => break SessionEnd::Finished,
            Rematch::Ended(end) => break end,
        }
    };
    state.set_phase(MatchPhase::Terminal);
    finish(end, player, sink)
}

fn host_match<R: Rng + ?Sized>(
    channel: &mut Channel,
    player: &mut dyn Player,
    sink: &dyn StatusSink,
    state: &mut MatchState,
    rng: &mut R,
) -> Result<(), SessionEnd> {
    let target_wins = state.target_wins();
    send(
        channel,
        &GameMessage::Start {
            you_are: Side::B,
            target_wins,
        },
    )?;
    player.on_event(&GameEvent::Started {
        you_are: Side::A,
        target_wins,
    });

    let winner = loop {
        if let Some(winner) = state.forfeit_winner() {
            info!(winner = ?winner, "hand exhausted, match forfeited");
            break winner;
        }
        state.set_phase(MatchPhase::RoundActive);
        player.on_event(&GameEvent::YourTurn {
            round: state.round(),
            hand: state.hand(Side::A).cards(),
            opponent_left: state.hand(Side::B).len(),
        });
        let mv = choose_valid_move(player, state.hand(Side::A));
        send(
            channel,
            &GameMessage::Move {
                cards: mv.cards().to_vec(),
            },
        )?;

        let guest_cards = await_move(channel)?;
        if let Err(e) = validate_cards(&guest_cards, state.hand(Side::B)) {
            warn!(cards = ?guest_cards, error = %e, "opponent move fails validation, scoring it as sent");
        }

        let outcome = state.record_round(mv.cards(), &guest_cards, rng);
        let (a_wins, b_wins) = (state.hand(Side::A).round_wins(), state.hand(Side::B).round_wins());
        send(
            channel,
            &GameMessage::RoundResult {
                a_play: outcome.a_play,
                b_play: outcome.b_play,
                winner: outcome.winner,
                a_wins,
                b_wins,
                a_left: state.hand(Side::A).len(),
                b_left: state.hand(Side::B).len(),
            },
        )?;
        debug!(
            a_play = outcome.a_play,
            b_play = outcome.b_play,
            tie_broken = outcome.tie_broken,
            "round scored"
        );
        player.on_event(&GameEvent::RoundResult {
            you_played: outcome.a_play,
            opponent_played: outcome.b_play,
            you_won: outcome.winner == Side::A,
            your_wins: a_wins,
            opponent_wins: b_wins,
        });

        if let Some(winner) = state.winner() {
            break winner;
        }
    };

    state.set_phase(MatchPhase::GameOver);
    let (a_wins, b_wins) = (state.hand(Side::A).round_wins(), state.hand(Side::B).round_wins());
    info!(winner = ?winner, a_wins, b_wins, "game over");
    player.on_event(&GameEvent::GameOver {
        you_won: winner == Side::A,
        your_wins: a_wins,
        opponent_wins: b_wins,
    });
    sink.report(StatusDelta::game_result(winner == Side::A));
    send(
        channel,
        &GameMessage::GameOver {
            winner,
            a_wins,
            b_wins,
        },
    )
}

/// Follow the host's lead until no rematch is agreed or the connection ends
pub fn run_guest(
    channel: &mut Channel,
    player: &mut dyn Player,
    sink: &dyn StatusSink,
    config: &GameConfig,
) -> SessionEnd {
    let mut hand = PlayerHand::full();
    let mut opponent_left = hand.len();
    let mut round = 1;
    let mut in_match = false;
    let mut pending: Option<GameMessage> = None;

    let end = loop {
        let msg = match pending.take() {
            Some(msg) => msg,
            None => match channel.recv() {
                Recv::Message(msg) => msg,
                Recv::Malformed(reason) => {
                    debug!(reason = %reason, "dropping malformed line");
                    continue;
                }
                Recv::Timeout => continue,
                Recv::PeerClosed => break SessionEnd::ConnectionLost,
            },
        };

        match msg {
            GameMessage::Start {
                you_are,
                target_wins,
            } => {
                hand = PlayerHand::full();
                opponent_left = hand.len();
                round = 1;
                in_match = true;
                player.on_event(&GameEvent::Started {
                    you_are,
                    target_wins,
                });
            }
            GameMessage::Move { .. } if !in_match => {
                debug!("ignoring MOVE outside a match");
            }
            GameMessage::Move { .. } => {
                player.on_event(&GameEvent::YourTurn {
                    round,
                    hand: hand.cards(),
                    opponent_left,
                });
                let mv = choose_valid_move(player, &hand);
                if let Err(end) = send(
                    channel,
                    &GameMessage::Move {
                        cards: mv.cards().to_vec(),
                    },
                ) {
                    break end;
                }
                hand.play(&mv);
            }
            GameMessage::RoundResult {
                a_play,
                b_play,
                winner,
                a_wins,
                b_wins,
                a_left,
                b_left,
            } => {
                if b_left != hand.len() {
                    debug!(reported = b_left, held = hand.len(), "hand size differs from host's count");
                }
                opponent_left = a_left;
                round += 1;
                player.on_event(&GameEvent::RoundResult {
                    you_played: b_play,
                    opponent_played: a_play,
                    you_won: winner == Side::B,
                    your_wins: b_wins,
                    opponent_wins: a_wins,
                });
            }
            GameMessage::GameOver {
                winner,
                a_wins,
                b_wins,
            } => {
                in_match = false;
                player.on_event(&GameEvent::GameOver {
                    you_won: winner == Side::B,
                    your_wins: b_wins,
                    opponent_wins: a_wins,
                });
                sink.report(StatusDelta::game_result(winner == Side::B));
                match negotiate_rematch(channel, player, config.rematch_window(), Side::B) {
                    Rematch::Agreed(start) => pending = start,
                    Rematch::Declined => break SessionEnd::Finished,
                    Rematch::Ended(end) => break end,
                }
            }
            GameMessage::Rematch => debug!("ignoring REMATCH outside the rematch window"),
            GameMessage::Disconnect { reason } => break SessionEnd::OpponentDisconnected(reason),
        }
    };
    finish(end, player, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MoveError;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[derive(Default)]
    struct ScriptedPlayer {
        moves: VecDeque<Vec<u8>>,
        rematches: VecDeque<(Duration, bool)>,
        events: Vec<GameEvent>,
    }

    impl ScriptedPlayer {
        fn new(moves: &[&[u8]]) -> Self {
            Self {
                moves: moves.iter().map(|m| m.to_vec()).collect(),
                ..Self::default()
            }
        }

        fn with_rematches(mut self, answers: &[(u64, bool)]) -> Self {
            self.rematches = answers
                .iter()
                .map(|&(ms, yes)| (Duration::from_millis(ms), yes))
                .collect();
            self
        }

        fn count(&self, pred: impl Fn(&GameEvent) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }
    }

    impl Player for ScriptedPlayer {
        fn on_event(&mut self, event: &GameEvent) {
            self.events.push(event.clone());
        }

        fn choose_move(&mut self, hand: &PlayerHand) -> Vec<u8> {
            self.moves
                .pop_front()
                .unwrap_or_else(|| vec![hand.cards()[0]])
        }

        fn wants_rematch(&mut self) -> bool {
            let (delay, answer) = self.rematches.pop_front().unwrap_or((Duration::ZERO, false));
            thread::sleep(delay);
            answer
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<StatusDelta>>,
    }

    impl StatusSink for RecordingSink {
        fn report(&self, delta: StatusDelta) {
            self.reports.lock().push(delta);
        }
    }

    fn channel_pair() -> (Channel, Channel) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Channel::new(server).unwrap(), Channel::new(client).unwrap())
    }

    fn config(target_wins: u32, rematch_window_ms: u64) -> GameConfig {
        GameConfig {
            target_wins,
            rematch_window_ms,
        }
    }

    fn play(
        host: ScriptedPlayer,
        guest: ScriptedPlayer,
        config: GameConfig,
    ) -> ((SessionEnd, ScriptedPlayer, RecordingSink), (SessionEnd, ScriptedPlayer, RecordingSink)) {
        let (mut host_channel, mut guest_channel) = channel_pair();
        let guest_config = config.clone();
        let guest_thread = thread::spawn(move || {
            let mut guest = guest;
            let sink = RecordingSink::default();
            let end = run_guest(&mut guest_channel, &mut guest, &sink, &guest_config);
            (end, guest, sink)
        });

        let mut host = host;
        let sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(3);
        let end = run_host(&mut host_channel, &mut host, &sink, &config, &mut rng);
        drop(host_channel);
        ((end, host, sink), guest_thread.join().unwrap())
    }

    #[test]
    fn test_host_sweeps_three_rounds() {
        let ((host_end, host, host_sink), (guest_end, guest, guest_sink)) = play(
            ScriptedPlayer::new(&[&[7], &[6], &[5]]),
            ScriptedPlayer::new(&[&[1], &[2], &[3]]),
            config(3, 500),
        );

        assert_eq!(host_end, SessionEnd::Finished);
        assert_eq!(guest_end, SessionEnd::Finished);
        assert!(host.events.contains(&GameEvent::GameOver {
            you_won: true,
            your_wins: 3,
            opponent_wins: 0
        }));
        assert!(guest.events.contains(&GameEvent::GameOver {
            you_won: false,
            your_wins: 0,
            opponent_wins: 3
        }));
        assert_eq!(host.count(|e| matches!(e, GameEvent::RoundResult { .. })), 3);
        assert_eq!(*host_sink.reports.lock(), vec![StatusDelta::game_result(true)]);
        assert_eq!(*guest_sink.reports.lock(), vec![StatusDelta::game_result(false)]);
    }

    #[test]
    fn test_guest_sees_start_as_side_b() {
        let (_, (_, guest, _)) = play(
            ScriptedPlayer::new(&[]),
            ScriptedPlayer::new(&[]),
            config(3, 500),
        );
        assert_eq!(
            guest.events.first(),
            Some(&GameEvent::Started {
                you_are: Side::B,
                target_wins: 3
            })
        );
    }

    #[test]
    fn test_invalid_local_move_is_reprompted() {
        let ((_, host, _), (_, guest, _)) = play(
            ScriptedPlayer::new(&[&[7, 7], &[9], &[7]]),
            ScriptedPlayer::new(&[&[1, 2, 3], &[1]]),
            config(1, 500),
        );
        assert!(host.events.contains(&GameEvent::InvalidMove(MoveError::Duplicate(7))));
        assert!(host.events.contains(&GameEvent::InvalidMove(MoveError::OutOfRange(9))));
        assert!(guest.events.contains(&GameEvent::InvalidMove(MoveError::WrongCount(3))));
        assert!(host.events.contains(&GameEvent::GameOver {
            you_won: true,
            your_wins: 1,
            opponent_wins: 0
        }));
    }

    #[test]
    fn test_forfeit_when_host_runs_out_of_cards() {
        let ((host_end, host, host_sink), (_, guest, _)) = play(
            ScriptedPlayer::new(&[&[1, 2], &[3, 4], &[5, 6], &[7]]),
            ScriptedPlayer::new(&[&[7], &[6], &[5], &[4]]),
            config(10, 500),
        );
        assert_eq!(host_end, SessionEnd::Finished);
        assert_eq!(host.count(|e| matches!(e, GameEvent::RoundResult { .. })), 4);
        assert!(matches!(
            host.events.iter().rev().find(|e| matches!(e, GameEvent::GameOver { .. })),
            Some(GameEvent::GameOver { you_won: false, .. })
        ));
        assert!(matches!(
            guest.events.iter().rev().find(|e| matches!(e, GameEvent::GameOver { .. })),
            Some(GameEvent::GameOver { you_won: true, .. })
        ));
        assert_eq!(*host_sink.reports.lock(), vec![StatusDelta::game_result(false)]);
    }

    #[test]
    fn test_rematch_inside_window_resets_match() {
        let ((host_end, host, host_sink), (guest_end, guest, _)) = play(
            ScriptedPlayer::new(&[&[7]]).with_rematches(&[(0, true), (0, false)]),
            ScriptedPlayer::new(&[&[1]]).with_rematches(&[(300, true), (0, false)]),
            config(1, 1_000),
        );

        assert_eq!(host_end, SessionEnd::Finished);
        assert_eq!(guest_end, SessionEnd::Finished);
        assert_eq!(host.count(|e| matches!(e, GameEvent::Started { .. })), 2);
        assert_eq!(guest.count(|e| matches!(e, GameEvent::Started { .. })), 2);
        assert_eq!(host.count(|e| *e == GameEvent::RematchAgreed), 1);

        let turns_after_restart: Vec<&GameEvent> = guest
            .events
            .iter()
            .skip_while(|e| **e != GameEvent::RematchAgreed)
            .filter(|e| matches!(e, GameEvent::YourTurn { .. }))
            .collect();
        assert!(matches!(
            turns_after_restart.first(),
            Some(GameEvent::YourTurn { round: 1, hand, opponent_left: 7 }) if hand.len() == 7
        ));
        assert_eq!(host_sink.reports.lock().len(), 2);
    }

    #[test]
    fn test_rematch_after_window_ends_session() {
        let ((host_end, host, _), (guest_end, guest, _)) = play(
            ScriptedPlayer::new(&[&[7]]).with_rematches(&[(0, true)]),
            ScriptedPlayer::new(&[&[1]]).with_rematches(&[(700, true)]),
            config(1, 300),
        );

        assert_eq!(host_end, SessionEnd::Finished);
        assert!(host.events.contains(&GameEvent::RematchDeclined));
        assert_eq!(host.count(|e| matches!(e, GameEvent::Started { .. })), 1);
        assert_eq!(guest.count(|e| matches!(e, GameEvent::Started { .. })), 1);
        assert!(!guest.events.contains(&GameEvent::RematchAgreed));
        assert!(matches!(guest_end, SessionEnd::Finished | SessionEnd::ConnectionLost));
    }

    #[test]
    fn test_rematch_when_guest_answers_first() {
        let ((host_end, host, _), (guest_end, guest, _)) = play(
            ScriptedPlayer::new(&[&[7]]).with_rematches(&[(400, true), (0, false)]),
            ScriptedPlayer::new(&[&[1]]).with_rematches(&[(0, true), (0, false)]),
            config(1, 1_000),
        );
        assert_eq!(host_end, SessionEnd::Finished);
        assert_eq!(guest_end, SessionEnd::Finished);
        assert_eq!(host.count(|e| matches!(e, GameEvent::Started { .. })), 2);
        assert_eq!(guest.count(|e| matches!(e, GameEvent::Started { .. })), 2);
        assert_eq!(guest.count(|e| *e == GameEvent::RematchAgreed), 1);
    }

    #[test]
    fn test_single_sided_rematch_declined() {
        let ((host_end, host, _), (guest_end, _, _)) = play(
            ScriptedPlayer::new(&[&[7]]).with_rematches(&[(0, true)]),
            ScriptedPlayer::new(&[&[1]]).with_rematches(&[(0, false)]),
            config(1, 2_000),
        );
        assert_eq!(host_end, SessionEnd::Finished);
        assert_eq!(guest_end, SessionEnd::Finished);
        assert!(host.events.contains(&GameEvent::RematchDeclined));
    }

    fn raw_pair() -> (Channel, Channel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let raw = client.try_clone().unwrap();
        let (server, _) = listener.accept().unwrap();
        (Channel::new(server).unwrap(), Channel::new(client).unwrap(), raw)
    }

    fn host_against(
        script: impl FnOnce(&mut Channel, &mut TcpStream) + Send + 'static,
    ) -> (SessionEnd, ScriptedPlayer, RecordingSink) {
        let (mut host_channel, mut peer, mut raw) = raw_pair();
        let peer_thread = thread::spawn(move || script(&mut peer, &mut raw));

        let mut host = ScriptedPlayer::new(&[&[7], &[6]]);
        let sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(0);
        let end = run_host(&mut host_channel, &mut host, &sink, &config(3, 500), &mut rng);
        peer_thread.join().unwrap();
        (end, host, sink)
    }

    #[test]
    fn test_disconnect_mid_match() {
        let (end, host, sink) = host_against(|peer, _| {
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Start { .. })));
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Move { .. })));
            peer.send(&GameMessage::Disconnect {
                reason: "interrupted".to_string(),
            })
            .unwrap();
        });
        assert_eq!(end, SessionEnd::OpponentDisconnected("interrupted".to_string()));
        assert!(host.events.contains(&GameEvent::OpponentDisconnected {
            reason: "interrupted".to_string()
        }));
        assert_eq!(*sink.reports.lock(), vec![StatusDelta::idle()]);
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let (_, host, _) = host_against(|peer, raw| {
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Start { .. })));
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Move { .. })));
            raw.write_all(b"garbage\n{\"type\":\"NOPE\"}\n").unwrap();
            peer.send(&GameMessage::Move { cards: vec![1] }).unwrap();
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::RoundResult { .. })));
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Move { .. })));
        });
        assert!(host.events.contains(&GameEvent::RoundResult {
            you_played: 7,
            opponent_played: 1,
            you_won: true,
            your_wins: 1,
            opponent_wins: 0
        }));
    }

    #[test]
    fn test_unexpected_message_is_skipped() {
        let (end, host, sink) = host_against(|peer, _| {
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Start { .. })));
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Move { .. })));
            peer.send(&GameMessage::Start {
                you_are: Side::A,
                target_wins: 3,
            })
            .unwrap();
            peer.send(&GameMessage::Rematch).unwrap();
            peer.send(&GameMessage::Move { cards: vec![1] }).unwrap();
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::RoundResult { .. })));
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Move { .. })));
        });
        assert!(host.events.contains(&GameEvent::RoundResult {
            you_played: 7,
            opponent_played: 1,
            you_won: true,
            your_wins: 1,
            opponent_wins: 0
        }));
        assert_eq!(end, SessionEnd::ConnectionLost);
        assert_eq!(*sink.reports.lock(), vec![StatusDelta::idle()]);
    }

    #[test]
    fn test_connection_lost() {
        let (end, _, _) = host_against(|peer, _| {
            assert!(matches!(peer.recv(), Recv::Message(GameMessage::Start { .. })));
        });
        assert_eq!(end, SessionEnd::ConnectionLost);
    }
}
