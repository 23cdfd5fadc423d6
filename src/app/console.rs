//! Line-based terminal interaction
//!
//! `Console` is the human behind a peer: it narrates game events, asks for
//! moves and rematches, and answers invitations. Input and output are generic
//! so tests can drive it from a byte buffer.

use crate::game::{GameEvent, Player, PlayerHand};
use crate::lobby::protocol::LobbyReply;
use crate::lobby::LobbyClient;
use crate::network::{InviteResponder, PeerCandidate};
use std::fmt::Display;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::net::SocketAddr;

/// What the inviter picked from a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Pick(usize),
    Rescan,
    Quit,
}

/// Parse an opponent choice: a 1-based number, `r`, or `q`
pub fn parse_choice(input: &str, candidates: usize) -> Option<Choice> {
    match input.trim().to_ascii_lowercase().as_str() {
        "r" => Some(Choice::Rescan),
        "q" => Some(Choice::Quit),
        other => other
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=candidates).contains(n))
            .map(|n| Choice::Pick(n - 1)),
    }
}

/// Parse cards typed as "7", "7 2" or "7,2"
pub fn parse_cards(input: &str) -> Result<Vec<u8>, String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u8>().map_err(|_| format!("'{}' is not a card number", s)))
        .collect()
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print one line. Output errors are ignored.
    pub fn say(&mut self, text: impl Display) {
        let _ = writeln!(self.output, "{}", text);
    }

    /// Show `prompt` and read a line; `None` at end of input
    pub fn prompt(&mut self, prompt: &str) -> Option<String> {
        let _ = write!(self.output, "{}", prompt);
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        self.prompt(prompt).is_some_and(|answer| is_yes(&answer))
    }

    /// List scan results and ask which one to invite
    pub fn choose_opponent(&mut self, candidates: &[PeerCandidate]) -> Choice {
        self.say("Players on the network:");
        for (i, candidate) in candidates.iter().enumerate() {
            self.say(format!("  {}) {}", i + 1, candidate));
        }
        loop {
            let Some(answer) = self.prompt("Pick a number, r to rescan, q to quit: ") else {
                return Choice::Quit;
            };
            match parse_choice(&answer, candidates.len()) {
                Some(choice) => return choice,
                None => self.say(format!("Enter 1-{}, r or q.", candidates.len())),
            }
        }
    }

    /// Register/login menu. Returns the signed-in username, or `None` to quit.
    pub fn sign_in(&mut self, client: &LobbyClient) -> io::Result<Option<String>> {
        loop {
            self.say("A) Register   B) Login   Q) Quit");
            let Some(choice) = self.prompt("> ") else {
                return Ok(None);
            };
            match choice.to_ascii_uppercase().as_str() {
                "A" => {
                    let Some((username, password)) = self.credentials() else {
                        continue;
                    };
                    match client.register(&username, &password)? {
                        LobbyReply::RegisterSuccess => {
                            self.say(format!("Registered {}. You can log in now.", username))
                        }
                        LobbyReply::RegisterFailedUserExists => self.say("That username is taken."),
                        _ => self.say("Registration failed."),
                    }
                }
                "B" => {
                    let Some((username, password)) = self.credentials() else {
                        continue;
                    };
                    match client.login(&username, &password)? {
                        LobbyReply::LoginSuccess(record) => {
                            self.say(format!(
                                "Welcome, {}! {} wins, {} losses, {} logins.",
                                record.username, record.wins, record.losses, record.login_count
                            ));
                            return Ok(Some(username));
                        }
                        LobbyReply::LoginFailedNoUser => self.say("No such user."),
                        LobbyReply::LoginFailedWrongPassword => self.say("Wrong password."),
                        LobbyReply::LoginFailedDuplicate => {
                            self.say("That user is already signed in elsewhere. Try again later.")
                        }
                        _ => self.say("Login failed."),
                    }
                }
                "Q" => return Ok(None),
                _ => self.say("Choose A, B or Q."),
            }
        }
    }

    fn credentials(&mut self) -> Option<(String, String)> {
        let username = self.prompt("Username: ")?;
        let password = self.prompt("Password: ")?;
        if username.is_empty() || password.is_empty() {
            self.say("Username and password must not be empty.");
            return None;
        }
        Some((username, password))
    }
}

impl<R: BufRead, W: Write> Player for Console<R, W> {
    fn on_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::Started {
                you_are,
                target_wins,
            } => self.say(format!(
                "Match started. You are player {:?}. First to {} round wins.",
                you_are, target_wins
            )),
            GameEvent::YourTurn {
                round,
                hand,
                opponent_left,
            } => {
                let cards: Vec<String> = hand.iter().map(u8::to_string).collect();
                self.say(format!(
                    "Round {}. Your cards: {}. Opponent holds {} cards.",
                    round,
                    cards.join(" "),
                    opponent_left
                ));
            }
            GameEvent::InvalidMove(e) => self.say(format!("Invalid move: {}", e)),
            GameEvent::RoundResult {
                you_played,
                opponent_played,
                you_won,
                your_wins,
                opponent_wins,
            } => self.say(format!(
                "You played {}, opponent played {}. You {} the round. Score {}-{}.",
                you_played,
                opponent_played,
                if *you_won { "won" } else { "lost" },
                your_wins,
                opponent_wins
            )),
            GameEvent::GameOver {
                you_won,
                your_wins,
                opponent_wins,
            } => self.say(format!(
                "Game over. You {} {}-{}.",
                if *you_won { "win" } else { "lose" },
                your_wins,
                opponent_wins
            )),
            GameEvent::RematchAgreed => self.say("Rematch! Fresh hands dealt."),
            GameEvent::RematchDeclined => self.say("No rematch."),
            GameEvent::OpponentDisconnected { reason } => {
                self.say(format!("Opponent disconnected ({}).", reason))
            }
            GameEvent::ConnectionLost => self.say("Connection to opponent lost."),
        }
    }

    fn choose_move(&mut self, hand: &PlayerHand) -> Vec<u8> {
        loop {
            // end of input plays the lowest card so the match can finish
            let Some(line) = self.prompt("Play 1 or 2 cards: ") else {
                return hand.cards().into_iter().take(1).collect();
            };
            match parse_cards(&line) {
                Ok(cards) => return cards,
                Err(e) => self.say(e),
            }
        }
    }

    fn wants_rematch(&mut self) -> bool {
        self.confirm("Rematch? [y/N] ")
    }
}

impl<R: BufRead, W: Write> InviteResponder for Console<R, W> {
    fn accept_invite(&mut self, from: &str, addr: SocketAddr) -> bool {
        self.confirm(&format!("{} ({}) invites you to a duel. Accept? [y/N] ", from, addr.ip()))
    }
}
