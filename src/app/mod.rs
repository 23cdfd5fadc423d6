//! Top-level flows for each command
//!
//! - `run_lobby`: serve the lobby until Ctrl-C
//! - `run_invite`: sign in, scan, invite, and host matches
//! - `run_listen`: sign in, wait for invitations, and play as guest

pub mod console;
pub mod interrupt;

pub use console::{Choice, Console};
pub use interrupt::InterruptGuard;

use crate::config::{Config, LobbyConfig};
use crate::game::{run_guest, run_host};
use crate::lobby::{HeartbeatReporter, LobbyClient, LobbyServer, LobbyService};
use crate::network::{InviteOutcome, Listener, NetError, Scanner};
use crate::storage::{PresenceStore, StorageError};
use std::io;
use std::sync::mpsc::channel;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("could not install Ctrl-C handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

/// Run the lobby server until interrupted
pub fn run_lobby(config: &LobbyConfig) -> Result<(), AppError> {
    let store = match &config.database {
        Some(path) => PresenceStore::open(path)?,
        None => PresenceStore::open_default()?,
    };
    let service = Arc::new(LobbyService::new(Arc::new(store), config.heartbeat_ttl()));
    let mut server = LobbyServer::start(&config.bind_addr, service, config.sweep_interval())?;

    let (stop_tx, stop_rx) = channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    let _ = stop_rx.recv();

    info!(players = server.player_count(), "shutting down lobby");
    server.stop();
    Ok(())
}

/// Signed-in peer: lobby connection, heartbeat, and interrupt guard
struct Session {
    username: String,
    client: LobbyClient,
    heartbeat: HeartbeatReporter,
    guard: InterruptGuard,
}

fn sign_in<R: io::BufRead, W: io::Write>(
    console: &mut Console<R, W>,
    config: &Config,
    lobby_addr: &str,
) -> Result<Option<Session>, AppError> {
    let client = LobbyClient::connect(lobby_addr)?;
    let Some(username) = console.sign_in(&client)? else {
        return Ok(None);
    };
    info!(username = %username, lobby = %client.addr(), "signed in");

    let heartbeat = HeartbeatReporter::start(client.clone(), config.lobby.report_interval());
    let guard = InterruptGuard::new(client.clone());
    guard.install()?;
    Ok(Some(Session {
        username,
        client,
        heartbeat,
        guard,
    }))
}

/// Inviting peer: scan, pick an opponent, and host matches until quit
pub fn run_invite(config: &Config, lobby_addr: &str) -> Result<(), AppError> {
    let mut console = Console::stdio();
    let Some(session) = sign_in(&mut console, config, lobby_addr)? else {
        return Ok(());
    };
    let result = invite_loop(&mut console, config, &session);
    session.heartbeat.shutdown();
    result
}

fn invite_loop<R: io::BufRead, W: io::Write>(
    console: &mut Console<R, W>,
    config: &Config,
    session: &Session,
) -> Result<(), AppError> {
    let scanner = Scanner::bind(&config.discovery, &session.username)?;
    let mut rng = rand::rng();

    loop {
        console.say("Searching for players...");
        let candidates = scanner.scan();
        if candidates.is_empty() {
            console.say("No players found on the network.");
            return Ok(());
        }

        let target = match console.choose_opponent(&candidates) {
            Choice::Quit => return Ok(()),
            Choice::Rescan => continue,
            Choice::Pick(i) => &candidates[i],
        };

        console.say(format!("Inviting {}...", target.name));
        match scanner.invite(target)? {
            InviteOutcome::Accepted => {}
            InviteOutcome::Declined => {
                console.say(format!("{} declined.", target.name));
                continue;
            }
            InviteOutcome::TimedOut => {
                console.say(format!("{} did not answer.", target.name));
                continue;
            }
        }

        let mut channel = match scanner.rendezvous(target) {
            Ok(channel) => channel,
            Err(e @ (NetError::ResourceExhaustion | NetError::PeerUnreachable)) => {
                warn!(peer = %target.addr, error = %e, "rendezvous failed");
                console.say(format!("Could not connect to {}: {}", target.name, e));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match channel.disconnect_handle() {
            Ok(handle) => session.guard.set_peer(handle),
            Err(e) => warn!(error = %e, "interrupts will not notify the opponent"),
        }
        session.heartbeat.set_in_game(true);
        let end = run_host(&mut channel, console, &session.client, &config.game, &mut rng);
        session.heartbeat.set_in_game(false);
        session.guard.clear_peer();
        info!(peer = %channel.peer_addr(), end = ?end, "session over");
    }
}

/// Invited peer: answer invitations and play as guest until interrupted
pub fn run_listen(config: &Config, lobby_addr: &str) -> Result<(), AppError> {
    let mut console = Console::stdio();
    let Some(session) = sign_in(&mut console, config, lobby_addr)? else {
        return Ok(());
    };
    let result = listen_loop(&mut console, config, &session);
    session.heartbeat.shutdown();
    result
}

fn listen_loop<R: io::BufRead, W: io::Write>(
    console: &mut Console<R, W>,
    config: &Config,
    session: &Session,
) -> Result<(), AppError> {
    let mut listener = Listener::bind(&config.discovery, &session.username)?;
    console.say(format!(
        "Waiting for invitations on {} as {}. Ctrl-C to quit.",
        listener.local_addr()?,
        session.username
    ));

    loop {
        let mut channel = listener.wait_for_match(console)?;
        match channel.disconnect_handle() {
            Ok(handle) => session.guard.set_peer(handle),
            Err(e) => warn!(error = %e, "interrupts will not notify the opponent"),
        }
        session.heartbeat.set_in_game(true);
        let end = run_guest(&mut channel, console, &session.client, &config.game);
        session.heartbeat.set_in_game(false);
        session.guard.clear_peer();
        info!(peer = %channel.peer_addr(), end = ?end, "session over");
        console.say("Waiting for the next invitation...");
    }
}
