//! Ctrl-C handling for a signed-in peer

use crate::lobby::LobbyClient;
use crate::network::DisconnectHandle;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Says goodbye to the current opponent and the lobby when interrupted.
///
/// Every notification is fire-and-forget so the process can exit right after.
#[derive(Clone)]
pub struct InterruptGuard {
    peer: Arc<Mutex<Option<DisconnectHandle>>>,
    lobby: LobbyClient,
}

impl InterruptGuard {
    pub fn new(lobby: LobbyClient) -> Self {
        Self {
            peer: Arc::new(Mutex::new(None)),
            lobby,
        }
    }

    /// Install the process-wide handler; it notifies and exits with code 0
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let guard = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupted");
            guard.notify();
            std::process::exit(0);
        })
    }

    /// Opponent to notify while a match is running
    pub fn set_peer(&self, handle: DisconnectHandle) {
        *self.peer.lock() = Some(handle);
    }

    pub fn clear_peer(&self) {
        self.peer.lock().take();
    }

    /// Send DISCONNECT to the opponent, then report idle and log out.
    /// Nothing here waits for an answer.
    pub fn notify(&self) {
        if let Some(peer) = self.peer.lock().take() {
            peer.disconnect("interrupted");
        }
        self.lobby.sign_off_now();
    }
}
