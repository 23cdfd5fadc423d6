//! Periodic status push from a signed-in peer to the lobby

use super::LobbyClient;
use crate::storage::StatusDelta;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Background heartbeat for one signed-in client.
///
/// Every interval it sends a zero-delta `status_report` carrying the current
/// `in_game` flag. `shutdown` stops the thread and logs out.
pub struct HeartbeatReporter {
    client: LobbyClient,
    in_game: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl HeartbeatReporter {
    pub fn start(client: LobbyClient, interval: Duration) -> Self {
        let in_game = Arc::new(AtomicBool::new(false));
        let (stop, stop_rx) = channel::<()>();

        let worker = {
            let client = client.clone();
            let in_game = Arc::clone(&in_game);
            thread::spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        client.status_report(StatusDelta {
                            in_game: in_game.load(Ordering::SeqCst),
                            ..StatusDelta::idle()
                        });
                    }
                    _ => break,
                }
            })
        };

        debug!(interval_ms = interval.as_millis() as u64, "heartbeat started");

        Self {
            client,
            in_game,
            stop: Some(stop),
            worker: Some(worker),
        }
    }

    /// Flag carried by subsequent heartbeats
    pub fn set_in_game(&self, in_game: bool) {
        self.in_game.store(in_game, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Stop heartbeats, report idle, and log out
    pub fn shutdown(mut self) {
        self.stop();
        self.client.status_report(StatusDelta::idle());
        self.client.logout();
    }
}

impl Drop for HeartbeatReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
