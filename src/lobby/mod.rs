#![allow(dead_code)]
//! Lobby: authentication and presence
//!
//! This module provides:
//! - `LobbyService`, the request handlers shared by every connection worker
//! - `SessionRegistry`, the single-active-session map with heartbeat liveness
//! - `LobbyServer`, a threaded TCP front end speaking newline-delimited JSON
//! - `LobbyClient` and `HeartbeatReporter` for the peer side
//!
//! Lock order is always registry, then store. The store's own lock is only
//! ever held for one statement or transaction.

pub mod client;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::LobbyClient;
pub use heartbeat::HeartbeatReporter;
pub use registry::{ConnectionHandle, ConnectionId, Refresh, SessionRegistry};
pub use server::LobbyServer;

use crate::storage::credentials::{hash_password, verify_password};
use crate::storage::{PresenceRecord, PresenceStore, StatusDelta, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by lobby operations
#[derive(Error, Debug)]
pub enum LobbyError {
    #[error("username {0} is already registered")]
    DuplicateUser(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("wrong password for {0}")]
    BadCredential(String),

    #[error("{0} already has an active session")]
    AlreadyActive(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Request handlers over the shared store and registry
pub struct LobbyService {
    store: Arc<PresenceStore>,
    registry: SessionRegistry,
}

impl LobbyService {
    pub fn new(store: Arc<PresenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            registry: SessionRegistry::new(ttl),
        }
    }

    pub fn store(&self) -> &PresenceStore {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create an account with a hashed credential and an empty presence record
    pub fn register(&self, username: &str, password: &str) -> Result<(), LobbyError> {
        let hash = hash_password(password)?;
        if !self.store.create_user(username, &hash)? {
            return Err(LobbyError::DuplicateUser(username.to_string()));
        }
        info!(username = %username, "registered");
        Ok(())
    }

    /// Verify credentials and bind a new session to `connection`.
    ///
    /// The liveness check and the bind happen under one registry lock, so of two
    /// concurrent logins for the same name exactly one succeeds.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        connection: ConnectionHandle,
        now: Instant,
    ) -> Result<PresenceRecord, LobbyError> {
        let hash = self
            .store
            .password_hash(username)?
            .ok_or_else(|| LobbyError::NoSuchUser(username.to_string()))?;
        if !verify_password(password, &hash) {
            return Err(LobbyError::BadCredential(username.to_string()));
        }

        let mut sessions = self.registry.lock();
        if !sessions.bind(username, connection, now) {
            return Err(LobbyError::AlreadyActive(username.to_string()));
        }
        match self.store.record_login(username) {
            Ok(record) => {
                info!(username = %username, peer = %connection.addr, "logged in");
                Ok(record)
            }
            Err(e) => {
                sessions.release(username, connection.id);
                Err(e.into())
            }
        }
    }

    /// Apply a status report. Never fails; storage errors are logged.
    ///
    /// `signed_in` says whether `connection` logged in as `username`. Only then
    /// is the heartbeat refreshed (re-creating a swept entry) and the user marked
    /// online. Reports from any other connection only carry their deltas.
    pub fn status_report(
        &self,
        username: &str,
        connection: ConnectionHandle,
        signed_in: bool,
        delta: &StatusDelta,
        now: Instant,
    ) {
        let mut sessions = self.registry.lock();
        let online = if !signed_in {
            debug!(username = %username, peer = %connection.addr, "status report from a connection that is not signed in");
            None
        } else {
            match sessions.refresh(username, connection, now) {
                Refresh::Refreshed => Some(true),
                Refresh::Rebound => {
                    debug!(username = %username, "session re-created by status report");
                    Some(true)
                }
                Refresh::HeldElsewhere => {
                    warn!(username = %username, peer = %connection.addr, "status report from a connection that does not hold the session");
                    None
                }
            }
        };
        if let Err(e) = self.store.apply_status(username, delta, online) {
            warn!(username = %username, error = %e, "failed to apply status report");
        }
    }

    /// Mark offline and drop the session. Safe to call repeatedly.
    pub fn logout(&self, username: &str) {
        let mut sessions = self.registry.lock();
        sessions.remove(username);
        if let Err(e) = self.store.mark_offline(username) {
            warn!(username = %username, error = %e, "failed to mark offline");
        }
        info!(username = %username, "logged out");
    }

    /// Refresh the heartbeat of a session owned by `connection`
    pub fn touch(&self, username: &str, connection: ConnectionId, now: Instant) -> bool {
        self.registry.lock().touch(username, connection, now)
    }

    /// Tear down whatever `connection` had bound.
    ///
    /// A session that has meanwhile been re-bound to another connection is left alone.
    pub fn disconnect(&self, username: &str, connection: ConnectionId) {
        let mut sessions = self.registry.lock();
        if !sessions.release(username, connection) {
            return;
        }
        if let Err(e) = self.store.mark_offline(username) {
            warn!(username = %username, error = %e, "failed to mark offline on disconnect");
        }
        debug!(username = %username, "session released on disconnect");
    }

    /// Expire every session whose heartbeat is older than the TTL
    pub fn sweep_once(&self, now: Instant) -> Vec<String> {
        let mut sessions = self.registry.lock();
        let expired = sessions.drain_expired(now);
        for username in &expired {
            if let Err(e) = self.store.mark_offline(username) {
                warn!(username = %username, error = %e, "failed to mark expired session offline");
            }
            info!(username = %username, "session expired");
        }
        expired
    }
}
