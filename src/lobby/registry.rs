//! In-memory session registry
//!
//! Maps each logged-in username to the connection it is bound to and the time
//! of its last heartbeat. All access goes through [`SessionRegistry::lock`], so
//! a caller can check liveness and then create or remove an entry without
//! another worker slipping in between.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Identifies one accepted lobby connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Connection a session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub addr: SocketAddr,
}

/// A live (or not yet swept) session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub connection: ConnectionHandle,
    pub last_heartbeat: Instant,
}

impl SessionEntry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) <= ttl
    }
}

/// Outcome of refreshing a session heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Existing entry for this connection was refreshed
    Refreshed,
    /// No entry existed; one was created for this connection
    Rebound,
    /// Another connection holds a live session for the username
    HeldElsewhere,
}

/// Username -> session mapping behind one exclusion lock
pub struct SessionRegistry {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Take the registry lock for a check-then-write sequence
    pub fn lock(&self) -> Sessions<'_> {
        Sessions {
            ttl: self.ttl,
            map: self.sessions.lock(),
        }
    }

    /// Number of entries, live or stale
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Locked view of the registry
pub struct Sessions<'a> {
    ttl: Duration,
    map: MutexGuard<'a, HashMap<String, SessionEntry>>,
}

impl Sessions<'_> {
    /// Whether `username` has a session whose heartbeat is within the TTL
    pub fn is_live(&self, username: &str, now: Instant) -> bool {
        self.map
            .get(username)
            .is_some_and(|entry| entry.is_live(now, self.ttl))
    }

    pub fn get(&self, username: &str) -> Option<&SessionEntry> {
        self.map.get(username)
    }

    /// Bind `username` to `connection` unless a live session already exists.
    ///
    /// A stale entry that the sweep has not reached yet is replaced.
    pub fn bind(&mut self, username: &str, connection: ConnectionHandle, now: Instant) -> bool {
        if self.is_live(username, now) {
            return false;
        }
        self.map.insert(
            username.to_string(),
            SessionEntry {
                connection,
                last_heartbeat: now,
            },
        );
        true
    }

    /// Refresh the heartbeat for `username` on behalf of `connection`
    pub fn refresh(&mut self, username: &str, connection: ConnectionHandle, now: Instant) -> Refresh {
        let ttl = self.ttl;
        match self.map.get_mut(username) {
            Some(entry) if entry.connection.id == connection.id => {
                entry.last_heartbeat = now;
                Refresh::Refreshed
            }
            Some(entry) if entry.is_live(now, ttl) => Refresh::HeldElsewhere,
            _ => {
                self.map.insert(
                    username.to_string(),
                    SessionEntry {
                        connection,
                        last_heartbeat: now,
                    },
                );
                Refresh::Rebound
            }
        }
    }

    /// Refresh only if `username` is already bound to `connection`
    pub fn touch(&mut self, username: &str, connection: ConnectionId, now: Instant) -> bool {
        match self.map.get_mut(username) {
            Some(entry) if entry.connection.id == connection => {
                entry.last_heartbeat = now;
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `username` regardless of owner
    pub fn remove(&mut self, username: &str) -> Option<SessionEntry> {
        self.map.remove(username)
    }

    /// Remove the entry for `username` only if `connection` owns it
    pub fn release(&mut self, username: &str, connection: ConnectionId) -> bool {
        if self
            .map
            .get(username)
            .is_some_and(|entry| entry.connection.id == connection)
        {
            self.map.remove(username);
            true
        } else {
            false
        }
    }

    /// Remove and return every username whose heartbeat is older than the TTL
    pub fn drain_expired(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, entry)| !entry.is_live(now, ttl))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.map.remove(name);
        }
        expired
    }
}
