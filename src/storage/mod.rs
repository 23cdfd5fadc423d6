//! Persistent presence storage using SQLite (rusqlite)
//!
//! This module provides:
//! - OS-standard data directory location (via `directories` crate)
//! - SQLite database with schema versioning
//! - Account table (username, argon2 credential hash)
//! - Presence table (login count, wins, losses, last seen, online flag)
//!
//! The store is shared by every lobby worker. All access goes through a single
//! connection behind a mutex, and every counter update is a single `UPDATE`
//! statement, so concurrent read-modify-write on one username cannot lose updates.

pub mod credentials;

use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version. Bump this when making schema changes.
/// Version history:
/// - v1: users and users_status tables
const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not determine data directory")]
    NoDataDirectory,

    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchemaVersion { found: u32, supported: u32 },

    #[error("failed to create data directory: {0}")]
    CreateDirFailed(std::io::Error),

    #[error("credential hashing failed: {0}")]
    Credential(String),
}

/// Snapshot of a user's presence, as returned to a freshly logged-in peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub username: String,
    pub login_count: u32,
    pub wins: u32,
    pub losses: u32,
    /// Unix timestamp (milliseconds) of the last presence change
    pub last_seen: i64,
    pub online: bool,
}

/// Cumulative result adjustment carried by a status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDelta {
    #[serde(default)]
    pub wins_delta: u32,
    #[serde(default)]
    pub losses_delta: u32,
    #[serde(default)]
    pub in_game: bool,
}

impl StatusDelta {
    /// Heartbeat-only report: no result change, not in a game
    pub fn idle() -> Self {
        Self::default()
    }

    /// Report for a finished game, from the reporting side's perspective
    pub fn game_result(won: bool) -> Self {
        Self {
            wins_delta: u32::from(won),
            losses_delta: u32::from(!won),
            in_game: false,
        }
    }
}

/// Durable username -> presence mapping.
pub struct PresenceStore {
    conn: Mutex<Connection>,
}

impl PresenceStore {
    /// Open or create the store at the OS-standard location.
    ///
    /// - Linux: `$XDG_DATA_HOME/landuel/` or `~/.local/share/landuel/`
    /// - macOS: `~/Library/Application Support/landuel/`
    pub fn open_default() -> Result<Self, StorageError> {
        let data_dir = Self::data_dir()?;
        Self::open(&data_dir.join("presence.db"))
    }

    /// Open or create the store at an explicit path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::CreateDirFailed)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the OS-standard data directory
    pub fn data_dir() -> Result<PathBuf, StorageError> {
        ProjectDirs::from("", "", "landuel")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDirectory)
    }

    /// Create an account and its presence row.
    ///
    /// Returns `false` without touching anything if the username is taken.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<bool, StorageError> {
        let now = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, now],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR IGNORE INTO users_status (username, login_count, wins, losses, last_seen, online)
             VALUES (?1, 0, 0, 0, ?2, 0)",
            params![username, now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Stored credential hash, or `None` for an unknown username.
    pub fn password_hash(&self, username: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Count a successful login and mark the user online.
    pub fn record_login(&self, username: &str) -> Result<PresenceRecord, StorageError> {
        let conn = self.conn.lock();
        ensure_status_row(&conn, username)?;
        conn.execute(
            "UPDATE users_status SET login_count = login_count + 1, online = 1, last_seen = ?1
             WHERE username = ?2",
            params![now_millis(), username],
        )?;
        select_presence(&conn, username)?.ok_or(StorageError::Database(
            rusqlite::Error::QueryReturnedNoRows,
        ))
    }

    /// Apply a status report. `online` overrides the flag when given.
    pub fn apply_status(
        &self,
        username: &str,
        delta: &StatusDelta,
        online: Option<bool>,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        ensure_status_row(&conn, username)?;
        conn.execute(
            "UPDATE users_status
             SET wins = wins + ?1, losses = losses + ?2, last_seen = ?3, online = COALESCE(?4, online)
             WHERE username = ?5",
            params![
                delta.wins_delta,
                delta.losses_delta,
                now_millis(),
                online,
                username
            ],
        )?;
        Ok(())
    }

    /// Mark a user offline and stamp `last_seen`.
    pub fn mark_offline(&self, username: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users_status SET online = 0, last_seen = ?1 WHERE username = ?2",
            params![now_millis(), username],
        )?;
        Ok(())
    }

    /// Clear every online flag. Run once when the lobby starts.
    pub fn reset_online_flags(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        Ok(conn.execute("UPDATE users_status SET online = 0 WHERE online = 1", [])?)
    }

    /// Current presence snapshot for a user.
    pub fn presence(&self, username: &str) -> Result<Option<PresenceRecord>, StorageError> {
        let conn = self.conn.lock();
        select_presence(&conn, username)
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StorageError::FutureSchemaVersion {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='meta'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT schema_version FROM meta LIMIT 1", [], |row| {
            row.get::<_, u32>(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn create_schema_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            schema_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users_status (
            username TEXT PRIMARY KEY,
            login_count INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            last_seen INTEGER NOT NULL,
            online INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (username) REFERENCES users (username) ON DELETE CASCADE
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO meta (schema_version, created_at) VALUES (?1, ?2)",
        params![SCHEMA_VERSION, now_millis()],
    )?;

    Ok(())
}

fn ensure_status_row(conn: &Connection, username: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO users_status (username, login_count, wins, losses, last_seen, online)
         VALUES (?1, 0, 0, 0, ?2, 0)",
        params![username, now_millis()],
    )?;
    Ok(())
}

fn select_presence(conn: &Connection, username: &str) -> Result<Option<PresenceRecord>, StorageError> {
    let record = conn
        .query_row(
            "SELECT username, login_count, wins, losses, last_seen, online
             FROM users_status WHERE username = ?1",
            params![username],
            |row| {
                Ok(PresenceRecord {
                    username: row.get(0)?,
                    login_count: row.get(1)?,
                    wins: row.get(2)?,
                    losses: row.get(3)?,
                    last_seen: row.get(4)?,
                    online: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store_with_user(name: &str) -> PresenceStore {
        let store = PresenceStore::open_in_memory().unwrap();
        assert!(store.create_user(name, "hash").unwrap());
        store
    }

    #[test]
    fn test_create_user_initializes_presence() {
        let store = store_with_user("alice");
        let record = store.presence("alice").unwrap().unwrap();
        assert_eq!(record.login_count, 0);
        assert_eq!(record.wins, 0);
        assert_eq!(record.losses, 0);
        assert!(!record.online);
    }

    #[test]
    fn test_create_user_rejects_duplicate() {
        let store = store_with_user("alice");
        assert!(!store.create_user("alice", "other").unwrap());
        assert_eq!(store.password_hash("alice").unwrap().as_deref(), Some("hash"));
    }

    #[test]
    fn test_password_hash_unknown_user() {
        let store = PresenceStore::open_in_memory().unwrap();
        assert!(store.password_hash("ghost").unwrap().is_none());
    }

    #[test]
    fn test_record_login_counts_and_sets_online() {
        let store = store_with_user("alice");
        store.record_login("alice").unwrap();
        let record = store.record_login("alice").unwrap();
        assert_eq!(record.login_count, 2);
        assert!(record.online);
    }

    #[test]
    fn test_apply_status_accumulates() {
        let store = store_with_user("alice");
        store
            .apply_status("alice", &StatusDelta::game_result(true), Some(true))
            .unwrap();
        store
            .apply_status("alice", &StatusDelta::game_result(false), None)
            .unwrap();
        store
            .apply_status("alice", &StatusDelta::game_result(true), None)
            .unwrap();

        let record = store.presence("alice").unwrap().unwrap();
        assert_eq!(record.wins, 2);
        assert_eq!(record.losses, 1);
        assert!(record.online);
    }

    #[test]
    fn test_apply_status_without_online_keeps_flag() {
        let store = store_with_user("alice");
        store.apply_status("alice", &StatusDelta::idle(), None).unwrap();
        assert!(!store.presence("alice").unwrap().unwrap().online);
    }

    #[test]
    fn test_mark_offline_updates_last_seen() {
        let store = store_with_user("alice");
        let before = store.record_login("alice").unwrap();
        store.mark_offline("alice").unwrap();
        let after = store.presence("alice").unwrap().unwrap();
        assert!(!after.online);
        assert!(after.last_seen >= before.last_seen);
    }

    #[test]
    fn test_reset_online_flags() {
        let store = store_with_user("alice");
        assert!(store.create_user("bob", "hash").unwrap());
        store.record_login("alice").unwrap();
        store.record_login("bob").unwrap();

        assert_eq!(store.reset_online_flags().unwrap(), 2);
        assert!(!store.presence("alice").unwrap().unwrap().online);
        assert!(!store.presence("bob").unwrap().unwrap().online);
    }

    #[test]
    fn test_concurrent_status_updates_are_not_lost() {
        let store = Arc::new(store_with_user("alice"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .apply_status("alice", &StatusDelta::game_result(true), Some(true))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.presence("alice").unwrap().unwrap().wins, 200);
    }

    #[test]
    fn test_schema_version_is_current() {
        let store = PresenceStore::open_in_memory().unwrap();
        let conn = store.conn.lock();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_future_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("UPDATE meta SET schema_version = 99", []).unwrap();
        let err = PresenceStore::from_connection(conn).err().unwrap();
        assert!(matches!(
            err,
            StorageError::FutureSchemaVersion { found: 99, supported: SCHEMA_VERSION }
        ));
    }

    #[test]
    fn test_data_dir() {
        let result = PresenceStore::data_dir();
        if let Ok(path) = result {
            assert!(path.to_string_lossy().contains("landuel"));
        }
    }

    #[test]
    fn test_status_delta_json_defaults() {
        let delta: StatusDelta = serde_json::from_str(r#"{"in_game":false}"#).unwrap();
        assert_eq!(delta, StatusDelta::idle());
        assert!(serde_json::from_str::<StatusDelta>(r#"{"wins_delta":-1}"#).is_err());
    }
}
