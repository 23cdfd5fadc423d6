//! Runtime configuration
//!
//! Every tunable has a built-in default. A TOML file can override any subset
//! of the fields, and the CLI then overrides individual values on top.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Complete configuration for lobby and peer processes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lobby: LobbyConfig,
    pub discovery: DiscoveryConfig,
    pub game: GameConfig,
}

/// Lobby server and heartbeat settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Address the lobby server listens on (and peers connect to)
    pub bind_addr: String,
    /// PresenceStore location; `None` means the OS data directory
    pub database: Option<PathBuf>,
    /// Session liveness threshold
    pub heartbeat_ttl_ms: u64,
    /// How often the liveness sweep wakes up
    pub sweep_interval_ms: u64,
    /// How often a playing peer pushes a status report
    pub report_interval_ms: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:15000".to_string(),
            database: None,
            heartbeat_ttl_ms: 15_000,
            sweep_interval_ms: 10_000,
            report_interval_ms: 5_000,
        }
    }
}

impl LobbyConfig {
    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

/// Peer discovery and rendezvous settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// First UDP port probed by a scan
    pub scan_port_start: u16,
    /// Last UDP port probed by a scan (inclusive)
    pub scan_port_end: u16,
    /// UDP port a listening peer binds
    pub listen_port: u16,
    /// Destination address for SEARCH datagrams
    pub broadcast_addr: IpAddr,
    pub scan_timeout_ms: u64,
    pub invite_window_ms: u64,
    pub invite_retry_ms: u64,
    pub pending_window_ms: u64,
    /// First TCP port tried when binding the rendezvous listener
    pub tcp_base_port: u16,
    /// Number of consecutive TCP ports tried
    pub tcp_port_attempts: u16,
    pub accept_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_port_start: 10_000,
            scan_port_end: 10_010,
            listen_port: 10_002,
            broadcast_addr: IpAddr::from([255, 255, 255, 255]),
            scan_timeout_ms: 300,
            invite_window_ms: 15_000,
            invite_retry_ms: 2_000,
            pending_window_ms: 15_000,
            tcp_base_port: 10_000,
            tcp_port_attempts: 100,
            accept_timeout_ms: 10_000,
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_ports(&self) -> RangeInclusive<u16> {
        self.scan_port_start..=self.scan_port_end
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn invite_window(&self) -> Duration {
        Duration::from_millis(self.invite_window_ms)
    }

    pub fn invite_retry(&self) -> Duration {
        Duration::from_millis(self.invite_retry_ms)
    }

    pub fn pending_window(&self) -> Duration {
        Duration::from_millis(self.pending_window_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }
}

/// Match rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Round wins needed to take the match
    pub target_wins: u32,
    pub rematch_window_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            target_wins: 3,
            rematch_window_ms: 5_000,
        }
    }
}

impl GameConfig {
    pub fn rematch_window(&self) -> Duration {
        Duration::from_millis(self.rematch_window_ms)
    }
}

impl Config {
    /// Load configuration, overlaying `path` on the defaults when given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML document; missing sections and keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
