//! landuel - LAN card duel with a presence lobby
//!
//! Find a player on the local network, invite them, and play first-to-three
//! rounds with seven cards each. A central lobby keeps accounts, who is
//! online, and win/loss records.

mod app;
mod config;
mod game;
mod lobby;
mod network;
mod storage;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "landuel", version, about = "LAN card duel with a presence lobby")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the lobby server
    Lobby {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Presence database file
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Sign in, search the LAN, and invite a player
    Invite {
        /// Lobby address
        #[arg(long, default_value = "127.0.0.1:15000")]
        lobby: String,

        /// Round wins needed to take the match
        #[arg(long)]
        target_wins: Option<u32>,
    },
    /// Sign in and wait for invitations
    Listen {
        /// Lobby address
        #[arg(long, default_value = "127.0.0.1:15000")]
        lobby: String,

        /// UDP port to answer searches on
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Lobby { bind, database } => {
            if let Some(bind) = bind {
                config.lobby.bind_addr = bind;
            }
            if database.is_some() {
                config.lobby.database = database;
            }
            app::run_lobby(&config.lobby)
        }
        Command::Invite { lobby, target_wins } => {
            if let Some(target_wins) = target_wins {
                config.game.target_wins = target_wins;
            }
            app::run_invite(&config, &lobby)
        }
        Command::Listen { lobby, port } => {
            if let Some(port) = port {
                config.discovery.listen_port = port;
            }
            app::run_listen(&config, &lobby)
        }
    };

    match result {
        Ok(()) => {
            info!("Goodbye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
