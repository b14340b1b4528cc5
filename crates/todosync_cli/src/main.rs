//! todosync CLI
//!
//! Command-line tools for todosync replicas.
//!
//! # Commands
//!
//! - `replay` - Run a recorded change log through a client or server replica
//! - `inspect` - List the records held by a replica state file
//! - `decode` - Show the operation carried by each line of a change log

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use todosync_engine::ReplicaRole;
use tracing_subscriber::EnvFilter;

/// todosync command-line replica tools.
#[derive(Parser)]
#[command(name = "todosync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Client,
    Server,
}

impl From<Role> for ReplicaRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Client => ReplicaRole::Client,
            Role::Server => ReplicaRole::Server,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines change log into a replica state file
    Replay {
        /// Side of the sync to play
        #[arg(short, long, value_enum)]
        role: Role,

        /// Change log to replay
        #[arg(short, long)]
        log: PathBuf,

        /// Replica state file (created if missing)
        #[arg(short, long)]
        state: PathBuf,

        /// Log and skip messages that cannot be resolved
        #[arg(long)]
        skip_errors: bool,

        /// Consumer group of a client replica
        #[arg(long, env = "CLIENT_ID", default_value = "client-1")]
        client_id: String,

        /// Number of client topics the server consumes
        #[arg(long, env = "NUM_CLIENTS", default_value = "1")]
        num_clients: u32,
    },

    /// List the records of a replica state file
    Inspect {
        /// Replica state file
        #[arg(short, long)]
        state: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decode every message of a JSON-lines change log
    Decode {
        /// Change log to decode
        #[arg(short, long)]
        log: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay {
            role,
            log,
            state,
            skip_errors,
            client_id,
            num_clients,
        } => {
            let options = commands::replay::ReplayOptions {
                role: role.into(),
                log,
                state,
                skip_errors,
                client_id,
                num_clients,
            };
            commands::replay::run(&options)?;
        }
        Commands::Inspect { state, format } => {
            commands::inspect::run(&state, &format)?;
        }
        Commands::Decode { log, format } => {
            commands::decode::run(&log, &format)?;
        }
        Commands::Version => {
            println!("todosync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
