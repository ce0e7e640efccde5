//! `cluster` — an operator CLI for the membership and rebuild-
//! coordination core.
//!
//! # Quick Start
//!
//! ```bash
//! # List every known member of the demo cluster
//! cluster member ls
//!
//! # Inspect one member
//! cluster member get 2
//!
//! # Check a pool's rebuild status
//! cluster rebuild query 1
//! ```
//!
//! Every command spins up its own short-lived in-process demo cluster
//! (see `demo.rs`): there is no persistent daemon to connect to, so
//! state does not carry over between invocations.

mod commands;
mod demo;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cluster")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Membership view commands.
    #[command(subcommand)]
    Member(MemberCommands),

    /// Rebuild status commands.
    #[command(subcommand)]
    Rebuild(RebuildCommands),
}

#[derive(Subcommand)]
enum MemberCommands {
    /// List every known member.
    Ls,

    /// Show one member's full state.
    Get {
        /// Rank to inspect.
        rank: u64,
    },
}

#[derive(Subcommand)]
enum RebuildCommands {
    /// List the status of every given pool (defaults to the demo pool
    /// if none are given).
    Ls {
        /// Pool IDs to query.
        pools: Vec<u64>,
    },

    /// Show one pool's rebuild status.
    Query {
        /// Pool ID to query.
        pool: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Member(MemberCommands::Ls) => commands::member::ls().await,
        Commands::Member(MemberCommands::Get { rank }) => commands::member::get(rank).await,
        Commands::Rebuild(RebuildCommands::Ls { pools }) => commands::rebuild::ls(&pools).await,
        Commands::Rebuild(RebuildCommands::Query { pool }) => commands::rebuild::query(pool).await,
    }
}
