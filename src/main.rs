//! namechaind CLI Application
//!
//! A command-line interface for inspecting and driving a local chain.

use clap::{Parser, Subcommand};
use namechain::cli::{self, AppState};
use namechain::config::Network;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "namechaind")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A UTXO node with blind-auction names and tree commitments", long_about = None)]
struct Cli {
    /// Data directory for chain storage
    #[arg(short, long, default_value = ".namechain_data")]
    data_dir: PathBuf,

    /// Network preset
    #[arg(short, long, value_enum, default_value = "main")]
    network: Network,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display chain information
    Info,

    /// Connect blocks from a JSON file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the state of a name
    Name {
        /// Human-readable name
        #[arg(short, long)]
        name: String,
    },

    /// Show the balance of an address
    Balance {
        /// Base58 address
        #[arg(short, long)]
        address: String,
    },

    /// List recent tree commitments
    Roots {
        /// Number of commitments to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Disconnect blocks from the tip
    Rollback {
        /// Number of blocks to disconnect
        #[arg(short, long, default_value = "1")]
        blocks: u32,
    },

    /// Assemble and connect new blocks
    Mine {
        /// Address receiving the rewards
        #[arg(short, long)]
        address: String,

        /// Number of blocks to assemble
        #[arg(short, long, default_value = "1")]
        count: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut state = AppState::new(cli.data_dir.clone(), cli.network)?;

    match cli.command {
        Commands::Info => cli::cmd_info(&state)?,
        Commands::Import { input } => cli::cmd_import(&mut state, &input)?,
        Commands::Name { name } => cli::cmd_name(&state, &name)?,
        Commands::Balance { address } => cli::cmd_balance(&state, &address)?,
        Commands::Roots { count } => cli::cmd_roots(&state, count)?,
        Commands::Rollback { blocks } => cli::cmd_rollback(&mut state, blocks)?,
        Commands::Mine { address, count } => cli::cmd_mine(&mut state, &address, count)?,
    }

    Ok(())
}
