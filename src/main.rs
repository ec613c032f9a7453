//! Edu-Ledger CLI Application
//!
//! A command-line interface for the ledger validation engine.

use clap::{Parser, Subcommand};
use edu_ledger::cli;
use edu_ledger::config::LedgerConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "An educational permissionless ledger in Rust", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen,

    /// Mine a short demo chain with transfers
    Demo {
        /// Difficulty target in hex (e.g. eeffffff)
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Number of blocks to mine
        #[arg(short, long, default_value = "3")]
        blocks: u32,
    },

    /// Validate a file of hex-encoded blocks, one per line
    Validate {
        /// Input file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Decode and print a hex-encoded block
    Inspect {
        /// Block bytes in hex
        #[arg(long)]
        hex: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    match cli.command {
        Commands::Keygen => {
            cli::cmd_keygen()?;
        }

        Commands::Demo { difficulty, blocks } => {
            let difficulty = difficulty
                .as_deref()
                .map(cli::parse_difficulty)
                .transpose()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_demo(&config, difficulty, blocks))?;
        }

        Commands::Validate { file } => {
            cli::cmd_validate(&config, &file)?;
        }

        Commands::Inspect { hex } => {
            cli::cmd_inspect(&hex)?;
        }
    }

    Ok(())
}
