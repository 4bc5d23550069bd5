//! # LexVault server binary
//!
//! ```bash
//! lexvault --config ./config/lexvault.toml init    # create database + schema
//! lexvault --config ./config/lexvault.toml serve   # start the HTTP API
//! ```
//!
//! Configuration is TOML (database path, upload directory, chunking,
//! retrieval, embedding, and model settings). API keys are read from the
//! environment (`OPENAI_API_KEY`), never from config.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lexvault::{config, db, migrate, server};

/// LexVault — a case-scoped retrieval-augmented legal assistant service.
#[derive(Parser)]
#[command(
    name = "lexvault",
    about = "LexVault — a case-scoped retrieval-augmented legal assistant service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent;
    /// running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Migrations are re-applied on startup, so a fresh deployment can go
    /// straight to `serve`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Serve => {
            server::run_server(config).await?;
        }
    }

    Ok(())
}
