//! # Codex CLI (`codex`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codex init` | Create the SQLite database and run schema migrations |
//! | `codex enqueue` | Queue an index job |
//! | `codex job <id>` | Show an index job |
//! | `codex worker` | Run the indexing worker until Ctrl-C |
//! | `codex serve` | Start the HTTP API |
//! | `codex search "<query>"` | Search indexed documents |
//! | `codex get <id>` | Print a document |
//!
//! ```bash
//! codex --config ./config/codex.toml init
//! codex --config ./config/codex.toml enqueue
//! codex --config ./config/codex.toml worker
//! ```

use clap::{Parser, Subcommand};
use codex_indexer::{config, get, jobs, migrate, search, server, worker};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Codex: background markdown indexer and full-text search.
#[derive(Parser)]
#[command(name = "codex", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codex.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `CODEX_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Queue a new index job.
    Enqueue,

    /// Show the state of an index job.
    Job {
        /// Job id.
        id: i64,
    },

    /// Run the indexing worker.
    ///
    /// Claims pending jobs, rescans the docs root and syncs the document
    /// set. Runs until interrupted.
    Worker {
        /// Process at most one job, then exit.
        #[arg(long)]
        once: bool,
    },

    /// Start the HTTP API.
    Serve,

    /// Search indexed documents.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (1-50).
        #[arg(long, default_value_t = search::DEFAULT_LIMIT)]
        limit: i64,
    },

    /// Print a document by id.
    Get {
        /// Document id.
        id: i64,
    },
}

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("CODEX_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Configuration errors are fatal before any work starts
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Enqueue => jobs::run_enqueue(&cfg).await?,
        Commands::Job { id } => jobs::run_job(&cfg, id).await?,
        Commands::Worker { once } => worker::run_worker(&cfg, once).await?,
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Search { query, limit } => search::run_search(&cfg, &query, limit).await?,
        Commands::Get { id } => get::run_get(&cfg, id).await?,
    }

    Ok(())
}
