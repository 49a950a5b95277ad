//! # movieindex CLI
//!
//! Indexes normalized movie records into Elasticsearch or MongoDB.
//!
//! ## Usage
//!
//! ```bash
//! movieindex --config ./config/movieindex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `movieindex check` | Open the configured store and print its document count |
//! | `movieindex load <file>` | Index records from a JSON array or JSON-lines file |
//! | `movieindex exists <id>` | Report whether a record with that id is stored |
//!
//! Logging goes to stderr. `-v` enables debug output, `-vv` trace output;
//! `RUST_LOG` overrides both.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use movieindex::config::{load_config, Engine};
use movieindex::ingest::{load_records, run_index, IndexOptions};
use movieindex::models::MovieRecord;
use movieindex::store::{with_store, Backend, DocumentStore};

/// movieindex — index movie metadata into Elasticsearch or MongoDB.
#[derive(Parser)]
#[command(name = "movieindex", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/movieindex.toml")]
    config: PathBuf,

    /// Override the engine selected in the configuration file.
    #[arg(long, global = true)]
    engine: Option<Engine>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the configured store and print how many documents it holds.
    Check,

    /// Index records from a JSON array or JSON-lines file.
    ///
    /// Each record is stored under its catalog id, so loading the same file
    /// twice overwrites rather than duplicates.
    Load {
        /// File with normalized movie records.
        file: PathBuf,

        /// Skip records whose id is already stored.
        #[arg(long)]
        skip_existing: bool,

        /// Log failed records and continue instead of aborting the run.
        #[arg(long)]
        keep_going: bool,

        /// Index at most this many records.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Report whether a record with the given catalog id is stored.
    Exists {
        /// Catalog identifier (e.g. tt0111161).
        id: String,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "movieindex=info",
        1 => "movieindex=debug",
        _ => "movieindex=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    let engine = cli.engine.unwrap_or(config.engine);
    let store_config = config.store_config(engine)?;

    match cli.command {
        Commands::Check => {
            let backend = Backend::open(&store_config)
                .await
                .with_context(|| format!("Failed to open {} store", engine))?;
            let total = with_store(backend, async |store| store.count(None).await).await?;
            println!("{}: {} documents", engine, total);
        }
        Commands::Load {
            file,
            skip_existing,
            keep_going,
            limit,
        } => {
            let records = load_records(&file)?;
            let options = IndexOptions {
                skip_existing,
                keep_going,
                limit,
            };
            let report = run_index(&store_config, &records, &options).await?;

            println!("load {}", file.display());
            println!("  records seen: {}", report.seen);
            println!("  stored: {}", report.stored);
            if skip_existing {
                println!("  already present: {}", report.already_present);
            }
            println!("  skipped (unencodable): {}", report.skipped_invalid);
            if keep_going {
                println!("  failed: {}", report.failed);
            }
            println!("ok");
        }
        Commands::Exists { id } => {
            let backend = Backend::open(&store_config)
                .await
                .with_context(|| format!("Failed to open {} store", engine))?;
            let probe = MovieRecord::with_id(id.clone(), "");
            let found = with_store(backend, async |store| store.exists(&probe).await).await?;
            println!("{}: {}", id, if found { "stored" } else { "not stored" });
        }
    }

    Ok(())
}
