//! # Groundwork CLI (`gw`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the index database (idempotent) |
//! | `gw ingest` | Rebuild the collection from the documents directory |
//! | `gw query "<q>"` | Print the top-k passages for a question |
//! | `gw ask "<q>"` | Answer a question grounded on retrieved passages |
//! | `gw status` | Show collection metadata |
//! | `gw drop` | Delete the collection |
//! | `gw serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! gw --config ./config/gw.toml ingest
//! gw query "sky color" -k 2 --scores
//! gw ask "What is the refund policy?" --style detailed --show-usage
//! RUST_LOG=groundwork=debug gw ingest
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use groundwork::prompt::AnswerStyle;
use groundwork::{ask, config, ingest, retrieve, server};

/// Groundwork: local document retrieval for grounded question answering.
///
/// Settings are read from a TOML file; a missing file means defaults
/// (documents in `data/docs`, index in `.index`). See
/// `config/gw.example.toml`.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Groundwork: local document retrieval for grounded question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gw.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index directory and schema.
    ///
    /// Also removes records left behind by interrupted ingestion runs.
    Init,

    /// Rebuild the collection from the documents directory.
    ///
    /// Every run replaces the whole collection. Queries keep seeing the
    /// previous version until the new one is complete.
    Ingest {
        /// Scan and chunk only; report counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the passages most relevant to a question.
    Query {
        question: String,

        /// Number of passages (defaults to `retrieval.top_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Print JSON (`{"results": [{"content", "source"}]}`).
        #[arg(long)]
        json: bool,

        /// Include chunk ids and similarity scores.
        #[arg(long)]
        scores: bool,
    },

    /// Answer a question using only the retrieved passages.
    Ask {
        question: String,

        #[arg(long, value_enum, default_value_t = AnswerStyle::Concise)]
        style: AnswerStyle,

        /// Print token usage when the provider reports it.
        #[arg(long)]
        show_usage: bool,

        /// Print the passages the answer was grounded on.
        #[arg(long)]
        show_sources: bool,
    },

    /// Show collection metadata.
    Status,

    /// Delete the collection.
    Drop,

    /// Start the JSON HTTP API on `server.bind`.
    Serve,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            retrieve::run_init(&cfg).await?;
        }
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Query {
            question,
            k,
            json,
            scores,
        } => {
            retrieve::run_query(&cfg, &question, k, json, scores).await?;
        }
        Commands::Ask {
            question,
            style,
            show_usage,
            show_sources,
        } => {
            ask::run_ask(&cfg, &question, style, show_usage, show_sources).await?;
        }
        Commands::Status => {
            retrieve::run_status(&cfg).await?;
        }
        Commands::Drop => {
            retrieve::run_drop(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
