//! # finrag CLI
//!
//! ## Usage
//!
//! ```bash
//! finrag --config ./config/finrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finrag ask "<question>"` | Retrieve evidence for one question |
//! | `finrag signals "<question>"` | Show category, year, period and filter only |
//! | `finrag repl` | Ask questions interactively |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=finrag_core=debug`) to
//! see every index attempt.

use clap::{Parser, Subcommand};
use finrag::ask::{self, AskOptions};
use finrag::config;
use finrag_core::FilterOverride;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// finrag: evidence retrieval for Spanish financial questions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/finrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "finrag",
    about = "Signal-driven evidence retrieval over a financial document index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/finrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve evidence for a question.
    ///
    /// Detects the document category and time frame, filters the index
    /// accordingly and relaxes the filter when nothing matches.
    Ask {
        question: String,

        /// Number of evidence chunks to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Use this JSON filter instead of the detected one, e.g.
        /// `{"doc_type":"important_facts","year":2023}`.
        #[arg(long = "where", conflicts_with = "no_filter")]
        where_json: Option<String>,

        /// Search the whole index without any filter.
        #[arg(long)]
        no_filter: bool,

        /// Print the signal trace and every index attempt.
        #[arg(long)]
        debug: bool,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show detected signals for a question (no embedding, no index).
    Signals { question: String },

    /// Interactive question loop.
    Repl {
        #[arg(long)]
        top_k: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("finrag=info,finrag_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Signals { question } = &cli.command {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            config::Config::minimal()
        };
        ask::run_signals(&cfg, question)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            top_k,
            where_json,
            no_filter,
            debug,
            json,
        } => {
            let filter_override = match (where_json, no_filter) {
                (Some(json), _) => Some(FilterOverride::Where(ask::parse_where(&json)?)),
                (None, true) => Some(FilterOverride::Unfiltered),
                (None, false) => None,
            };
            let opts = AskOptions {
                top_k,
                filter_override,
                debug,
                json,
            };
            ask::run_ask(&cfg, &question, opts).await?;
        }
        Commands::Repl { top_k } => {
            ask::run_repl(&cfg, top_k).await?;
        }
        // Handled above (before config loading)
        Commands::Signals { .. } => {}
    }

    Ok(())
}
