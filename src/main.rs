//! # Portfolio RAG CLI (`prag`)
//!
//! The `prag` binary ingests career documents into a persisted vector index
//! and answers questions over them with citations.
//!
//! ## Usage
//!
//! ```bash
//! prag --config ./config/prag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prag init` | Create an empty index on disk |
//! | `prag ingest` | Ingest every configured source directory and GitHub |
//! | `prag add <file>` | Ingest a single file |
//! | `prag search "<query>"` | Show ranked chunks for a query |
//! | `prag query "<question>"` | Answer a question with citations |
//! | `prag stats` | Show index counts by source |
//! | `prag completions <shell>` | Print shell completions |
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `-v` raises the level to
//! debug; `RUST_LOG` overrides both.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use portfolio_rag::commands;
use portfolio_rag::config;
use portfolio_rag::context::AppContext;
use portfolio_rag::ingest::UPLOAD_SOURCE;
use portfolio_rag::progress::ProgressMode;

/// Portfolio RAG CLI: question answering over career documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/prag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "prag",
    about = "Portfolio RAG: question answering over career documents with source-weighted citations",
    version,
    long_about = "Portfolio RAG ingests HR records, applicant-tracking exports, and GitHub profile \
    data, masks PII per source, and answers questions from a persisted vector index, ranking \
    evidence by similarity and per-source trust weight."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/prag.toml")]
    config: PathBuf,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create an empty index at `[index].path`.
    ///
    /// Writes `<path>.index` and `<path>.docs`. Running it again on an
    /// existing index leaves it untouched.
    Init,

    /// Ingest configured sources.
    ///
    /// Walks `<ingest.root>/<source>` for every source in `[ingest].sources`,
    /// then fetches GitHub data when `[github].enabled` is set. Each source
    /// is stored as one batch.
    Ingest {
        /// Only ingest this source (a directory source name or `github`).
        #[arg(long)]
        source: Option<String>,

        /// Skip the GitHub source.
        #[arg(long)]
        no_github: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Ingest a single text file.
    Add {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        /// Source system the file belongs to; selects its transform rule.
        #[arg(long, default_value = UPLOAD_SOURCE)]
        source: String,
    },

    /// Show the chunks most relevant to a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity. Defaults to `[retrieval].threshold`.
        #[arg(long)]
        threshold: Option<f32>,

        /// Rank by raw similarity instead of similarity times source weight.
        #[arg(long)]
        raw: bool,
    },

    /// Answer a question from the indexed documents, with citations.
    Query {
        /// The question.
        query: String,

        /// Number of chunks handed to the answer generator.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity for a chunk to be used.
        #[arg(long)]
        threshold: Option<f32>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index counts by source.
    Stats,

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("portfolio_rag=debug,portfolio_rag_core=debug,warn")
        } else {
            EnvFilter::new("portfolio_rag=info,portfolio_rag_core=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "prag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let ctx = AppContext::open(cfg)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&ctx).await?;
        }
        Commands::Ingest {
            source,
            no_github,
            progress,
        } => {
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            commands::run_ingest(&ctx, source.as_deref(), !no_github, reporter.as_ref()).await?;
        }
        Commands::Add { file, source } => {
            commands::run_add(&ctx, &file, &source).await?;
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            raw,
        } => {
            commands::run_search(&ctx, &query, top_k, threshold, raw).await?;
        }
        Commands::Query {
            query,
            top_k,
            threshold,
            json,
        } => {
            commands::run_query(&ctx, &query, top_k, threshold, json).await?;
        }
        Commands::Stats => {
            commands::run_stats(&ctx).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
