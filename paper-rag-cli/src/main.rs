//! paper-rag CLI: ingest, index and search an academic paper corpus.
//!
//! # Usage
//!
//! ```bash
//! # Create tables and the HNSW index
//! paper-rag init
//!
//! # Ingest papers described by a metadata file
//! paper-rag ingest data/papers.json
//!
//! # Search
//! paper-rag search "graph neural networks" --mode hybrid -n 5
//! paper-rag suggest neu
//! paper-rag ask "How do graph neural networks aggregate neighbours?"
//!
//! # Index maintenance and tuning
//! paper-rag index status
//! paper-rag index rebuild --m 24 --ef-construction 96
//! paper-rag tune --output tuning.json
//! ```
//!
//! Settings come from the environment or a `.env` file; see `config.rs`.

mod commands;
mod config;
mod output;
mod telemetry;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use paper_rag::RagError;
use tracing::error;

use crate::config::Settings;

/// Ingest, index and search academic papers with pgvector.
#[derive(Parser)]
#[command(name = "paper-rag", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable info-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema and the HNSW index if missing
    Init,

    /// Ingest papers from a metadata JSON file
    Ingest {
        /// JSON array of paper metadata, each with an optional `text_file` or PDF `file_name`
        metadata: PathBuf,

        /// Directory holding the PDFs named by `file_name` [default: the metadata file's directory]
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },

    /// Replace the chunks of an existing paper from a new PDF or text file
    Reingest {
        /// Paper id
        paper_id: i64,
        /// A PDF, or extracted text with pages separated by form feeds
        source: PathBuf,
    },

    /// Search the corpus
    Search(SearchArgs),

    /// Answer a question from the closest chunks
    Ask(AskArgs),

    /// Suggest title words for a partial query
    Suggest {
        partial: String,

        /// Maximum number of suggestions
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },

    /// Inspect or maintain the HNSW index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Measure HNSW parameter combinations and recommend one
    Tune(TuneArgs),

    /// Show corpus statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SearchMode {
    Semantic,
    Text,
    Hybrid,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    #[arg(long, value_enum, default_value = "semantic")]
    mode: SearchMode,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Minimum similarity for semantic results
    #[arg(long)]
    threshold: Option<f32>,

    /// Per-query ef_search override for semantic results
    #[arg(long)]
    ef_search: Option<u32>,

    /// Hybrid weight of semantic results
    #[arg(long, default_value = "0.7")]
    semantic_weight: f32,

    /// Hybrid weight of text results
    #[arg(long, default_value = "0.3")]
    lexical_weight: f32,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AskArgs {
    question: String,

    /// Number of chunks given to the model as context
    #[arg(long, default_value = "3")]
    context_chunks: usize,

    /// Print the answer and its sources as JSON instead of streaming
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Report whether the index exists and is valid
    Status,
    /// Create the index if it does not exist
    Create,
    /// Drop the index; search falls back to exact scan
    Drop,
    /// Build with new parameters and swap in atomically
    Rebuild {
        #[arg(long)]
        m: u32,
        #[arg(long)]
        ef_construction: u32,
    },
}

#[derive(Args)]
struct TuneArgs {
    /// Number of chunks sampled as queries
    #[arg(long, default_value = "100")]
    sample_size: usize,

    /// Neighbours per query for Precision@k
    #[arg(long, default_value = "10")]
    top_k: usize,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.log_json, cli.verbose);

    if let Err(e) = run(cli.command).await {
        match e.downcast_ref::<RagError>() {
            Some(rag) => {
                error!(error = %rag, "command failed");
                eprintln!("error: {}", rag.user_message());
            }
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let app = commands::App::connect(settings).await?;

    match command {
        Command::Init => app.init().await,
        Command::Ingest { metadata, pdf_dir } => app.ingest(&metadata, pdf_dir.as_deref()).await,
        Command::Reingest { paper_id, source } => app.reingest(paper_id, &source).await,
        Command::Search(args) => app.search(args).await,
        Command::Ask(args) => app.ask(args).await,
        Command::Suggest { partial, limit } => app.suggest(&partial, limit).await,
        Command::Index { action } => app.index(action).await,
        Command::Tune(args) => app.tune(args).await,
        Command::Stats { json } => app.stats(json).await,
    }
}
