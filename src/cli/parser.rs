//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tandem: hybrid speculative + agentic RAG query engine.
///
/// Streams a progressively refined answer built from a fast
/// speculative pass and a deep agentic reasoning pass.
#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per stream chunk.
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a query's complexity and show the recommended mode.
    ///
    /// Runs offline; no backends required.
    #[command(after_help = r#"Examples:
  tandem analyze "What is Python?"
  tandem analyze "Compare and contrast REST and GraphQL" --format json
"#)]
    Analyze {
        /// Query text to analyze.
        query: String,
    },

    /// Run a query against a JSON corpus file.
    ///
    /// Loads the corpus into in-memory vector + BM25 indexes and
    /// streams the progressive answer. Requires an OpenAI-compatible
    /// API key in OPENAI_API_KEY (or TANDEM_API_KEY).
    #[command(after_help = r#"Examples:
  tandem query "What are transformers?" --corpus docs.json
  tandem query "Compare the options" --corpus docs.json --mode balanced
  tandem query "quick lookup" --corpus docs.json --mode fast -k 5
  tandem --format json query "What is Rust?" --corpus docs.json

Corpus file format: a JSON array of {"id", "name", "text"} objects.
"#)]
    Query {
        /// Query text.
        query: String,

        /// Path to the JSON corpus file.
        #[arg(short, long)]
        corpus: PathBuf,

        /// Processing mode: auto, fast, balanced, deep.
        #[arg(short, long, default_value = "auto")]
        mode: String,

        /// Number of sources to retrieve.
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Session identifier for conversation context.
        #[arg(short, long)]
        session: Option<String>,

        /// Disable the speculative response cache.
        #[arg(long)]
        no_cache: bool,
    },
}
