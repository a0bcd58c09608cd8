//! Binary entry point for Tandem.
//!
//! Tandem: hybrid speculative + agentic RAG query engine.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tandem::cli::{Cli, Commands, run_analyze, run_query};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "tandem=debug" } else { "tandem=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Analyze { ref query } => run_analyze(query, cli.format),
        Commands::Query {
            ref query,
            ref corpus,
            ref mode,
            top_k,
            ref session,
            no_cache,
        } => {
            run_query(
                query,
                corpus,
                mode,
                top_k,
                session.clone(),
                !no_cache,
                cli.format,
            )
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
