//! Command-line interface.
//!
//! Thin surface over the library: `analyze` runs the offline
//! complexity analyzer, `query` drives the full engine over a JSON
//! corpus file with the in-memory backends.

// The CLI is the one place that talks to stdout
#![allow(clippy::print_stdout)]

mod commands;
mod parser;

pub use commands::{run_analyze, run_query};
pub use parser::{Cli, Commands, OutputFormat};
