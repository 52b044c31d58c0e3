//! # Mistletoe CLI
//!
//! This is the binary entry point for the `mstl` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging and color output.
//! - Turning library errors into a message and a non-zero exit status.
//!
//! The engine itself lives in the `mistletoe` library crate; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
