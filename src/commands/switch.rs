//! # Switch Command Implementation
//!
//! This module implements the `switch` subcommand, which checks out the same
//! branch in every cloned repository at once.

use anyhow::Result;
use clap::Args;

use mistletoe::output::emoji;
use mistletoe::repository;

use super::Context;

/// Check out a branch in every repository
#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Branch to check out.
    pub branch: String,

    /// Create the branch where it does not exist yet.
    #[arg(short = 'c', long)]
    pub create: bool,
}

/// Execute the `switch` command.
pub fn execute(args: SwitchArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let runner = context.runner();

    let switched = repository::switch(&config, &runner, &args.branch, args.create)?;
    println!(
        "{} Switched {} repositories to {}",
        emoji(&context.output, "🔀", "[OK]"),
        switched.len(),
        args.branch
    );
    Ok(())
}
