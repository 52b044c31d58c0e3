//! # Status Command Implementation
//!
//! This module implements the `status` subcommand, which prints one line per
//! cloned repository with its sync markers:
//!
//! - `>` local commits not pushed yet
//! - `<` remote commits not pulled yet
//! - `!` both, and merging would conflict
//! - `-` in sync
//!
//! This command never changes a repository, except for clearing upstreams
//! that point to remote branches which no longer exist.

use anyhow::Result;
use clap::Args;

use mistletoe::output::render_status;
use mistletoe::status::{self, StatusOptions};

use super::Context;

/// Show how every repository relates to its remote branch
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only use remote-tracking refs; never contact the remotes.
    #[arg(long)]
    pub no_fetch: bool,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let runner = context.runner();
    let records = status::collect(
        &config,
        &runner,
        StatusOptions {
            no_fetch: args.no_fetch,
        },
    );

    if records.is_empty() {
        println!("No repositories cloned yet. Run `mstl init` first.");
        return Ok(());
    }
    print!("{}", render_status(&records, &context.output));
    Ok(())
}
