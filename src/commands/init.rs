//! # Init Command Implementation
//!
//! This module implements the `init` subcommand, which clones every configured
//! repository into `<base_dir>/<id>`.
//!
//! ## Functionality
//!
//! - **Cloning**: Repositories are cloned in parallel, limited by `jobs`
//! - **Pinning**: A configured `branch` is cloned directly, a configured
//!   `revision` is checked out afterwards
//! - **Idempotence**: Existing clones of the same remote are left alone;
//!   clones of another remote are reported as errors

use anyhow::Result;
use clap::Args;

use mistletoe::output::emoji;
use mistletoe::repository::{self, InitAction};

use super::Context;

/// Clone every configured repository
#[derive(Args, Debug)]
pub struct InitArgs {}

/// Execute the `init` command.
pub fn execute(_args: InitArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let runner = context.runner();
    let out = &context.output;

    let reports = repository::init(&config, &runner)?;
    for report in &reports {
        match report.action {
            InitAction::Cloned => println!("{} {} cloned", emoji(out, "✅", "[OK]"), report.id),
            InitAction::AlreadyCloned => {
                println!("{} {} already cloned", emoji(out, "⏭️", "[SKIP]"), report.id)
            }
        }
    }
    println!(
        "\n{} repositories ready in {}",
        reports.len(),
        config.base_dir.display()
    );
    Ok(())
}
