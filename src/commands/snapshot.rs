//! # Snapshot Command Implementation
//!
//! This module implements the `snapshot` subcommand, which records the branch
//! and revision of every cloned repository into
//! `mistletoe-snapshot-<identifier>.json`. The identifier only depends on the
//! recorded refs, so equal states always produce the same file name.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use mistletoe::output::emoji;
use mistletoe::snapshot::Snapshot;

use super::Context;

/// Record the exact state of every repository
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Directory to write the snapshot file into.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,
}

/// Execute the `snapshot` command.
pub fn execute(args: SnapshotArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let runner = context.runner();

    let snapshot = Snapshot::generate(&config, &runner)?;
    if snapshot.repositories.is_empty() {
        anyhow::bail!("No repositories cloned yet. Run `mstl init` first.");
    }
    let path = snapshot.write_to(&args.output)?;
    println!(
        "{} Snapshot of {} repositories written to {}",
        emoji(&context.output, "📸", "[OK]"),
        snapshot.repositories.len(),
        path.display()
    );
    Ok(())
}
