//! # Pr Command Implementation
//!
//! This module implements the `pr` subcommands, which drive one pull request
//! per repository through the GitHub CLI (`gh`).
//!
//! ## Functionality
//!
//! - **create**: pushes unpublished branches, opens missing pull requests and
//!   writes the metadata block (links to the other pull requests, snapshot,
//!   dependency graph) into every description
//! - **update**: refreshes the metadata block of existing open pull requests
//! - **status**: lists the pull requests of every repository's current branch
//!
//! `create` and `update` refuse to start while an affected repository is
//! behind, conflicted or detached, and stop before pushing when a HEAD moves
//! during the run.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use mistletoe::github;
use mistletoe::output::{emoji, render_pr_status};
use mistletoe::phases::orchestrator::{self, Mode, Outcome, PrOptions};
use mistletoe::phases::publish::PrTemplate;
use mistletoe::status::{self, StatusOptions};

use super::Context;

#[derive(Subcommand, Debug)]
pub enum PrCommand {
    /// Open pull requests for every repository with changes
    Create(PrCreateArgs),

    /// Refresh the descriptions of existing pull requests
    Update(PrUpdateArgs),

    /// List the pull requests of every repository
    Status(PrStatusArgs),
}

/// Open pull requests for every repository with changes
#[derive(Args, Debug)]
pub struct PrCreateArgs {
    /// Title of new pull requests. Defaults to the branch name.
    #[arg(short, long)]
    pub title: Option<String>,

    /// Body of new pull requests, above the metadata block.
    #[arg(short, long)]
    pub body: Option<String>,

    /// Open new pull requests as drafts.
    #[arg(long)]
    pub draft: bool,

    /// Dependency graph between repositories (mermaid flowchart).
    #[arg(short, long, value_name = "FILE")]
    pub dependencies: Option<PathBuf>,

    /// Move local commits on a base branch to a freshly published branch.
    #[arg(long)]
    pub new_branch: bool,

    /// Only show what would be done.
    #[arg(long)]
    pub dry_run: bool,

    /// Only use remote-tracking refs for status; never contact the remotes.
    #[arg(long)]
    pub no_fetch: bool,
}

/// Refresh the descriptions of existing pull requests
#[derive(Args, Debug)]
pub struct PrUpdateArgs {
    /// Dependency graph between repositories (mermaid flowchart).
    #[arg(short, long, value_name = "FILE")]
    pub dependencies: Option<PathBuf>,

    /// Only show what would be done.
    #[arg(long)]
    pub dry_run: bool,

    /// Only use remote-tracking refs for status; never contact the remotes.
    #[arg(long)]
    pub no_fetch: bool,
}

/// List the pull requests of every repository
#[derive(Args, Debug)]
pub struct PrStatusArgs {
    /// Only use remote-tracking refs for status; never contact the remotes.
    #[arg(long)]
    pub no_fetch: bool,
}

/// Execute a `pr` subcommand.
pub fn execute(command: PrCommand, context: &Context) -> Result<()> {
    match command {
        PrCommand::Create(args) => {
            let options = PrOptions {
                mode: Mode::Create,
                template: PrTemplate {
                    title: args.title,
                    body: args.body,
                    draft: args.draft,
                },
                dependencies: args.dependencies,
                new_branch: args.new_branch,
                dry_run: args.dry_run,
                status: StatusOptions {
                    no_fetch: args.no_fetch,
                },
            };
            run_workflow(&options, context)
        }
        PrCommand::Update(args) => {
            let options = PrOptions {
                mode: Mode::Update,
                dependencies: args.dependencies,
                dry_run: args.dry_run,
                status: StatusOptions {
                    no_fetch: args.no_fetch,
                },
                ..Default::default()
            };
            run_workflow(&options, context)
        }
        PrCommand::Status(args) => show_status(args, context),
    }
}

fn run_workflow(options: &PrOptions, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let runner = context.runner();
    let outcome = orchestrator::execute_pr(&config, &runner, options)?;
    print_outcome(&outcome, context);
    Ok(())
}

fn print_outcome(outcome: &Outcome, context: &Context) {
    let out = &context.output;
    let plan = &outcome.plan;
    let list = |ids: &[String]| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.join(", ")
        }
    };

    if outcome.dry_run {
        println!("{} Dry run, nothing was changed", emoji(out, "🔍", "[DRY-RUN]"));
        if !plan.new_branches.is_empty() {
            println!("   new branch: {}", list(&plan.new_branches));
        }
        println!("   push:       {}", list(&plan.categorization.push));
        println!("   create:     {}", list(&plan.categorization.create));
        println!("   update:     {}", list(&plan.categorization.update));
        println!("   skip:       {}", list(&plan.categorization.skipped));
        return;
    }

    if plan.categorization.is_empty() {
        println!("{} Nothing to do", emoji(out, "✅", "[OK]"));
        return;
    }
    for (id, branch) in &outcome.published_branches {
        println!("{} {}: published {}", emoji(out, "🌱", "[BRANCH]"), id, branch);
    }
    for id in &plan.categorization.push {
        println!("{} {}: pushed", emoji(out, "⬆️", "[PUSH]"), id);
    }
    for (id, url) in &outcome.created {
        println!("{} {}: created {}", emoji(out, "✨", "[NEW]"), id, url);
    }
    for id in &outcome.updated {
        println!("{} {}: description updated", emoji(out, "📝", "[EDIT]"), id);
    }
}

fn show_status(args: PrStatusArgs, context: &Context) -> Result<()> {
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
    let lookups = github::lookup_all(&records, &runner, config.jobs)?;
    print!(
        "{}",
        render_pr_status(
            lookups.iter().map(|(id, lookup)| (id.as_str(), lookup)),
            &context.output
        )
    );
    Ok(())
}
