//! Orchestrator for the complete pull request workflow
//!
//! This module coordinates all phases to provide one entry point for
//! `mstl pr create` and `mstl pr update`.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::Local;
use log::info;
use serde::Serialize;

use super::categorize::{self, Categorization};
use super::collect::Collected;
use super::publish::{Description, PrTemplate};
use super::{phase1, phase2, phase3, phase4};
use crate::branch;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::Git;
use crate::graph;
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;
use crate::snapshot::Snapshot;
use crate::status::{StatusOptions, StatusRecord};

/// Which pull requests a run may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Open missing pull requests and update existing ones.
    #[default]
    Create,
    /// Only update existing open pull requests.
    Update,
}

#[derive(Debug, Clone, Default)]
pub struct PrOptions {
    pub mode: Mode,
    pub template: PrTemplate,
    /// Dependency graph file (plain or fenced mermaid).
    pub dependencies: Option<PathBuf>,
    /// Move repositories that sit on their base branch with local commits to
    /// a freshly published branch.
    pub new_branch: bool,
    pub dry_run: bool,
    pub status: StatusOptions,
}

/// What a run intends to do.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub categorization: Categorization,
    /// Repositories that get a new branch before anything else happens.
    pub new_branches: Vec<String>,
}

/// What a run did (or, for a dry run, would do).
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub plan: Plan,
    pub dry_run: bool,
    /// Newly published branches by repository id.
    pub published_branches: BTreeMap<String, String>,
    /// URLs of created pull requests by repository id.
    pub created: BTreeMap<String, String>,
    /// Repositories whose description changed.
    pub updated: Vec<String>,
}

/// Execute the complete pull request workflow (Phases 1-4)
///
/// 1. Collect status, pull requests and base branches
/// 2. Categorize and check preconditions
/// 3. Re-validate HEADs
/// 4. Push, create pull requests, update descriptions
///
/// The dependency graph is validated before anything else runs. With
/// `dry_run` the plan is returned after Phase 2.
pub fn execute_pr(
    config: &Config,
    runner: &dyn CommandRunner,
    options: &PrOptions,
) -> Result<Outcome> {
    let dependencies = match &options.dependencies {
        Some(path) => Some(graph::load(path, &config.ids())?),
        None => None,
    };

    // Phase 1: Collection
    let mut collected = phase1::execute(config, runner, options.status)?;

    // Phase 2: Categorization
    let (mut categorization, new_branches) = plan(config, &collected, options)?;
    categorize::check_preconditions(&collected)?;

    let mut outcome = Outcome {
        plan: Plan {
            categorization: categorization.clone(),
            new_branches: new_branches.clone(),
        },
        dry_run: options.dry_run,
        ..Default::default()
    };
    if options.dry_run {
        return Ok(outcome);
    }

    if !new_branches.is_empty() {
        outcome.published_branches = publish_branches(config, &collected, runner, &new_branches)?;
        // The new branches change status and categorization.
        collected = phase1::execute(config, runner, options.status)?;
        (categorization, _) = plan(config, &collected, options)?;
        categorize::check_preconditions(&collected)?;
        outcome.plan.categorization = categorization.clone();
    }

    // Phase 3: Re-validation
    phase3::execute(&categorization, &collected, runner, config.jobs)?;

    // Phase 4: Publishing
    phase4::push(&categorization.push, &collected, runner, config.jobs)?;
    outcome.created = phase4::create(
        &categorization.create,
        &collected,
        runner,
        config.jobs,
        &options.template,
    )?;

    let snapshot = Snapshot::generate(&config.public_view(), runner)?;
    let public_ids = config.public_ids();
    let graph_source = dependencies
        .as_ref()
        .map(|(source, _)| graph::redact(source, &public_ids));
    let description = Description {
        snapshot: &snapshot,
        graph: dependencies.as_ref().map(|(_, graph)| graph),
        graph_source: graph_source.as_deref(),
        public_ids: &public_ids,
    };
    let active: Vec<String> = categorization.active().cloned().collect();
    outcome.updated =
        phase4::update_descriptions(&active, &collected, runner, config.jobs, &description)?;

    info!(
        "Pushed {}, created {}, updated {} pull requests",
        categorization.push.len(),
        outcome.created.len(),
        outcome.updated.len()
    );
    Ok(outcome)
}

/// Categorizes, and sorts out repositories that would push straight to their
/// base branch: with `new_branch` they get a fresh branch, otherwise the run
/// is refused.
fn plan(
    config: &Config,
    collected: &Collected,
    options: &PrOptions,
) -> Result<(Categorization, Vec<String>)> {
    let mut categorization = phase2::execute(config, collected);
    if options.mode == Mode::Update {
        categorization = categorization.updates_only();
    }

    let on_base: Vec<String> = categorization
        .create
        .iter()
        .filter(|id| sits_on_base(collected, id))
        .cloned()
        .collect();
    if on_base.is_empty() {
        return Ok((categorization, Vec::new()));
    }
    if !options.new_branch {
        return Err(Error::Precondition {
            message: format!(
                "{} would push directly to the base branch; commit on a topic branch or pass --new-branch",
                on_base.join(", ")
            ),
        });
    }

    let moving: HashSet<&String> = on_base.iter().collect();
    categorization.push.retain(|id| !moving.contains(id));
    categorization.create.retain(|id| !moving.contains(id));
    Ok((categorization, on_base))
}

fn sits_on_base(collected: &Collected, id: &str) -> bool {
    let branch = collected.status(id).and_then(StatusRecord::branch);
    let base = collected.base(id).map(|b| b.branch.as_str());
    branch.is_some() && branch == base
}

fn publish_branches(
    config: &Config,
    collected: &Collected,
    runner: &dyn CommandRunner,
    ids: &[String],
) -> Result<BTreeMap<String, String>> {
    let stamp = branch::timestamp(Local::now());
    let targets: Vec<&StatusRecord> = ids.iter().filter_map(|id| collected.status(id)).collect();
    info!("Publishing {} new branches", targets.len());
    let batch = TaskRunner::new(config.jobs).run(&targets, |status| {
        let user = Git::new(runner, &status.dir)
            .user_name()
            .unwrap_or_else(|| "user".to_string());
        let name = branch::publish_new_branch(&status.id, &status.dir, runner, &user, &stamp)?;
        Ok((status.id.clone(), name))
    })?;
    Ok(batch.into_result()?.into_iter().collect())
}
