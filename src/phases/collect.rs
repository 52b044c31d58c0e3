//! Phase 1: Collection
//!
//! Gathers everything the later phases decide on: a status record per cloned
//! repository, the pull requests of each current branch, and the base branch
//! each pull request targets.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};

use super::BaseTarget;
use crate::config::{Config, Repository};
use crate::error::Result;
use crate::git::Git;
use crate::github::{self, PrLookup};
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;
use crate::status::{self, StatusOptions, StatusRecord};

static NOT_CHECKED: PrLookup = PrLookup::NotChecked;

/// Facts about every repository, as seen at the start of the run.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub statuses: Vec<StatusRecord>,
    pub lookups: BTreeMap<String, PrLookup>,
    pub bases: BTreeMap<String, BaseTarget>,
}

impl Collected {
    pub fn status(&self, id: &str) -> Option<&StatusRecord> {
        self.statuses.iter().find(|s| s.id == id)
    }

    /// The lookup for `id`; repositories never looked up are `NotChecked`.
    pub fn lookup(&self, id: &str) -> &PrLookup {
        self.lookups.get(id).unwrap_or(&NOT_CHECKED)
    }

    pub fn base(&self, id: &str) -> Option<&BaseTarget> {
        self.bases.get(id)
    }
}

/// Execute Phase 1.
pub fn execute(
    config: &Config,
    runner: &dyn CommandRunner,
    options: StatusOptions,
) -> Result<Collected> {
    info!("Collecting status of {} repositories", config.repositories.len());
    let statuses = status::collect(config, runner, options);
    let lookups = github::lookup_all(&statuses, runner, config.jobs)?;

    let cloned: Vec<&Repository> = config
        .repositories
        .iter()
        .filter(|r| statuses.iter().any(|s| s.id == r.id))
        .collect();
    let batch = TaskRunner::new(config.jobs).run(&cloned, |repo| {
        let dir = config.repo_dir(&repo.id);
        Ok(resolve_base(repo, &dir, runner, options).map(|base| (repo.id.clone(), base)))
    })?;
    let bases = batch.results.into_iter().flatten().collect();

    Ok(Collected {
        statuses,
        lookups,
        bases,
    })
}

/// Base branch of `repo`: the configured one, else origin's default branch.
/// The tip comes from the remote-tracking ref, or from the remote itself when
/// that is allowed.
pub fn resolve_base(
    repo: &Repository,
    dir: &Path,
    runner: &dyn CommandRunner,
    options: StatusOptions,
) -> Option<BaseTarget> {
    let git = Git::new(runner, dir);
    let branch = repo
        .effective_base_branch()
        .map(str::to_string)
        .or_else(|| git.default_branch())?;

    let tip = git.tracking_head(&branch).or_else(|| {
        if options.no_fetch {
            return None;
        }
        git.ls_remote_head(&branch).ok().flatten()
    });
    debug!("{}: base branch {} at {:?}", repo.id, branch, tip);
    Some(BaseTarget { branch, tip })
}
