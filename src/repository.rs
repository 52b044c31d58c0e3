//! # Workspace Repository Management
//!
//! Operations that act on every clone in the workspace at once: creating the
//! clones (`mstl init`) and moving all of them to one branch (`mstl switch`).
//!
//! Both run one task per repository under the configured `jobs` limit, try
//! every repository, and report all failures together.

use std::path::Path;

use log::{debug, info};

use crate::config::{Config, Repository};
use crate::error::{Error, Result};
use crate::git::{self, Git};
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;

/// What `init` did with one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAction {
    Cloned,
    /// A clone of the same remote was already there.
    AlreadyCloned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub id: String,
    pub action: InitAction,
}

/// Clones every repository of `config` that is not cloned yet, then checks
/// out its configured revision. Existing clones of another remote are errors.
pub fn init(config: &Config, runner: &dyn CommandRunner) -> Result<Vec<InitReport>> {
    info!("Initializing {} repositories in {}", config.repositories.len(), config.base_dir.display());
    let batch = TaskRunner::new(config.jobs).run(&config.repositories, |repo| {
        let dir = config.repo_dir(&repo.id);
        let action = init_one(repo, &dir, runner).map_err(|e| match e {
            Error::Repository { .. } => e,
            other => Error::for_repo(&repo.id, other),
        })?;
        Ok(InitReport {
            id: repo.id.clone(),
            action,
        })
    })?;
    let mut reports = batch.into_result()?;
    reports.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(reports)
}

fn init_one(repo: &Repository, dir: &Path, runner: &dyn CommandRunner) -> Result<InitAction> {
    if git::is_repository(dir) {
        let actual = Git::new(runner, dir).remote_url()?;
        if !same_remote(&actual, &repo.url) {
            return Err(Error::Repository {
                id: repo.id.clone(),
                message: format!(
                    "{} already holds a clone of {}, expected {}",
                    dir.display(),
                    actual,
                    repo.url
                ),
            });
        }
        debug!("{}: already cloned", repo.id);
        return Ok(InitAction::AlreadyCloned);
    }
    if dir.exists() && dir.read_dir()?.next().is_some() {
        return Err(Error::Repository {
            id: repo.id.clone(),
            message: format!("{} exists and is not a git repository", dir.display()),
        });
    }

    git::clone(runner, &repo.url, dir, repo.branch.as_deref())?;
    if let Some(revision) = &repo.revision {
        Git::new(runner, dir).checkout(revision)?;
    }
    debug!("{}: cloned into {}", repo.id, dir.display());
    Ok(InitAction::Cloned)
}

/// Whether two remote URLs name the same repository, ignoring a trailing
/// slash and `.git` suffix.
pub fn same_remote(a: &str, b: &str) -> bool {
    fn normalize(url: &str) -> &str {
        let url = url.trim().trim_end_matches('/');
        url.strip_suffix(".git").unwrap_or(url)
    }
    normalize(a) == normalize(b)
}

/// Checks out `branch` in every cloned repository. With `create`, the branch
/// is created where it does not exist yet. Returns the ids switched.
pub fn switch(
    config: &Config,
    runner: &dyn CommandRunner,
    branch: &str,
    create: bool,
) -> Result<Vec<String>> {
    let cloned: Vec<&Repository> = config
        .repositories
        .iter()
        .filter(|r| git::is_repository(&config.repo_dir(&r.id)))
        .collect();
    info!("Switching {} repositories to {}", cloned.len(), branch);

    let batch = TaskRunner::new(config.jobs).run(&cloned, |repo| {
        let dir = config.repo_dir(&repo.id);
        let git = Git::new(runner, &dir);
        let exists = git.resolve_local(&format!("refs/heads/{}", branch)).is_some();
        let result = if create && !exists {
            git.checkout_new(branch)
        } else {
            git.checkout(branch)
        };
        result.map_err(|e| Error::for_repo(&repo.id, e))?;
        Ok(repo.id.clone())
    })?;
    let mut ids = batch.into_result()?;
    ids.sort();
    Ok(ids)
}
