//! # Status Engine
//!
//! Computes, for every cloned repository, where its current branch stands
//! relative to the remote: ahead (unpushed commits, or no remote branch at
//! all), behind (pullable commits), and, when both hold, whether merging
//! would conflict.
//!
//! ## Process
//!
//! For each repository, bounded by the configured `jobs`:
//!
//! 1.  Repositories without a clone are skipped silently; they have simply
//!     not been initialized yet.
//! 2.  The current branch and HEAD are read. `HEAD` as branch name means a
//!     detached HEAD.
//! 3.  A stale upstream (the tracked remote branch was renamed or deleted) is
//!     cleared, with a warning.
//! 4.  The remote head comes from the local remote-tracking ref; only when
//!     that is missing, and fetching is allowed, is the remote asked.
//! 5.  Reachability in both directions gives ahead/behind. Diverged branches
//!     get a three-way `merge-tree` to detect conflicts.
//!
//! A failing query degrades the affected field instead of failing the pass:
//! unknown hashes are empty and unknown flags are `false`. The engine never
//! returns an error, and the records come back sorted by identifier.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::config::Config;
use crate::git::{self, Git};
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;

/// What HEAD points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "name")]
pub enum HeadRef {
    Branch(String),
    Detached,
    /// The branch could not be read.
    Unknown,
}

impl fmt::Display for HeadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadRef::Branch(name) => f.write_str(name),
            HeadRef::Detached => f.write_str("(detached)"),
            HeadRef::Unknown => f.write_str("(unknown)"),
        }
    }
}

/// Facts about one repository, computed fresh on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub id: String,
    pub head_ref: HeadRef,
    /// Full hash of HEAD; empty when unknown.
    pub local_head: String,
    /// Abbreviated hash of HEAD; empty when unknown.
    pub local_head_short: String,
    /// Commit of the remote counterpart of the current branch.
    pub remote_head: Option<String>,
    /// Local commits missing on the remote (or no remote branch at all).
    pub ahead: bool,
    /// Remote commits missing locally.
    pub behind: bool,
    /// Ahead and behind, and merging would conflict.
    pub conflict: bool,
    pub dir: PathBuf,
}

impl StatusRecord {
    pub fn branch(&self) -> Option<&str> {
        match &self.head_ref {
            HeadRef::Branch(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.head_ref == HeadRef::Detached
    }
}

/// Knobs for a status pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOptions {
    /// Never contact the remote; rely on remote-tracking refs only.
    pub no_fetch: bool,
}

/// Computes the status of every cloned repository in `config`.
pub fn collect(
    config: &Config,
    runner: &dyn CommandRunner,
    options: StatusOptions,
) -> Vec<StatusRecord> {
    let tasks = TaskRunner::new(config.jobs);
    let mut records: Vec<StatusRecord> = match tasks.run(&config.repositories, |repo| {
        Ok(status_of(&repo.id, &config.repo_dir(&repo.id), runner, options))
    }) {
        Ok(batch) => batch.results.into_iter().flatten().collect(),
        Err(e) => {
            warn!("Could not start worker pool ({}), checking repositories one by one", e);
            config
                .repositories
                .iter()
                .filter_map(|repo| status_of(&repo.id, &config.repo_dir(&repo.id), runner, options))
                .collect()
        }
    };
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}

/// Computes the status of one repository, or `None` when it has not been
/// cloned yet.
pub fn status_of(
    id: &str,
    dir: &Path,
    runner: &dyn CommandRunner,
    options: StatusOptions,
) -> Option<StatusRecord> {
    if !git::is_repository(dir) {
        debug!("{}: no clone at {}, skipping", id, dir.display());
        return None;
    }
    let git = Git::new(runner, dir);

    let head_ref = match git.current_branch() {
        Ok(Some(name)) => HeadRef::Branch(name),
        Ok(None) => HeadRef::Detached,
        Err(e) => {
            warn!("{}: could not read current branch: {}", id, e);
            HeadRef::Unknown
        }
    };
    let local_head = degrade(id, "HEAD", git.head());
    let local_head_short = degrade(id, "short HEAD", git.head_short());

    let remote_head = match &head_ref {
        HeadRef::Branch(branch) => {
            repair_stale_upstream(&git, id, branch, options);
            resolve_remote_head(&git, id, branch, options)
        }
        _ => None,
    };

    let (ahead, behind, conflict) = compare(&git, id, &local_head, remote_head.as_deref());

    Some(StatusRecord {
        id: id.to_string(),
        head_ref,
        local_head,
        local_head_short,
        remote_head,
        ahead,
        behind,
        conflict,
        dir: dir.to_path_buf(),
    })
}

fn degrade(id: &str, what: &str, value: crate::error::Result<String>) -> String {
    value.unwrap_or_else(|e| {
        warn!("{}: could not read {}: {}", id, what, e);
        String::new()
    })
}

fn resolve_remote_head(
    git: &Git<'_>,
    id: &str,
    branch: &str,
    options: StatusOptions,
) -> Option<String> {
    if let Some(hash) = git.tracking_head(branch) {
        return Some(hash);
    }
    if options.no_fetch {
        return None;
    }
    match git.ls_remote_head(branch) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("{}: could not query remote branch {}: {}", id, branch, e);
            None
        }
    }
}

/// Returns `(ahead, behind, conflict)`.
fn compare(git: &Git<'_>, id: &str, local: &str, remote: Option<&str>) -> (bool, bool, bool) {
    if local.is_empty() {
        return (false, false, false);
    }
    let Some(remote) = remote else {
        // Nothing on the remote yet: everything is unpushed.
        return (true, false, false);
    };
    if local == remote {
        return (false, false, false);
    }

    if !git.has_commit(remote) {
        // Known only through ls-remote, so the local branch cannot contain it.
        debug!("{}: remote head {} is not available locally", id, remote);
        return (false, true, false);
    }

    let ahead = match git.is_ancestor(local, remote) {
        Ok(reachable) => !reachable,
        Err(e) => {
            warn!("{}: could not compare HEAD with remote: {}", id, e);
            false
        }
    };
    let behind = match git.is_ancestor(remote, local) {
        Ok(reachable) => !reachable,
        Err(e) => {
            warn!("{}: could not compare remote with HEAD: {}", id, e);
            false
        }
    };

    let conflict = ahead && behind && has_merge_conflict(git, id, local, remote);
    (ahead, behind, conflict)
}

fn has_merge_conflict(git: &Git<'_>, id: &str, local: &str, remote: &str) -> bool {
    let result = git
        .merge_base(local, remote)
        .and_then(|base| git.merge_tree(&base, local, remote));
    match result {
        Ok(output) => git::merge_tree_has_conflict(&output),
        Err(e) => {
            warn!("{}: could not check for merge conflicts: {}", id, e);
            false
        }
    }
}

/// Clears the upstream of `branch` when the remote branch it tracks is gone.
///
/// Only acts when the remote confirms the branch no longer exists, so it is
/// skipped in no-fetch mode.
fn repair_stale_upstream(git: &Git<'_>, id: &str, branch: &str, options: StatusOptions) {
    let Some((remote, merge)) = git.upstream(branch) else {
        return;
    };
    if remote == "." || options.no_fetch {
        return;
    }
    let Some(upstream_branch) = merge.strip_prefix("refs/heads/") else {
        return;
    };
    let tracking = format!("refs/remotes/{}/{}", remote, upstream_branch);
    if git.resolve_local(&tracking).is_some() {
        return;
    }
    if remote != git::ORIGIN {
        return;
    }
    match git.ls_remote_head(upstream_branch) {
        Ok(None) => match git.unset_upstream(branch) {
            Ok(()) => warn!(
                "{}: branch '{}' tracked '{}/{}', which no longer exists (renamed or deleted); \
                 cleared its upstream so the next push publishes it again",
                id, branch, remote, upstream_branch
            ),
            Err(e) => warn!("{}: could not clear stale upstream of '{}': {}", id, branch, e),
        },
        Ok(Some(_)) => {}
        Err(e) => debug!("{}: could not verify upstream of '{}': {}", id, branch, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::ScriptedRunner;

    fn fake_clone(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        dir
    }

    fn base_runner(id: &str, branch: &str, head: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .ok(&format!("{id} git rev-parse --abbrev-ref HEAD"), branch)
            .ok(&format!("{id} git rev-parse HEAD"), head)
            .ok(&format!("{id} git rev-parse --short HEAD"), &head[..3])
    }

    #[test]
    fn test_missing_clone_is_excluded() {
        let root = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        assert!(status_of("app", &root.path().join("app"), &runner, StatusOptions::default()).is_none());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_in_sync_with_tracking_ref() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "main", "abc123")
            .ok("app git rev-parse --verify --quiet refs/remotes/origin/main", "abc123");

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert_eq!(record.head_ref, HeadRef::Branch("main".to_string()));
        assert_eq!(record.local_head_short, "abc");
        assert_eq!(record.remote_head.as_deref(), Some("abc123"));
        assert!(!record.ahead && !record.behind && !record.conflict);
        assert!(runner.calls_matching("app git ls-remote").is_empty());
    }

    #[test]
    fn test_no_remote_branch_is_ahead() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "topic", "abc123")
            .ok("app git ls-remote origin refs/heads/topic", "");

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert!(record.ahead);
        assert!(!record.behind);
        assert_eq!(record.remote_head, None);
    }

    #[test]
    fn test_no_fetch_skips_network() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "topic", "abc123");

        let record = status_of("app", &dir, &runner, StatusOptions { no_fetch: true }).unwrap();
        assert!(record.ahead);
        assert!(runner.calls_matching("app git ls-remote").is_empty());
    }

    #[test]
    fn test_remote_only_commit_unknown_locally_is_behind() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "main", "abc123")
            .ok("app git ls-remote origin refs/heads/main", "fff999\trefs/heads/main");

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert!(record.behind);
        assert!(!record.ahead);
    }

    #[test]
    fn test_diverged_with_conflict() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "main", "aaa111")
            .ok("app git rev-parse --verify --quiet refs/remotes/origin/main", "bbb222")
            .ok("app git cat-file -e bbb222^{commit}", "")
            .fail("app git merge-base --is-ancestor aaa111 bbb222", "exit status 1")
            .fail("app git merge-base --is-ancestor bbb222 aaa111", "exit status 1")
            .ok("app git merge-base aaa111 bbb222", "base000")
            .ok(
                "app git merge-tree base000 aaa111 bbb222",
                "changed in both\n+<<<<<<< .our\n+a\n+=======\n+b\n+>>>>>>> .their",
            );

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert!(record.ahead && record.behind && record.conflict);
    }

    #[test]
    fn test_detached_head_has_no_remote() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "HEAD", "abc123");

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert!(record.is_detached());
        assert_eq!(record.branch(), None);
        // A detached HEAD has no remote counterpart, so it counts as unpushed.
        assert!(record.ahead);
    }

    #[test]
    fn test_failed_queries_degrade() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = ScriptedRunner::new();

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert_eq!(record.head_ref, HeadRef::Unknown);
        assert!(record.local_head.is_empty());
        assert!(!record.ahead && !record.behind && !record.conflict);
    }

    #[test]
    fn test_stale_upstream_is_cleared() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = fake_clone(root.path(), "app");
        let runner = base_runner("app", "topic", "abc123")
            .ok("app git config --get branch.topic.remote", "origin")
            .ok("app git config --get branch.topic.merge", "refs/heads/old-topic")
            .ok("app git ls-remote origin refs/heads/old-topic", "")
            .ok("app git branch --unset-upstream topic", "")
            .ok("app git ls-remote origin refs/heads/topic", "");

        let record = status_of("app", &dir, &runner, StatusOptions::default()).unwrap();
        assert!(record.ahead);
        assert_eq!(runner.calls_matching("app git branch --unset-upstream").len(), 1);
    }

    #[test]
    fn test_collect_sorts_by_id() {
        let root = tempfile::TempDir::new().unwrap();
        fake_clone(root.path(), "zeta");
        fake_clone(root.path(), "alpha");
        let config = Config::new(
            vec![
                crate::config::Repository::new("https://e.com/zeta.git"),
                crate::config::Repository::new("https://e.com/missing.git"),
                crate::config::Repository::new("https://e.com/alpha.git"),
            ],
            2,
            root.path(),
        )
        .unwrap();
        let runner = ScriptedRunner::new();

        let records = collect(&config, &runner, StatusOptions { no_fetch: true });
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
