//! Thin wrappers around the `git` commands the engine relies on.
//!
//! All calls go through an injected [`CommandRunner`]; nothing here spawns
//! processes directly. Each helper runs exactly one git command and turns its
//! output into a typed answer.

use std::path::Path;

use crate::error::{Error, Result};
use crate::runner::{stderr_of, CommandRunner};

/// The value `git rev-parse --abbrev-ref HEAD` prints on a detached HEAD.
pub const DETACHED_HEAD: &str = "HEAD";

/// Remote every managed clone pushes to and pulls from.
pub const ORIGIN: &str = "origin";

/// Git operations bound to one working directory.
pub struct Git<'a> {
    runner: &'a dyn CommandRunner,
    dir: &'a Path,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dir: &'a Path) -> Self {
        Self { runner, dir }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        self.runner.run(Some(self.dir), "git", args)
    }

    /// Current branch name, or `None` on a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let name = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok((name != DETACHED_HEAD).then_some(name))
    }

    /// Full hash of HEAD.
    pub fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    /// Abbreviated hash of HEAD.
    pub fn head_short(&self) -> Result<String> {
        self.run(&["rev-parse", "--short", "HEAD"])
    }

    /// Resolves a ref locally without touching the network. Missing refs are
    /// `None`.
    pub fn resolve_local(&self, refname: &str) -> Option<String> {
        self.run(&["rev-parse", "--verify", "--quiet", refname])
            .ok()
            .filter(|s| !s.is_empty())
    }

    /// Commit the remote-tracking ref `origin/<branch>` points to, if any.
    pub fn tracking_head(&self, branch: &str) -> Option<String> {
        self.resolve_local(&format!("refs/remotes/{}/{}", ORIGIN, branch))
    }

    /// Default branch of origin as recorded by the clone
    /// (`refs/remotes/origin/HEAD`).
    pub fn default_branch(&self) -> Option<String> {
        let name = self
            .run(&["symbolic-ref", "--short", &format!("refs/remotes/{}/HEAD", ORIGIN)])
            .ok()?;
        name.strip_prefix(&format!("{}/", ORIGIN))
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    }

    /// Asks the remote for the commit of `refs/heads/<branch>`.
    pub fn ls_remote_head(&self, branch: &str) -> Result<Option<String>> {
        let refname = format!("refs/heads/{}", branch);
        let out = self.run(&["ls-remote", ORIGIN, &refname])?;
        Ok(parse_ls_remote(&out, &refname))
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        match self.run(&["merge-base", "--is-ancestor", ancestor, descendant]) {
            Ok(_) => Ok(true),
            // Exit status 1 without output means "not an ancestor".
            Err(e) if stderr_of(&e) == "exit status 1" => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether a commit object exists in the local object database.
    pub fn has_commit(&self, commit: &str) -> bool {
        self.run(&["cat-file", "-e", &format!("{}^{{commit}}", commit)])
            .is_ok()
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.run(&["merge-base", a, b])
    }

    /// Three-way trivial merge of `ours` and `theirs` over `base`, as printed
    /// by `git merge-tree <base> <ours> <theirs>`.
    pub fn merge_tree(&self, base: &str, ours: &str, theirs: &str) -> Result<String> {
        self.run(&["merge-tree", base, ours, theirs])
    }

    /// Remote and merge ref configured as upstream of `branch`.
    pub fn upstream(&self, branch: &str) -> Option<(String, String)> {
        let remote = self
            .run(&["config", "--get", &format!("branch.{}.remote", branch)])
            .ok()?;
        let merge = self
            .run(&["config", "--get", &format!("branch.{}.merge", branch)])
            .ok()?;
        Some((remote, merge))
    }

    pub fn unset_upstream(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "--unset-upstream", branch]).map(|_| ())
    }

    /// URL of `origin` as git sees it.
    pub fn remote_url(&self) -> Result<String> {
        self.run(&["remote", "get-url", ORIGIN])
    }

    pub fn checkout(&self, refname: &str) -> Result<()> {
        self.run(&["checkout", refname]).map(|_| ())
    }

    pub fn checkout_new(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", "-b", branch]).map(|_| ())
    }

    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "-D", branch]).map(|_| ())
    }

    /// Records an empty commit so a fresh branch has something to publish.
    pub fn commit_empty(&self, message: &str) -> Result<()> {
        self.run(&["commit", "--allow-empty", "-m", message]).map(|_| ())
    }

    /// Publishes `branch` to origin and sets it as upstream. Returns git's
    /// progress text.
    pub fn push(&self, branch: &str) -> Result<String> {
        self.run(&["push", "-u", ORIGIN, branch])
    }

    /// The configured `user.name`, if any.
    pub fn user_name(&self) -> Option<String> {
        self.run(&["config", "--get", "user.name"])
            .ok()
            .filter(|s| !s.is_empty())
    }
}

/// Clones `url` into `target`. When `branch` is given, that branch is checked
/// out instead of the remote default.
pub fn clone(
    runner: &dyn CommandRunner,
    url: &str,
    target: &Path,
    branch: Option<&str>,
) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let target_str = target.to_string_lossy();
    let mut args = vec!["clone"];
    if let Some(branch) = branch {
        args.extend(["--branch", branch]);
    }
    args.extend(["--", url, &*target_str]);

    runner.run(None, "git", &args).map(|_| ()).map_err(|e| {
        let stderr = stderr_of(&e);
        if stderr.contains("Authentication failed")
            || stderr.contains("Permission denied")
            || stderr.contains("Could not read from remote repository")
        {
            Error::Repository {
                id: target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                message: format!(
                    "clone of {} failed: authentication failed. Make sure an SSH key or \
                     credential helper grants access to the repository.\n{}",
                    url, stderr
                ),
            }
        } else {
            e
        }
    })
}

/// Whether `dir` holds a git working tree managed by us.
pub fn is_repository(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Extracts the hash for `refname` from `git ls-remote` output
/// (`<hash>\t<ref>` per line).
pub fn parse_ls_remote(output: &str, refname: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (hash, name) = line.split_once('\t')?;
        (name.trim() == refname).then(|| hash.trim().to_string())
    })
}

/// Whether `git merge-tree` output contains a conflict marker.
pub fn merge_tree_has_conflict(output: &str) -> bool {
    output.contains("<<<<<<<")
}
