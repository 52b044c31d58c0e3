//! Pull request lookups and mutations through the GitHub CLI (`gh`).
//!
//! The outcome of a lookup is a closed [`PrLookup`] variant rather than a
//! sentinel string, so callers match on "not checked", "not found", "found"
//! and "failed" explicitly.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parallel::TaskRunner;
use crate::runner::{stderr_of, CommandRunner};
use crate::status::StatusRecord;

const PR_FIELDS: &str = "number,state,isDraft,url,baseRefName,headRefOid,author,body";

/// Repository permissions that allow editing any pull request.
const WRITE_PERMISSIONS: [&str; 3] = ["ADMIN", "MAINTAIN", "WRITE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

/// A pull request as reported by `gh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub state: PrState,
    pub is_draft: bool,
    pub url: String,
    pub base_ref: String,
    pub head_oid: String,
    pub author: String,
    /// Whether the current user may edit the description.
    pub can_edit: bool,
    pub body: String,
}

impl PullRequestRecord {
    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }
}

/// Result of asking GitHub about a repository's pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrLookup {
    /// Nobody asked yet.
    #[default]
    NotChecked,
    /// The branch has no pull requests.
    NotFound,
    /// Pull requests whose head is the branch, newest first.
    Found(Vec<PullRequestRecord>),
    /// The lookup itself failed.
    Failed(String),
}

impl PrLookup {
    /// The open pull request, if there is one.
    pub fn open(&self) -> Option<&PullRequestRecord> {
        match self {
            PrLookup::Found(prs) => prs.iter().find(|pr| pr.is_open()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    state: PrState,
    #[serde(default)]
    is_draft: bool,
    url: String,
    #[serde(default)]
    base_ref_name: String,
    #[serde(default)]
    head_ref_oid: String,
    #[serde(default)]
    author: Option<GhAuthor>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct GhAuthor {
    login: String,
}

/// Parameters of a new pull request.
#[derive(Debug, Clone)]
pub struct CreateRequest<'a> {
    pub base: &'a str,
    pub head: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub draft: bool,
}

/// GitHub CLI operations.
pub struct GitHub<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> GitHub<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn gh(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        self.runner.run(dir, "gh", args)
    }

    /// Login of the authenticated user.
    pub fn viewer_login(&self) -> Result<String> {
        self.gh(None, &["api", "user", "--jq", ".login"])
    }

    /// The user's permission on the repository cloned at `dir`
    /// (`ADMIN`, `WRITE`, `READ`, ...).
    pub fn viewer_permission(&self, dir: &Path) -> Result<String> {
        self.gh(
            Some(dir),
            &["repo", "view", "--json", "viewerPermission", "--jq", ".viewerPermission"],
        )
    }

    /// Pull requests whose head is `branch`, in any state.
    pub fn lookup(&self, dir: &Path, branch: &str, viewer: Option<&str>) -> PrLookup {
        let output = match self.gh(
            Some(dir),
            &["pr", "list", "--head", branch, "--state", "all", "--json", PR_FIELDS],
        ) {
            Ok(output) => output,
            Err(e) => return PrLookup::Failed(e.to_string()),
        };
        let raw: Vec<GhPullRequest> = match serde_json::from_str(&output) {
            Ok(raw) => raw,
            Err(e) => return PrLookup::Failed(format!("unexpected gh output: {}", e)),
        };
        if raw.is_empty() {
            return PrLookup::NotFound;
        }

        let can_write = match self.viewer_permission(dir) {
            Ok(permission) => WRITE_PERMISSIONS.contains(&permission.as_str()),
            Err(e) => {
                debug!("could not read repository permission in {}: {}", dir.display(), e);
                false
            }
        };
        PrLookup::Found(raw.into_iter().map(|pr| to_record(pr, viewer, can_write)).collect())
    }

    /// Opens a pull request and returns its URL. When GitHub reports that
    /// one already exists for the branch, the existing one is reused.
    pub fn create(&self, dir: &Path, request: &CreateRequest<'_>) -> Result<String> {
        let mut args = vec![
            "pr", "create", "--base", request.base, "--head", request.head, "--title",
            request.title, "--body", request.body,
        ];
        if request.draft {
            args.push("--draft");
        }
        match self.gh(Some(dir), &args) {
            Ok(output) => Ok(output.lines().last().unwrap_or_default().trim().to_string()),
            Err(e) if stderr_of(&e).contains("already exists") => {
                warn!(
                    "a pull request for {} already exists in {}, reusing it",
                    request.head,
                    dir.display()
                );
                let existing = stderr_of(&e)
                    .split_whitespace()
                    .find(|w| w.starts_with("https://"))
                    .map(str::to_string)
                    .or_else(|| {
                        self.lookup(dir, request.head, None)
                            .open()
                            .map(|pr| pr.url.clone())
                    });
                existing.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Replaces the description of pull request `number`.
    pub fn edit_body(&self, dir: &Path, number: u64, body: &str) -> Result<()> {
        let number = number.to_string();
        self.gh(Some(dir), &["pr", "edit", &number, "--body", body])
            .map(|_| ())
    }
}

fn to_record(pr: GhPullRequest, viewer: Option<&str>, can_write: bool) -> PullRequestRecord {
    let author = pr.author.map(|a| a.login).unwrap_or_default();
    let is_author = viewer.is_some_and(|v| v == author);
    PullRequestRecord {
        number: pr.number,
        state: pr.state,
        is_draft: pr.is_draft,
        url: pr.url,
        base_ref: pr.base_ref_name,
        head_oid: pr.head_ref_oid,
        can_edit: can_write || is_author,
        author,
        body: pr.body,
    }
}

/// Looks up pull requests for every repository that has a branch checked
/// out. Failures are reported per repository as `PrLookup::Failed`.
pub fn lookup_all(
    statuses: &[StatusRecord],
    runner: &dyn CommandRunner,
    jobs: usize,
) -> Result<BTreeMap<String, PrLookup>> {
    let github = GitHub::new(runner);
    let viewer = match github.viewer_login() {
        Ok(login) => Some(login),
        Err(e) => {
            warn!("could not determine the GitHub user: {}", e);
            None
        }
    };

    let batch = TaskRunner::new(jobs).run(statuses, |status| {
        let lookup = match status.branch() {
            Some(branch) => github.lookup(&status.dir, branch, viewer.as_deref()),
            None => PrLookup::NotChecked,
        };
        if let PrLookup::Failed(reason) = &lookup {
            warn!("{}: pull request lookup failed: {}", status.id, reason);
        }
        Ok((status.id.clone(), lookup))
    })?;
    Ok(batch.results.into_iter().collect())
}
