//! # Snapshots
//!
//! A snapshot records the exact ref of every cloned repository at one point
//! in time, so the same combination of commits can be reproduced later.
//!
//! The document only keeps what identifies each repository's state (URL,
//! branch, revision, base branch); operational settings such as `jobs` are
//! left out.
//!
//! Snapshots are content addressed: [`snapshot_identifier`] hashes the
//! identifier-sorted list of "branch if set, else revision" values, so the
//! order of the repositories never changes the identifier. Artifacts are
//! written as `mistletoe-snapshot-<identifier>.json`.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::{self, Git};
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;

/// File name prefix of snapshot artifacts.
pub const SNAPSHOT_FILE_PREFIX: &str = "mistletoe-snapshot-";

/// The recorded state of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotRepository {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_branch: String,
}

impl SnapshotRepository {
    /// The ref that identifies this repository's state: the branch when one
    /// is checked out, the revision otherwise.
    pub fn identity_ref(&self) -> &str {
        if self.branch.is_empty() {
            &self.revision
        } else {
            &self.branch
        }
    }
}

/// A captured repository set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub repositories: Vec<SnapshotRepository>,
}

impl Snapshot {
    /// Reads the current state of every cloned repository in `config`.
    /// Repositories that are not cloned are left out.
    pub fn generate(config: &Config, runner: &dyn CommandRunner) -> Result<Self> {
        let batch = TaskRunner::new(config.jobs).run(&config.repositories, |repo| {
            let dir = config.repo_dir(&repo.id);
            if !git::is_repository(&dir) {
                return Ok(None);
            }
            let git = Git::new(runner, &dir);

            let url = git.remote_url().unwrap_or_else(|e| {
                warn!("{}: could not read remote url ({}), using configured url", repo.id, e);
                repo.url.clone()
            });
            let branch = match git.current_branch() {
                Ok(Some(branch)) => branch,
                Ok(None) => String::new(),
                Err(e) => {
                    warn!("{}: could not read current branch: {}", repo.id, e);
                    String::new()
                }
            };
            let revision = git.head().map_err(|e| Error::for_repo(&repo.id, e))?;
            let base_branch = repo
                .effective_base_branch()
                .map(str::to_string)
                .unwrap_or_else(|| branch.clone());

            Ok(Some(SnapshotRepository {
                id: repo.id.clone(),
                url,
                branch,
                revision,
                base_branch,
            }))
        })?;

        let mut repositories: Vec<SnapshotRepository> =
            batch.into_result()?.into_iter().flatten().collect();
        repositories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { repositories })
    }

    /// Content address of this snapshot.
    pub fn identifier(&self) -> String {
        snapshot_identifier(&self.repositories)
    }

    /// Canonical artifact file name.
    pub fn file_name(&self) -> String {
        format!("{}{}.json", SNAPSHOT_FILE_PREFIX, self.identifier())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Snapshot {
            message: format!("invalid snapshot document: {}", e),
        })
    }

    /// Writes the snapshot into `dir` and returns the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_json()? + "\n")?;
        Ok(path)
    }
}

/// SHA-256 over the identifier-sorted, comma-joined identity refs, as
/// lowercase hex.
pub fn snapshot_identifier(repositories: &[SnapshotRepository]) -> String {
    let mut sorted: Vec<&SnapshotRepository> = repositories.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let joined = sorted
        .iter()
        .map(|r| r.identity_ref())
        .collect::<Vec<_>>()
        .join(",");
    hex::encode(Sha256::digest(joined.as_bytes()))
}
