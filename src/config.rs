//! # Configuration Schema and Parsing
//!
//! This module defines the repository set that every command operates on,
//! and the logic for reading it from a `mistletoe.yaml` file.
//!
//! ## Key Components
//!
//! - **`Repository`**: One managed repository: its identifier, clone URL,
//!   target branch, pull request base branch, pinned revision and privacy flag.
//! - **`Config`**: The ordered repository list together with the concurrency
//!   budget (`jobs`) and the directory that holds the clones (`base_dir`).
//!
//! ## File Format
//!
//! ```yaml
//! jobs: 4
//! repositories:
//!   - url: https://github.com/org/app.git
//!     branch: feature/x
//!     base-branch: main
//!   - id: lib
//!     url: git@github.com:org/library.git
//!     revision: 0123abcd
//!     private: true
//! ```
//!
//! Identifiers are derived from the last URL path segment when omitted.
//! JSON is accepted as well, since it is a subset of YAML.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "mistletoe.yaml";

/// Upper bound for the `jobs` setting.
pub const MAX_JOBS: usize = 128;

/// A single managed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Repository {
    /// Unique slug; the clone lives at `<base_dir>/<id>`.
    #[serde(default)]
    pub id: String,
    /// Clone URL.
    pub url: String,
    /// Branch to check out and to publish pull requests from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Branch pull requests are opened against. Falls back to `branch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    /// Pinned revision, used when no branch is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Private repositories are left out of anything redistributed, such as
    /// published dependency graphs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
}

impl Repository {
    /// Creates a repository entry with the identifier derived from the URL.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: derive_id(&url),
            url,
            branch: None,
            base_branch: None,
            revision: None,
            private: false,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_base_branch(mut self, base: impl Into<String>) -> Self {
        self.base_branch = Some(base.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// The branch pull requests target: `base-branch`, else `branch`.
    pub fn effective_base_branch(&self) -> Option<&str> {
        self.base_branch
            .as_deref()
            .or(self.branch.as_deref())
            .filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(default)]
    repositories: Vec<Repository>,
}

/// A validated repository set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of repositories processed at once.
    pub jobs: usize,
    /// Directory holding one clone per repository.
    pub base_dir: PathBuf,
    /// Repositories in file order.
    pub repositories: Vec<Repository>,
}

impl Config {
    /// Builds a configuration from already constructed entries, deriving
    /// missing identifiers and validating the result.
    pub fn new(repositories: Vec<Repository>, jobs: usize, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self {
            jobs,
            base_dir: base_dir.into(),
            repositories,
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Path of the clone of `id`.
    pub fn repo_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    /// All identifiers.
    pub fn ids(&self) -> HashSet<String> {
        self.repositories.iter().map(|r| r.id.clone()).collect()
    }

    /// Identifiers of the repositories that are not private.
    pub fn public_ids(&self) -> HashSet<String> {
        self.repositories
            .iter()
            .filter(|r| !r.private)
            .map(|r| r.id.clone())
            .collect()
    }

    /// A copy without private repositories, for redistribution.
    pub fn public_view(&self) -> Config {
        Config {
            jobs: self.jobs,
            base_dir: self.base_dir.clone(),
            repositories: self
                .repositories
                .iter()
                .filter(|r| !r.private)
                .cloned()
                .collect(),
        }
    }

    fn normalize(&mut self) {
        for repo in &mut self.repositories {
            repo.url = repo.url.trim().to_string();
            if repo.id.trim().is_empty() {
                repo.id = derive_id(&repo.url);
            }
            for field in [&mut repo.branch, &mut repo.base_branch, &mut repo.revision] {
                if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                    *field = None;
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.jobs == 0 || self.jobs > MAX_JOBS {
            return Err(Error::ConfigParse {
                message: format!("jobs must be between 1 and {}, got {}", MAX_JOBS, self.jobs),
                hint: None,
            });
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repositories.iter().enumerate() {
            if repo.url.is_empty() {
                return Err(Error::ConfigParse {
                    message: format!("Repository #{} has an empty url", index + 1),
                    hint: Some("Add 'url:' to the repository entry".to_string()),
                });
            }
            if !is_valid_id(&repo.id) {
                return Err(Error::ConfigParse {
                    message: format!("Invalid repository id '{}'", repo.id),
                    hint: Some(
                        "Ids may not be empty or contain '/', whitespace or '..'".to_string(),
                    ),
                });
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(Error::ConfigParse {
                    message: format!("Duplicate repository id: {}", repo.id),
                    hint: Some("Set an explicit 'id:' on one of the entries".to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Parses a configuration document. Repositories are cloned under `base_dir`.
pub fn parse(content: &str, base_dir: &Path) -> Result<Config> {
    let file: ConfigFile = serde_yaml::from_str(content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: None,
    })?;
    Config::new(file.repositories, file.jobs.unwrap_or(1), base_dir)
}

/// Reads and parses a configuration file. Clones live next to the file.
pub fn from_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigParse {
        message: format!("Failed to read {}: {}", path.display(), e),
        hint: None,
    })?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parse(&content, &base_dir)
}

/// Derives an identifier from the last path segment of a clone URL, with any
/// `.git` extension removed. Handles both URL and scp-like (`host:path`)
/// forms.
pub fn derive_id(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.contains('/')
        && !id.contains('\\')
        && !id.chars().any(char::is_whitespace)
}
