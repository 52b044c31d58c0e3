//! # Error Handling
//!
//! This module defines the centralized error type for `mistletoe`. It uses
//! `thiserror` to build one `Error` enum covering every failure mode of the
//! change-set engine, with enough context in each variant to tell the user
//! which repository and which step went wrong.
//!
//! The variants follow the error taxonomy of the tool:
//!
//! - **Validation**: `ConfigParse` and `InvalidDependency`, raised before any
//!   repository is touched.
//! - **Precondition**: `Precondition` and `HeadChanged`, raised by the
//!   workflow guards when local state is unsafe to build on.
//! - **Mutation**: `Repository` wraps a failure for one repository, and
//!   `Aggregate` carries every failure of a batch phase at once.
//! - **Collision**: `BranchCollision` is only surfaced after the retry
//!   machine has exhausted its attempts.
//! - **External commands**: `Command` describes a failed `git` or `gh` call.
//!
//! Per-item recoverable failures (a single status query failing) never reach
//! this type; they degrade the affected field instead.

use thiserror::Error;

/// Main error type for mistletoe operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file could not be parsed or failed validation.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An external command (`git` or `gh`) exited unsuccessfully or could not
    /// be spawned.
    #[error("Command failed in {dir}: {program} {args}: {stderr}")]
    Command {
        program: String,
        args: String,
        dir: String,
        stderr: String,
    },

    /// A failure attributed to a single repository.
    #[error("{id}: {message}")]
    Repository { id: String, message: String },

    /// A dependency graph referenced an identifier that is not a known
    /// repository.
    #[error("Invalid dependency: {id} is not a known repository id")]
    InvalidDependency { id: String },

    /// Local state is not safe to mutate (behind, conflicted or detached).
    #[error("Cannot proceed: {message}")]
    Precondition { message: String },

    /// A repository moved between the status pass and the mutation phase.
    #[error("{id}: HEAD changed from {expected} to {actual} during the run; re-run the command")]
    HeadChanged {
        id: String,
        expected: String,
        actual: String,
    },

    /// Publishing a fresh branch kept colliding with existing remote branches.
    #[error("{id}: could not publish a new branch after {attempts} attempts (last tried {branch})")]
    BranchCollision {
        id: String,
        branch: String,
        attempts: usize,
    },

    /// Every failure of one batch phase, reported together.
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<Error>),

    /// A snapshot document could not be produced or read.
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// A metadata block could not be decoded.
    #[error("Metadata block error: {message}")]
    Block { message: String },

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A base64 decoding error, wrapped from `base64::DecodeError`.
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The bounded worker pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Attributes an error to a repository, so the user sees which one failed.
    pub fn for_repo(id: &str, err: impl std::fmt::Display) -> Self {
        Error::Repository {
            id: id.to_string(),
            message: err.to_string(),
        }
    }

    /// Collapses a list of failures: none is `Ok`, one is returned as is,
    /// several become an `Aggregate`.
    pub fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}

fn format_aggregate(errors: &[Error]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} error(s) occurred:\n{}", errors.len(), lines.join("\n"))
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
