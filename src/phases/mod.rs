//! Implementation of the 4 phases of the pull request workflow.
//!
//! ## Overview
//!
//! `mstl pr create` and `mstl pr update` follow 4 phases:
//! 1. Collection - status, pull request lookups and base branch tips of every
//!    repository, in parallel
//! 2. Categorization - decide which repositories are pushed, get a new pull
//!    request, or get their description updated; refuse to continue when an
//!    affected repository is behind, conflicted or detached
//! 3. Re-validation - make sure no HEAD moved since Phase 1
//! 4. Publishing - push, create pull requests, then rewrite every description
//!    with a fresh metadata block
//!
//! Phases 1 to 3 never change anything, so a failure there leaves every
//! repository untouched. Phase 4 attempts every repository and reports all
//! failures together.

pub mod categorize;
pub mod collect;
pub mod orchestrator;
pub mod publish;
pub mod revalidate;

pub use categorize as phase2;
pub use collect as phase1;
pub use publish as phase4;
pub use revalidate as phase3;

/// Where a repository's pull request would be merged into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTarget {
    pub branch: String,
    /// Commit the base branch points to on the remote, when known.
    pub tip: Option<String>,
}
