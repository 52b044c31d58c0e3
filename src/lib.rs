//! # Mistletoe Library
//!
//! This library provides the core functionality for treating a fleet of git
//! repositories as one change set. It is designed to be used by the `mstl`
//! command-line tool but can also be embedded in other tools that need to
//! inspect or publish changes spanning several repositories.
//!
//! ## Quick Example
//!
//! ```
//! use std::collections::HashSet;
//! use mistletoe::{block, graph};
//!
//! let valid: HashSet<String> = ["app", "lib"].iter().map(|s| s.to_string()).collect();
//! let deps = graph::parse("graph TD\n  app --> lib\n", &valid).unwrap();
//! assert_eq!(deps.dependencies("app"), ["lib".to_string()]);
//! assert_eq!(deps.dependents("lib"), ["app".to_string()]);
//!
//! // A delimiter of length 5 is closed by one of length 8.
//! assert_eq!(block::closing_length(5), 8);
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: The list of repositories, their branches
//!   and base branches, and how many are processed at once.
//! - **Command Runner (`runner`)**: Every `git` and `gh` invocation goes
//!   through the [`runner::CommandRunner`] trait so the engine can be driven
//!   by scripted fakes in tests.
//! - **Status (`status`)**: How each clone relates to its remote branch
//!   (ahead, behind, conflicting).
//! - **Snapshot (`snapshot`)**: A content-addressed record of every
//!   repository's exact commit.
//! - **Metadata Block (`block`)**: The section mistletoe owns inside a pull
//!   request description, with links to the related pull requests, the
//!   snapshot and the dependency graph.
//! - **Dependency Graph (`graph`)**: A mermaid flowchart describing which
//!   repository depends on which.
//! - **Branch Publishing (`branch`)**: Finding a free branch name on the
//!   remote, retrying on collisions.
//! - **Phases (`phases`)**: The pull request workflow.
//!
//! ## Execution Flow
//!
//! The main entry point is [`phases::orchestrator::execute_pr`], which runs:
//!
//! 1.  **Collection**: Status, pull requests and base branches, in parallel.
//! 2.  **Categorization**: Which repositories are pushed, get a pull request,
//!     or get their description refreshed.
//! 3.  **Re-validation**: Abort when a HEAD moved in the meantime.
//! 4.  **Publishing**: Push, create, and rewrite every description.

pub mod block;
pub mod branch;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod graph;
pub mod output;
pub mod parallel;
pub mod phases;
pub mod repository;
pub mod runner;
pub mod snapshot;
pub mod status;
