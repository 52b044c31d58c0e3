//! Phase 2: Categorization
//!
//! Turns the facts of Phase 1 into action sets:
//!
//! | open PR | ahead | action                                                 |
//! |---------|-------|--------------------------------------------------------|
//! | yes     | yes   | push + update                                          |
//! | yes     | no    | update                                                 |
//! | no      | yes   | push + create, unless HEAD is the remote base tip      |
//! | no      | no    | create, unless the current branch is the base branch   |
//!
//! Repositories without a status record, or without a base branch to open
//! a pull request against, are skipped. `create` and `update` never overlap;
//! together they are the "active" repositories whose descriptions carry the
//! metadata block.
//!
//! Before anything is mutated, [`check_preconditions`] rejects the run when
//! any cloned repository is behind its remote, would conflict, or has no
//! branch checked out. Skipped repositories count too: their state still ends
//! up in the snapshot every description carries.

use log::debug;
use serde::Serialize;

use super::collect::Collected;
use crate::config::Config;
use crate::error::{Error, Result};

/// Action sets, each in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Categorization {
    pub push: Vec<String>,
    pub create: Vec<String>,
    pub update: Vec<String>,
    pub skipped: Vec<String>,
}

impl Categorization {
    /// Repositories that get a pull request description (create or update).
    pub fn active(&self) -> impl Iterator<Item = &String> {
        self.create.iter().chain(self.update.iter())
    }

    /// Every repository with at least one action.
    pub fn affected(&self) -> Vec<&String> {
        let mut ids: Vec<&String> = self.push.iter().chain(self.active()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.create.is_empty() && self.update.is_empty()
    }

    /// Restricts the plan to existing pull requests: nothing is created, and
    /// only pull request branches are pushed.
    pub fn updates_only(mut self) -> Self {
        let update = &self.update;
        self.push.retain(|id| update.contains(id));
        self.skipped.append(&mut self.create);
        self
    }
}

/// Execute Phase 2 (without the precondition check).
pub fn execute(config: &Config, collected: &Collected) -> Categorization {
    let mut result = Categorization::default();

    for repo in &config.repositories {
        let id = repo.id.clone();
        let Some(status) = collected.status(&repo.id) else {
            debug!("{}: not cloned, skipping", repo.id);
            result.skipped.push(id);
            continue;
        };
        let has_open_pr = collected.lookup(&repo.id).open().is_some();
        let base = collected.base(&repo.id);

        match (has_open_pr, status.ahead) {
            (true, true) => {
                result.push.push(id.clone());
                result.update.push(id);
            }
            (true, false) => result.update.push(id),
            (false, ahead) => {
                let Some(base) = base else {
                    debug!("{}: no base branch known, skipping", repo.id);
                    result.skipped.push(id);
                    continue;
                };
                if ahead {
                    if base.tip.as_deref() == Some(status.local_head.as_str()) {
                        debug!("{}: HEAD is the tip of {}, skipping", repo.id, base.branch);
                        result.skipped.push(id);
                    } else {
                        result.push.push(id.clone());
                        result.create.push(id);
                    }
                } else if status.branch() == Some(base.branch.as_str()) {
                    debug!("{}: on base branch {}, skipping", repo.id, base.branch);
                    result.skipped.push(id);
                } else {
                    result.create.push(id);
                }
            }
        }
    }
    result
}

/// Refuses to continue when any repository is behind, conflicted or
/// detached. Every offender is listed.
pub fn check_preconditions(collected: &Collected) -> Result<()> {
    let mut problems = Vec::new();
    for status in &collected.statuses {
        let id = &status.id;
        if status.is_detached() {
            problems.push(format!("{}: HEAD is detached", id));
        }
        if status.conflict {
            problems.push(format!("{}: local and remote changes conflict", id));
        } else if status.behind {
            problems.push(format!("{}: behind the remote branch, pull first", id));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Precondition {
            message: format!("\n  {}", problems.join("\n  ")),
        })
    }
}
