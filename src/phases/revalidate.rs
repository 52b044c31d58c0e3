//! Phase 3: Re-validation
//!
//! Re-reads HEAD of every affected repository and aborts when one moved
//! since Phase 1, so nothing is pushed or described from stale facts.

use log::info;

use super::categorize::Categorization;
use super::collect::Collected;
use crate::error::{Error, Result};
use crate::git::Git;
use crate::parallel::TaskRunner;
use crate::runner::CommandRunner;
use crate::status::StatusRecord;

/// Execute Phase 3.
pub fn execute(
    categorization: &Categorization,
    collected: &Collected,
    runner: &dyn CommandRunner,
    jobs: usize,
) -> Result<()> {
    let affected: Vec<&StatusRecord> = categorization
        .affected()
        .into_iter()
        .filter_map(|id| collected.status(id))
        .collect();
    info!("Re-validating {} repositories", affected.len());

    let batch = TaskRunner::new(jobs).run(&affected, |status| {
        let actual = Git::new(runner, &status.dir)
            .head()
            .map_err(|e| Error::for_repo(&status.id, e))?;
        if actual != status.local_head {
            return Err(Error::HeadChanged {
                id: status.id.clone(),
                expected: status.local_head_short.clone(),
                actual,
            });
        }
        Ok(())
    })?;
    batch.into_result().map(|_| ())
}
