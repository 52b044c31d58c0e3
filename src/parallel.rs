//! Bounded concurrent execution over a repository list.
//!
//! Every batch operation (status, snapshot, push, create, update, clone)
//! runs one task per repository on a dedicated rayon pool whose size is the
//! configured `jobs` value, so at most `jobs` external commands are in
//! flight at once. The pool lives only for the duration of one batch.
//!
//! Results and errors are gathered into mutex-protected collectors. Callers
//! decide whether failures are tolerated (collection phases) or aggregated
//! into one combined error (mutation phases).

use std::sync::Mutex;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Output of one batch: successful results in completion order, and every
/// error that occurred.
#[derive(Debug)]
pub struct Batch<R> {
    pub results: Vec<R>,
    pub errors: Vec<Error>,
}

impl<R> Batch<R> {
    /// Fails with all collected errors, or returns the results.
    pub fn into_result(self) -> Result<Vec<R>> {
        Error::collect(self.errors)?;
        Ok(self.results)
    }
}

/// Runs per-item work with a fixed admission limit.
#[derive(Debug, Clone, Copy)]
pub struct TaskRunner {
    jobs: usize,
}

impl TaskRunner {
    pub fn new(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Applies `f` to every item, at most `jobs` at a time.
    pub fn run<T, R, F>(&self, items: &[T], f: F) -> Result<Batch<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("mistletoe-worker-{}", i))
            .build()?;

        let results: Mutex<Vec<R>> = Mutex::new(Vec::with_capacity(items.len()));
        let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());

        pool.install(|| {
            items.par_iter().for_each(|item| match f(item) {
                Ok(value) => results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(value),
                Err(e) => errors.lock().unwrap_or_else(|e| e.into_inner()).push(e),
            });
        });

        Ok(Batch {
            results: results.into_inner().map_err(|_| Error::LockPoisoned {
                context: "batch results".to_string(),
            })?,
            errors: errors.into_inner().map_err(|_| Error::LockPoisoned {
                context: "batch errors".to_string(),
            })?,
        })
    }
}
