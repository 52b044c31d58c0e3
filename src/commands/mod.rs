//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `mstl`
//! command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the shared
//!   [`Context`] and calls into the `mistletoe` library.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use mistletoe::config::{self, Config, MAX_JOBS};
use mistletoe::output::OutputConfig;
use mistletoe::runner::ProcessRunner;

pub mod init;
pub mod pr;
pub mod snapshot;
pub mod status;
pub mod switch;

/// Global options shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub base_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub verbose: bool,
    pub output: OutputConfig,
}

impl Context {
    /// Loads the configuration and applies the command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Err(config_not_found(&self.config_path));
        }
        let loaded = config::from_file(&self.config_path)
            .with_context(|| format!("Failed to load config from {}", self.config_path.display()))?;

        if self.jobs.is_none() && self.base_dir.is_none() {
            return Ok(loaded);
        }
        let jobs = self.jobs.unwrap_or(loaded.jobs);
        if !(1..=MAX_JOBS).contains(&jobs) {
            anyhow::bail!("--jobs must be between 1 and {}, got {}", MAX_JOBS, jobs);
        }
        let base_dir = self.base_dir.clone().unwrap_or(loaded.base_dir);
        Ok(Config::new(loaded.repositories, jobs, base_dir)?)
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.verbose)
    }
}

/// Error for a missing configuration file, with hints on how to fix it.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create a {default} listing the repositories to manage\n\
         hint: Use --config to specify a different path\n\
         hint: Set the MISTLETOE_CONFIG environment variable",
        path = path.display(),
        default = config::DEFAULT_CONFIG_FILE
    )
}
