//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, Context};
use mistletoe::config::DEFAULT_CONFIG_FILE;
use mistletoe::output::OutputConfig;

/// Mistletoe - Manage a fleet of git repositories as one change set
#[derive(Parser, Debug)]
#[command(name = "mstl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file.
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        env = "MISTLETOE_CONFIG"
    )]
    config: PathBuf,

    /// Directory holding the clones. Defaults to the configuration file's
    /// directory.
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Number of repositories processed at once (overrides `jobs`).
    #[arg(short, long, global = true, value_name = "N")]
    jobs: Option<usize>,

    /// Print every git and gh command with its duration.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone every configured repository
    Init(commands::init::InitArgs),

    /// Show how every repository relates to its remote branch
    Status(commands::status::StatusArgs),

    /// Record the exact state of every repository
    Snapshot(commands::snapshot::SnapshotArgs),

    /// Check out a branch in every repository
    Switch(commands::switch::SwitchArgs),

    /// Manage the pull requests of the change set
    #[command(subcommand)]
    Pr(commands::pr::PrCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        let context = Context {
            config_path: self.config,
            base_dir: self.base_dir,
            jobs: self.jobs,
            verbose: self.verbose,
            output: OutputConfig::from_env_and_flag(&self.color),
        };

        match self.command {
            Commands::Init(args) => commands::init::execute(args, &context),
            Commands::Status(args) => commands::status::execute(args, &context),
            Commands::Snapshot(args) => commands::snapshot::execute(args, &context),
            Commands::Switch(args) => commands::switch::execute(args, &context),
            Commands::Pr(command) => commands::pr::execute(command, &context),
        }
    }
}

/// `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A logger may already be installed when running inside tests.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
