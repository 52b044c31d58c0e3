//! # External Command Execution
//!
//! Every interaction with `git` and `gh` goes through the `CommandRunner`
//! trait. The runner is created once by the command layer and passed by
//! reference down the call chain, so tests can substitute a scripted runner
//! without touching global state.
//!
//! `ProcessRunner` is the real implementation. In verbose mode it traces
//! each invocation with a start and a completion line. Both lines are
//! written together once the command returns, while holding `LOG_LOCK`,
//! so the trace of one command is never split by another worker's output.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Instant;

use log::debug;

use crate::error::{Error, Result};

static LOG_LOCK: Mutex<()> = Mutex::new(());

/// Narrow interface for running an external program.
pub trait CommandRunner: Send + Sync {
    /// Runs `program args...` in `dir` (or the current directory) and returns
    /// its trimmed standard output. A non-zero exit status is an
    /// `Error::Command` carrying the standard error text.
    fn run(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<String>;

    /// Runs a program with the terminal streams inherited, for commands that
    /// may prompt the user (credentials, `gh` authentication).
    fn run_interactive(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<()>;
}

/// Runs commands as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner {
    verbose: bool,
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Writes the start and completion lines of one finished command in a
    /// single `LOG_LOCK` section.
    fn trace(&self, dir: Option<&Path>, program: &str, args: &[&str], started: Instant, ok: bool) {
        if self.verbose {
            let lines = trace_lines(dir, program, args, started.elapsed().as_millis(), ok);
            let _guard = LOG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            eprint!("{}", lines);
        }
    }
}

fn trace_lines(dir: Option<&Path>, program: &str, args: &[&str], millis: u128, ok: bool) -> String {
    let dir = display_dir(dir);
    format!(
        "[{dir}] $ {program} {}\n[{dir}] {} {program} {} ({millis} ms)\n",
        args.join(" "),
        if ok { "done" } else { "FAILED" },
        args.first().copied().unwrap_or_default(),
    )
}

impl CommandRunner for ProcessRunner {
    fn run(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<String> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let output = command
            .output()
            .map_err(|e| command_error(dir, program, args, e.to_string()));
        let ok = matches!(&output, Ok(o) if o.status.success());
        self.trace(dir, program, args, started, ok);
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                // Some tools (git merge-base --is-ancestor) fail silently.
                format!("exit status {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            return Err(command_error(dir, program, args, stderr));
        }

        debug!("{} {} succeeded in {}", program, args.join(" "), display_dir(dir));
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_interactive(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<()> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let status = command
            .status()
            .map_err(|e| command_error(dir, program, args, e.to_string()));
        let ok = matches!(&status, Ok(s) if s.success());
        self.trace(dir, program, args, started, ok);

        let status = status?;
        if !status.success() {
            return Err(command_error(
                dir,
                program,
                args,
                format!("exit status {}", status.code().unwrap_or(-1)),
            ));
        }
        Ok(())
    }
}

/// Builds the `Error::Command` for a failed invocation.
pub fn command_error(dir: Option<&Path>, program: &str, args: &[&str], stderr: String) -> Error {
    Error::Command {
        program: program.to_string(),
        args: args.join(" "),
        dir: display_dir(dir),
        stderr,
    }
}

/// Standard error text of a command failure, for matching known messages.
pub fn stderr_of(err: &Error) -> &str {
    match err {
        Error::Command { stderr, .. } => stderr,
        _ => "",
    }
}

fn display_dir(dir: Option<&Path>) -> String {
    dir.map(|d| d.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}
