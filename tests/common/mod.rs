//! Shared test utilities for integration and E2E tests.
//!
//! Every fixture works on local bare repositories inside a temporary
//! directory, so the tests need a `git` binary but never the network.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new();
//!     let app = fixture.remote("app");
//!     fixture.with_config(&[&app]);
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{commit_file, git, TestFixture};
}

/// Runs git in `dir` with a fixed identity and returns its trimmed stdout.
/// Panics when git fails, showing its stderr.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Writes `content` to `file` in the work tree `dir` and commits it.
pub fn commit_file(dir: &Path, file: &str, content: &str, message: &str) -> String {
    std::fs::write(dir.join(file), content).expect("Failed to write file");
    git(dir, &["add", file]);
    git(dir, &["commit", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

/// A temporary directory holding bare "remote" repositories, scratch work
/// trees, and a configuration file whose clones land next to it.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory the configuration file and the clones live in.
    pub fn workspace(&self) -> PathBuf {
        let dir = self.path().join("workspace");
        std::fs::create_dir_all(&dir).expect("Failed to create workspace");
        dir
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.workspace().join("mistletoe.yaml")
    }

    /// Creates a bare repository named `<name>.git` whose `main` branch
    /// holds one commit, and returns its path (usable as clone URL).
    pub fn remote(&self, name: &str) -> PathBuf {
        let remotes = self.path().join("remotes");
        std::fs::create_dir_all(&remotes).expect("Failed to create remotes dir");
        let bare = remotes.join(format!("{}.git", name));
        git(&remotes, &["init", "--bare", "--quiet", &format!("{}.git", name)]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = self.path().join(format!("seed-{}", name));
        std::fs::create_dir_all(&seed).expect("Failed to create seed dir");
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&seed, "README.md", &format!("# {}\n\nline\n", name), "Initial commit");
        git(&seed, &["push", "--quiet", bare.to_str().expect("utf-8 path"), "main"]);
        bare
    }

    /// Clones `remote` into `<workspace>/<id>`, the way `mstl init` lays
    /// clones out.
    pub fn clone_into_workspace(&self, remote: &Path, id: &str) -> PathBuf {
        let workspace = self.workspace();
        git(
            &workspace,
            &["clone", "--quiet", remote.to_str().expect("utf-8 path"), id],
        );
        workspace.join(id)
    }

    /// Clones `remote` into a scratch directory outside the workspace, to
    /// play a collaborator pushing to the same remote.
    pub fn scratch_clone(&self, remote: &Path, name: &str) -> PathBuf {
        let dir = self.path().join("scratch");
        std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
        git(&dir, &["clone", "--quiet", remote.to_str().expect("utf-8 path"), name]);
        dir.join(name)
    }

    /// Writes a configuration listing `remotes` (ids derive from the bare
    /// repository names).
    pub fn with_config(&self, remotes: &[&Path]) -> &Self {
        let mut yaml = String::from("jobs: 2\nrepositories:\n");
        for remote in remotes {
            yaml.push_str(&format!("  - url: {}\n", remote.display()));
        }
        self.with_config_text(&yaml)
    }

    /// Writes the configuration file verbatim.
    pub fn with_config_text(&self, yaml: &str) -> &Self {
        self.temp_dir
            .child("workspace/mistletoe.yaml")
            .write_str(yaml)
            .expect("Failed to write config file");
        self
    }

    /// Writes a file at `path` relative to the fixture root.
    #[allow(dead_code)]
    pub fn child_file(&self, path: &str, content: &str) -> &Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Create a command for the `mstl` binary, pointed at this fixture's
    /// configuration, with colors off.
    #[allow(dead_code)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("mstl");
        cmd.current_dir(self.path())
            .env_remove("MISTLETOE_CONFIG")
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(self.config_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
