//! End-to-end tests for the `mstl` binary.
//!
//! These tests invoke the actual CLI binary against local bare repositories
//! and validate the commands from a user's perspective.

mod common;

use common::prelude::*;

#[test]
fn test_help_lists_commands() {
    cargo_bin_cmd!("mstl")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("snapshot"))
        .stdout(predicate::str::contains("switch"))
        .stdout(predicate::str::contains("pr"));
}

#[test]
fn test_pr_help_lists_subcommands() {
    cargo_bin_cmd!("mstl")
        .args(["pr", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("mstl")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_shows_hints() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let fixture = TestFixture::new();
    fixture.with_config_text("repositories:\n  - url: ''\n");
    fixture
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty url"));
}

#[test]
fn test_jobs_out_of_range_is_rejected() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture
        .command()
        .args(["--jobs", "0", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs must be between"));
}

#[test]
fn test_status_before_init() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture
        .command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories cloned yet"));
}

#[test]
fn test_init_then_status() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    let lib = fixture.remote("lib");
    fixture.with_config(&[&app, &lib]);

    fixture
        .command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] app cloned"))
        .stdout(predicate::str::contains("[OK] lib cloned"));
    assert!(fixture.workspace().join("app/.git").exists());
    assert!(fixture.workspace().join("lib/.git").exists());

    fixture
        .command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("[SKIP] app already cloned"));

    let clone = fixture.workspace().join("app");
    commit_file(&clone, "feature.txt", "new\n", "Local work");
    let short = git(&clone, &["rev-parse", "--short", "HEAD"]);

    fixture
        .command()
        .args(["status", "--no-fetch"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(">  app  main  {}", short)))
        .stdout(predicate::str::contains("-  lib  main"));
}

#[test]
fn test_init_rejects_foreign_clone() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    let other = fixture.remote("other");
    fixture.with_config(&[&app]);
    fixture.clone_into_workspace(&other, "app");

    fixture
        .command()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("app"));
}

#[test]
fn test_snapshot_writes_file() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture.clone_into_workspace(&app, "app");
    let out_dir = fixture.path().join("snapshots");

    fixture
        .command()
        .arg("snapshot")
        .arg("--output")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mistletoe-snapshot-"));

    let files: Vec<_> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("mistletoe-snapshot-"));
    assert!(files[0].ends_with(".json"));

    let content = std::fs::read_to_string(out_dir.join(&files[0])).unwrap();
    let snapshot = mistletoe::snapshot::Snapshot::from_json(&content).unwrap();
    assert_eq!(snapshot.repositories.len(), 1);
    assert_eq!(snapshot.repositories[0].branch, "main");
}

#[test]
fn test_snapshot_without_clones_fails() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture
        .command()
        .arg("snapshot")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No repositories cloned yet"));
}

#[test]
fn test_switch_create_branch_everywhere() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    let lib = fixture.remote("lib");
    fixture.with_config(&[&app, &lib]);
    fixture.clone_into_workspace(&app, "app");
    fixture.clone_into_workspace(&lib, "lib");

    fixture
        .command()
        .args(["switch", "-c", "topic"])
        .assert()
        .success();

    for id in ["app", "lib"] {
        let dir = fixture.workspace().join(id);
        assert_eq!(git(&dir, &["rev-parse", "--abbrev-ref", "HEAD"]), "topic");
    }
}

#[test]
fn test_switch_to_missing_branch_fails() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture.clone_into_workspace(&app, "app");

    fixture
        .command()
        .args(["switch", "does-not-exist"])
        .assert()
        .failure();
}

#[test]
fn test_pr_create_rejects_unknown_dependency() {
    let fixture = TestFixture::new();
    let app = fixture.remote("app");
    fixture.with_config(&[&app]);
    fixture
        .child_file("deps.md", "```mermaid\ngraph TD\n  app --> ghost\n```\n");

    fixture
        .command()
        .args(["pr", "create", "--dry-run", "--dependencies"])
        .arg(fixture.path().join("deps.md"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}
