//! CLI integration tests for the `triage` binary.
//!
//! Every run uses `--skip-tools` so no external scanners are needed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a triage Command rooted in `dir`
fn triage(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("triage");
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

/// A small Flask project with a manifest and an entry point
fn create_fixture_repo(root: &Path) {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(
        root.join("app/main.py"),
        "from flask import Flask\napp = Flask(__name__)\n",
    )
    .unwrap();
    fs::write(root.join("requirements.txt"), "flask==3.0\n").unwrap();
}

fn analyze(dir: &TempDir, run_id: &str) -> assert_cmd::assert::Assert {
    let repo = dir.path().join("repo");
    create_fixture_repo(&repo);
    triage(dir.path())
        .args(["analyze", "--path"])
        .arg(&repo)
        .args(["--run-id", run_id, "--output-dir", "out", "--skip-tools"])
        .assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_triage_help() {
        let dir = TempDir::new().unwrap();
        triage(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("analyze"))
            .stdout(predicate::str::contains("transitions"));
    }

    #[test]
    fn test_triage_version() {
        let dir = TempDir::new().unwrap();
        triage(dir.path()).arg("--version").assert().success();
    }

    #[test]
    fn test_analyze_requires_a_source() {
        let dir = TempDir::new().unwrap();
        triage(dir.path()).arg("analyze").assert().failure();
    }

    #[test]
    fn test_path_and_github_url_conflict() {
        let dir = TempDir::new().unwrap();
        triage(dir.path())
            .args(["analyze", "--path", ".", "--github-url", "https://github.com/a/b"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Analyze / Resume
// =============================================================================

mod analyze {
    use super::*;

    #[test]
    fn test_analyze_local_path_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        analyze(&dir, "cli-run")
            .success()
            .stdout(predicate::str::contains("run_id: cli-run"))
            .stdout(predicate::str::contains("status: completed"));

        assert!(dir.path().join(".triage/triage.db").exists());
        let summary = fs::read_to_string(dir.path().join("out/summary.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(json["run_id"], "cli-run");
        assert_eq!(json["repo_name"], "repo");
        assert_eq!(json["analysis_status"]["roadmap"], "completed");
        assert_eq!(json["frameworks"][0], "Flask");

        let report = fs::read_to_string(dir.path().join("out/report.md")).unwrap();
        assert!(report.starts_with("# Repository Analysis Report"));
    }

    #[test]
    fn test_missing_local_path_exits_nonzero() {
        let dir = TempDir::new().unwrap();
        triage(dir.path())
            .args(["analyze", "--path", "does-not-exist", "--skip-tools"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid local path"));
    }

    #[test]
    fn test_resume_completed_run_rewrites_artifacts() {
        let dir = TempDir::new().unwrap();
        analyze(&dir, "cli-resume").success();
        triage(dir.path())
            .args(["resume", "--run-id", "cli-resume", "--output-dir", "again"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status: completed"));
        assert!(dir.path().join("again/summary.json").exists());
    }

    #[test]
    fn test_resume_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        triage(dir.path())
            .args(["resume", "--run-id", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No checkpoint found for run ghost"));
    }

    #[test]
    fn test_unknown_profile_fails() {
        let dir = TempDir::new().unwrap();
        triage(dir.path())
            .args(["analyze", "--path", ".", "--profile", "nope", "--skip-tools"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("'nope'"));
    }
}

// =============================================================================
// Inspection
// =============================================================================

mod inspect {
    use super::*;

    #[test]
    fn test_status_lists_every_node() {
        let dir = TempDir::new().unwrap();
        analyze(&dir, "cli-status").success();
        triage(dir.path())
            .args(["status", "--run-id", "cli-status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status: completed"))
            .stdout(predicate::str::contains("scanner"))
            .stdout(predicate::str::contains("roadmap"))
            .stdout(predicate::str::contains("provider: heuristic"))
            .stdout(predicate::str::contains("source: ").and(predicate::str::contains(
                "(scanner_completed)",
            )));
    }

    #[test]
    fn test_transitions_in_order() {
        let dir = TempDir::new().unwrap();
        analyze(&dir, "cli-log").success();
        let output = triage(dir.path())
            .args(["transitions", "--run-id", "cli-log"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).unwrap();
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[0].contains("start"));
        assert!(lines[0].contains("Validated analyze request"));
        assert!(lines[10].contains("roadmap"));
        assert!(lines[10].contains("-> completed"));
    }

    #[test]
    fn test_custom_db_path() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        create_fixture_repo(&repo);
        triage(dir.path())
            .args(["--db", "custom/flow.db", "analyze", "--path"])
            .arg(&repo)
            .args(["--run-id", "cli-db", "--skip-tools"])
            .assert()
            .success();
        assert!(dir.path().join("custom/flow.db").exists());
        triage(dir.path())
            .args(["--db", "custom/flow.db", "status", "--run-id", "cli-db"])
            .assert()
            .success();
    }
}
