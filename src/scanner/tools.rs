//! External security scanners run as bounded subprocesses.

use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::redaction::redact_text;
use crate::schema::{ScannerToolRun, ToolStatus};

/// Exit codes the scanners use for "ran, maybe found issues".
const SUCCESS_CODES: [i32; 2] = [0, 1];

/// Result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub run: ScannerToolRun,
    /// Parsed stdout, present only when the run completed.
    pub payload: Option<Value>,
}

impl ToolOutcome {
    fn unavailable(tool: &str, details: String) -> Self {
        Self {
            run: ScannerToolRun {
                tool: tool.to_string(),
                status: ToolStatus::Unavailable,
                exit_code: None,
                details: Some(details),
            },
            payload: None,
        }
    }

    fn failed(tool: &str, exit_code: Option<i32>, details: String) -> Self {
        Self {
            run: ScannerToolRun {
                tool: tool.to_string(),
                status: ToolStatus::Failed,
                exit_code,
                details: Some(redact_text(&details)),
            },
            payload: None,
        }
    }

    fn completed(tool: &str, exit_code: Option<i32>, payload: Value) -> Self {
        Self {
            run: ScannerToolRun {
                tool: tool.to_string(),
                status: ToolStatus::Completed,
                exit_code,
                details: None,
            },
            payload: Some(payload),
        }
    }

    pub fn status(&self) -> ToolStatus {
        self.run.status
    }
}

/// Runs semgrep, bandit, and osv-scanner with a shared timeout.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run_semgrep(&self, repo_path: &Path) -> ToolOutcome {
        let path = repo_path.to_string_lossy().into_owned();
        self.run_json_command(
            "semgrep",
            "semgrep",
            &["scan", "--config", "auto", "--json", path.as_str()],
        )
        .await
    }

    pub async fn run_bandit(&self, repo_path: &Path) -> ToolOutcome {
        let path = repo_path.to_string_lossy().into_owned();
        self.run_json_command("bandit", "bandit", &["-r", path.as_str(), "-f", "json"])
            .await
    }

    pub async fn run_osv(&self, repo_path: &Path) -> ToolOutcome {
        let path = repo_path.to_string_lossy().into_owned();
        self.run_json_command(
            "osv-scanner",
            "osv-scanner",
            &["scan", "source", "-r", path.as_str(), "--format", "json"],
        )
        .await
    }

    /// Run `program` and parse its stdout as JSON.
    ///
    /// A program that cannot be found is `unavailable`. A timeout, an exit
    /// code outside {0, 1}, or non-JSON stdout is `failed`. Empty stdout
    /// completes with an empty object.
    pub async fn run_json_command(&self, tool: &str, program: &str, args: &[&str]) -> ToolOutcome {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ToolOutcome::unavailable(tool, format!("{} not found", tool));
            }
            Err(e) => {
                return ToolOutcome::failed(tool, None, format!("{} failed to start: {}", tool, e));
            }
        };

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::failed(tool, None, format!("{} failed: {}", tool, e)),
            Err(_) => return ToolOutcome::failed(tool, None, format!("{} timed out", tool)),
        };

        let exit_code = output.status.code();
        if !exit_code.is_some_and(|code| SUCCESS_CODES.contains(&code)) {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let details = if stderr.is_empty() {
                format!("{} failed", tool)
            } else {
                stderr
            };
            tracing::warn!(tool, exit_code = ?exit_code, "Scanner tool failed");
            return ToolOutcome::failed(tool, exit_code, details);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return ToolOutcome::completed(tool, exit_code, Value::Object(Default::default()));
        }
        match serde_json::from_str(stdout) {
            Ok(payload) => ToolOutcome::completed(tool, exit_code, payload),
            Err(_) => {
                ToolOutcome::failed(tool, exit_code, format!("{} produced non-JSON output", tool))
            }
        }
    }
}

/// Status recorded for a tool that was not run.
pub fn skipped_run(tool: &str, reason: &str) -> ScannerToolRun {
    ScannerToolRun {
        tool: tool.to_string(),
        status: ToolStatus::Unavailable,
        exit_code: None,
        details: Some(reason.to_string()),
    }
}
