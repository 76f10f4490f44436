//! Reproducibility metadata captured for every run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::{AppConfig, RetrySettings, TimeoutSettings};
use crate::flow::{BranchStatus, DbHandle, FlowState, NodeId};
use crate::redaction::redact_text;
use crate::scanner::source;
use crate::schema::{AnalyzeRequest, ProviderKind};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub repo_name: String,
    pub resolved_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderManifest {
    pub profile: String,
    pub kind: ProviderKind,
    pub model: String,
}

/// First line of each tool's `--version` output, `None` when not installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersions {
    pub triage: String,
    #[serde(default)]
    pub semgrep: Option<String>,
    #[serde(default)]
    pub bandit: Option<String>,
    #[serde(default)]
    pub osv_scanner: Option<String>,
    #[serde(default)]
    pub ripgrep: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub repo: RepoMetadata,
    pub provider: ProviderManifest,
    pub tool_versions: ToolVersions,
    pub retries: RetrySettings,
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub analysis_status: BTreeMap<NodeId, BranchStatus>,
    #[serde(default)]
    pub branch_failures: BTreeMap<NodeId, String>,
}

/// Builds a [`RunManifest`] from the finished state and the active config.
pub struct ManifestCollector {
    workspace_root: PathBuf,
    detect_tool_versions: bool,
}

impl ManifestCollector {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            detect_tool_versions: true,
        }
    }

    /// Skip `--version` calls; tool versions are left empty.
    pub fn without_tool_versions(mut self) -> Self {
        self.detect_tool_versions = false;
        self
    }

    pub async fn collect(
        &self,
        state: &FlowState,
        request: &AnalyzeRequest,
        config: &AppConfig,
        profile_name: &str,
    ) -> RunManifest {
        let location =
            source::expected_location(&request.input, &request.run_id, &self.workspace_root);
        let repo_name = state
            .scanner_output
            .as_ref()
            .map(|s| s.repo_profile.repo_name.clone())
            .unwrap_or(location.repo_name);
        let sha_path = location.resolved_path.clone();
        let git_commit_sha = tokio::task::spawn_blocking(move || source::head_commit_sha(&sha_path))
            .await
            .ok()
            .flatten();

        let provider = match config.profile(Some(profile_name)) {
            Some((name, profile)) => ProviderManifest {
                profile: name.to_string(),
                kind: profile.kind,
                model: profile.model.clone(),
            },
            None => ProviderManifest {
                profile: profile_name.to_string(),
                kind: request.execution.provider.kind,
                model: request.execution.provider.model.clone(),
            },
        };

        let tool_versions = if self.detect_tool_versions {
            ToolVersions {
                triage: env!("CARGO_PKG_VERSION").to_string(),
                semgrep: tool_version("semgrep").await,
                bandit: tool_version("bandit").await,
                osv_scanner: tool_version("osv-scanner").await,
                ripgrep: tool_version("rg").await,
            }
        } else {
            ToolVersions {
                triage: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            }
        };

        RunManifest {
            schema_version: request.schema_version.clone(),
            run_id: request.run_id.clone(),
            created_at: Utc::now(),
            repo: RepoMetadata {
                repo_name,
                resolved_path: location.resolved_path.to_string_lossy().into_owned(),
                git_commit_sha,
            },
            provider,
            tool_versions,
            retries: config.retries,
            timeouts: config.timeouts,
            analysis_status: state.branch_statuses.clone(),
            branch_failures: state
                .branch_failures
                .iter()
                .map(|(node, reason)| (*node, redact_text(reason)))
                .collect(),
        }
    }
}

async fn tool_version(program: &str) -> Option<String> {
    let child = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;
    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Manifest rows in the flow database, one per run.
#[derive(Clone)]
pub struct ManifestStore {
    db: DbHandle,
}

impl ManifestStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub async fn save(&self, manifest: &RunManifest) -> Result<()> {
        let run_id = manifest.run_id.clone();
        let created_at = manifest.created_at.to_rfc3339();
        let payload = serde_json::to_string(manifest).context("Failed to serialize run manifest")?;
        self.db
            .call(move |db| db.upsert_manifest(&run_id, &created_at, &payload))
            .await
    }

    pub async fn load(&self, run_id: &str) -> Result<Option<RunManifest>> {
        let key = run_id.to_string();
        let payload = self.db.call(move |db| db.get_manifest(&key)).await?;
        payload
            .map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt run manifest for {}", run_id))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AnalyzeInput;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_collect_uses_config_and_state() {
        let repo = tempdir().unwrap();
        let request =
            AnalyzeRequest::new("run-m", AnalyzeInput::local(repo.path().to_string_lossy()));
        let mut state = FlowState::for_request(&request, Some("heuristic".into())).unwrap();
        state.set_status(NodeId::Security, BranchStatus::Failed);
        state
            .branch_failures
            .insert(NodeId::Security, "Authorization: Bearer abcdef123456".into());

        let config = AppConfig::default();
        let collector = ManifestCollector::new(repo.path().join("ws")).without_tool_versions();
        let manifest = collector.collect(&state, &request, &config, "heuristic").await;

        assert_eq!(manifest.run_id, "run-m");
        assert_eq!(manifest.provider.profile, "heuristic");
        assert_eq!(manifest.provider.kind, ProviderKind::Heuristic);
        assert_eq!(manifest.retries, config.retries);
        assert_eq!(manifest.analysis_status[&NodeId::Security], BranchStatus::Failed);
        assert!(!manifest.branch_failures[&NodeId::Security].contains("abcdef123456"));
        assert!(manifest.tool_versions.semgrep.is_none());
        assert!(!manifest.tool_versions.triage.is_empty());
    }

    #[tokio::test]
    async fn test_github_repo_name_fallback() {
        let request = AnalyzeRequest::new("r1", AnalyzeInput::github("https://example.com/x/y"));
        let state = FlowState::for_request(&request, None).unwrap();
        let collector =
            ManifestCollector::new(PathBuf::from("/nonexistent-ws")).without_tool_versions();
        let manifest = collector
            .collect(&state, &request, &AppConfig::default(), "heuristic")
            .await;
        assert_eq!(manifest.repo.repo_name, "unknown-repo");
        assert!(manifest.repo.git_commit_sha.is_none());
    }

    #[tokio::test]
    async fn test_store_round_trip_and_upsert() {
        let store = ManifestStore::new(DbHandle::in_memory().unwrap());
        assert!(store.load("missing").await.unwrap().is_none());

        let repo = tempdir().unwrap();
        let request =
            AnalyzeRequest::new("run-s", AnalyzeInput::local(repo.path().to_string_lossy()));
        let state = FlowState::for_request(&request, None).unwrap();
        let collector = ManifestCollector::new(repo.path().to_path_buf()).without_tool_versions();
        let mut manifest = collector
            .collect(&state, &request, &AppConfig::default(), "heuristic")
            .await;
        store.save(&manifest).await.unwrap();

        manifest
            .analysis_status
            .insert(NodeId::Roadmap, BranchStatus::Completed);
        store.save(&manifest).await.unwrap();
        let loaded = store.load("run-s").await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }
}
