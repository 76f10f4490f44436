//! Deterministic scanner stage.
//!
//! Resolves the source, walks the inventory, profiles the repository, and runs
//! the optional security tools. The output is the single input every analysis
//! branch receives.

pub mod heuristics;
pub mod inventory;
pub mod normalize;
pub mod source;
pub mod tools;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{AppConfig, ScanPolicy};
use crate::flow::ScannerStore;
use crate::schema::{
    AnalyzeRequest, DependencySummary, FeatureFlags, RepoProfile, ScannerOutput, ToolStatus,
};
use inventory::InventoryEngine;
use tools::{ToolOutcome, ToolRunner, skipped_run};

/// Where GitHub sources are cloned, relative to the working directory.
pub const DEFAULT_WORKSPACE_DIR: &str = ".triage/workspace";

/// Produces the scanner output for a request.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, request: &AnalyzeRequest) -> Result<ScannerOutput>;
}

pub struct ScannerPipeline {
    scan_policy: ScanPolicy,
    feature_flags: FeatureFlags,
    workspace_root: PathBuf,
    store: Option<ScannerStore>,
}

impl ScannerPipeline {
    pub fn new(
        scan_policy: ScanPolicy,
        feature_flags: FeatureFlags,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            scan_policy,
            feature_flags,
            workspace_root,
            store: None,
        }
    }

    /// Persist each finished scan with its resolved source location.
    pub fn with_store(mut self, store: ScannerStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn from_config(config: &AppConfig, workspace_root: PathBuf) -> Self {
        Self::new(
            config.scan_policy.clone(),
            config.feature_flags,
            workspace_root,
        )
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }
}

#[async_trait]
impl Scanner for ScannerPipeline {
    async fn scan(&self, request: &AnalyzeRequest) -> Result<ScannerOutput> {
        let started_at = Utc::now();
        let run_id = request.run_id.clone();
        let input = request.input.clone();
        let workspace = self.workspace_root.clone();
        let resolved =
            tokio::task::spawn_blocking(move || source::resolve(&input, &run_id, &workspace))
                .await
                .context("Source resolution task panicked")??;
        info!(
            run_id = %request.run_id,
            repo = %resolved.repo_name,
            path = %resolved.resolved_path.display(),
            "Resolved source"
        );

        let engine = InventoryEngine::new(&self.scan_policy)?;
        let repo_path = resolved.resolved_path.clone();
        let inventory = tokio::task::spawn_blocking(move || engine.collect(&repo_path))
            .await
            .context("Inventory task panicked")??;
        debug!(
            run_id = %request.run_id,
            scanned = inventory.stats.files_scanned,
            skipped = inventory.stats.files_skipped,
            "Inventory collected"
        );

        let files = &inventory.files;
        let languages = heuristics::detect_languages(files);
        let frameworks = heuristics::detect_frameworks(files);
        let entry_points = heuristics::detect_entry_points(files);
        let architecture_hints = heuristics::detect_architecture_hints(files);
        let manifest_summaries = heuristics::summarize_manifests(files);
        let manifest_paths: Vec<String> =
            manifest_summaries.iter().map(|m| m.path.clone()).collect();
        let folders = heuristics::summarize_folders(&inventory.top_level_dirs);

        let mut evidence = normalize::heuristic_evidence(&entry_points, &manifest_paths);
        let mut dependency_findings = Vec::new();
        let mut tool_runs = Vec::new();

        let requested = &request.execution.feature_flags;
        let runner = ToolRunner::new(Duration::from_secs(
            request.execution.timeouts.scanner_seconds,
        ));
        let path = resolved.resolved_path.as_path();

        if requested.enable_semgrep && self.feature_flags.enable_semgrep {
            let outcome = runner.run_semgrep(path).await;
            if let Some(payload) = &outcome.payload {
                evidence.extend(normalize::normalize_semgrep(payload));
            }
            tool_runs.push(finish(outcome));
        } else {
            tool_runs.push(skipped_run("semgrep", "disabled by feature flags"));
        }

        let has_python = languages.iter().any(|l| l == "Python");
        if !(requested.enable_bandit && self.feature_flags.enable_bandit) {
            tool_runs.push(skipped_run("bandit", "disabled by feature flags"));
        } else if !has_python {
            tool_runs.push(skipped_run("bandit", "no Python sources detected"));
        } else {
            let outcome = runner.run_bandit(path).await;
            if let Some(payload) = &outcome.payload {
                evidence.extend(normalize::normalize_bandit(payload));
            }
            tool_runs.push(finish(outcome));
        }

        if requested.enable_osv && self.feature_flags.enable_osv {
            let outcome = runner.run_osv(path).await;
            if let Some(payload) = &outcome.payload {
                let (osv_evidence, findings) = normalize::normalize_osv(payload);
                evidence.extend(osv_evidence);
                dependency_findings = findings;
            }
            tool_runs.push(finish(outcome));
        } else {
            tool_runs.push(skipped_run("osv-scanner", "disabled by feature flags"));
        }

        let statuses: Vec<ToolStatus> = tool_runs.iter().map(|r| r.status).collect();
        let vulnerability_scan_status = ToolStatus::fold(&statuses);

        info!(
            run_id = %request.run_id,
            evidence = evidence.len(),
            dependency_status = vulnerability_scan_status.as_str(),
            "Scanner stage complete"
        );

        let output = ScannerOutput {
            schema_version: request.schema_version.clone(),
            run_id: request.run_id.clone(),
            repo_profile: RepoProfile {
                repo_name: resolved.repo_name,
                languages_detected: languages,
                frameworks_detected: frameworks,
                architecture_hints,
                entry_points,
                manifests: manifest_paths,
            },
            scan_stats: inventory.stats,
            folders,
            dependency_summary: DependencySummary {
                manifests: manifest_summaries,
                vulnerability_scan_status,
                vulnerability_findings: dependency_findings,
            },
            evidence_index: evidence,
            scanner_tool_runs: tool_runs,
        };

        if let Some(store) = &self.store {
            store
                .save(&output, &resolved.resolved_path, started_at)
                .await
                .context("Failed to persist scanner output")?;
        }
        Ok(output)
    }
}

fn finish(outcome: ToolOutcome) -> crate::schema::ScannerToolRun {
    debug!(tool = %outcome.run.tool, status = outcome.status().as_str(), "Tool finished");
    outcome.run
}
