//! `summary.json` and `report.md` rendering for a finished run.

mod report;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::branches::{
    failed_architecture_output, failed_performance_output, failed_security_output,
    synthesize_roadmap,
};
use crate::flow::{BranchStatus, FlowState, NodeId};
use crate::schema::{
    ArchitectureOutput, ArchitectureType, PerformanceOutput, Priority, RiskItem, RoadmapItem,
    ScannerOutput, SecurityOutput, ToolStatus,
};

pub use report::build_report;

pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_FILE: &str = "report.md";

const MAX_SUMMARY_RISKS: usize = 5;
const MAX_TOOL_DETAIL: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    Degraded,
}

impl StageStatus {
    fn from_branch(status: BranchStatus) -> Self {
        match status {
            BranchStatus::Completed => Self::Completed,
            BranchStatus::Degraded => Self::Degraded,
            _ => Self::Failed,
        }
    }

    /// The scanner never degrades; anything short of completion is a failure.
    fn from_scanner(status: BranchStatus) -> Self {
        match status {
            BranchStatus::Completed => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub scanner: StageStatus,
    pub architecture: StageStatus,
    pub security: StageStatus,
    pub performance: StageStatus,
    pub roadmap: StageStatus,
}

impl AnalysisStatus {
    pub fn from_state(state: &FlowState) -> Self {
        Self {
            scanner: StageStatus::from_scanner(state.status(NodeId::Scanner)),
            architecture: StageStatus::from_branch(state.status(NodeId::Architecture)),
            security: StageStatus::from_branch(state.status(NodeId::Security)),
            performance: StageStatus::from_branch(state.status(NodeId::Performance)),
            roadmap: StageStatus::from_branch(state.status(NodeId::Roadmap)),
        }
    }

    /// Stage/status pairs in pipeline order.
    pub fn entries(&self) -> [(&'static str, StageStatus); 5] {
        [
            ("scanner", self.scanner),
            ("architecture", self.architecture),
            ("security", self.security),
            ("performance", self.performance),
            ("roadmap", self.roadmap),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolingStatus {
    Completed,
    ToolingUnavailable,
    ToolExecutionFailed,
}

impl From<ToolStatus> for ToolingStatus {
    fn from(status: ToolStatus) -> Self {
        match status {
            ToolStatus::Completed => Self::Completed,
            ToolStatus::Unavailable => Self::ToolingUnavailable,
            ToolStatus::Failed => Self::ToolExecutionFailed,
        }
    }
}

impl ToolingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ToolingUnavailable => "tooling_unavailable",
            Self::ToolExecutionFailed => "tool_execution_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerToolingStatus {
    pub tool: String,
    pub status: ToolingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRoadmapItem {
    pub priority: Priority,
    pub task: String,
    pub effort: String,
}

/// Machine-readable run summary written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryJson {
    pub schema_version: String,
    pub run_id: String,
    pub repo_name: String,
    pub language_detected: Vec<String>,
    pub frameworks: Vec<String>,
    pub architecture_type: ArchitectureType,
    pub top_security_risks: Vec<RiskItem>,
    pub top_performance_risks: Vec<RiskItem>,
    pub roadmap: Vec<SummaryRoadmapItem>,
    pub scanner_tooling: Vec<ScannerToolingStatus>,
    pub analysis_status: AnalysisStatus,
}

/// Branch outputs resolved from a terminal state, with placeholders filled in.
#[derive(Debug)]
pub struct ArtifactInputs<'a> {
    pub schema_version: &'a str,
    pub run_id: &'a str,
    pub scanner: &'a ScannerOutput,
    pub architecture: Cow<'a, ArchitectureOutput>,
    pub security: Cow<'a, SecurityOutput>,
    pub performance: Cow<'a, PerformanceOutput>,
    pub roadmap: Cow<'a, [RoadmapItem]>,
    pub analysis_status: AnalysisStatus,
}

impl<'a> ArtifactInputs<'a> {
    /// Errors when the scanner never produced output.
    pub fn from_state(state: &'a FlowState) -> Result<Self> {
        let scanner = state.scanner_output.as_ref().with_context(|| {
            format!(
                "Run {} has no scanner output; nothing to render",
                state.run_id
            )
        })?;
        let run_id = state.run_id.as_str();
        let version = state.schema_version.as_str();
        let reason = |node: NodeId| {
            state
                .branch_failures
                .get(&node)
                .cloned()
                .unwrap_or_else(|| format!("{} branch output missing", node))
        };

        let architecture = match &state.architecture_output {
            Some(output) => Cow::Borrowed(output),
            None => Cow::Owned(failed_architecture_output(
                run_id,
                version,
                &reason(NodeId::Architecture),
            )),
        };
        let security = match &state.security_output {
            Some(output) => Cow::Borrowed(output),
            None => Cow::Owned(failed_security_output(
                run_id,
                version,
                &reason(NodeId::Security),
            )),
        };
        let performance = match &state.performance_output {
            Some(output) => Cow::Borrowed(output),
            None => Cow::Owned(failed_performance_output(
                run_id,
                version,
                &reason(NodeId::Performance),
            )),
        };

        let roadmap = match &state.roadmap_output {
            Some(output) if !output.items.is_empty() => Cow::Borrowed(output.items.as_slice()),
            _ => Cow::Owned(synthesize_roadmap(&architecture, &security, &performance)),
        };

        Ok(Self {
            schema_version: version,
            run_id,
            scanner,
            architecture,
            security,
            performance,
            roadmap,
            analysis_status: AnalysisStatus::from_state(state),
        })
    }
}

pub fn build_summary(inputs: &ArtifactInputs<'_>) -> SummaryJson {
    let profile = &inputs.scanner.repo_profile;

    let mut languages = profile.languages_detected.clone();
    languages.sort();
    let mut frameworks = profile.frameworks_detected.clone();
    frameworks.sort();

    let mut roadmap: Vec<SummaryRoadmapItem> = inputs
        .roadmap
        .iter()
        .map(|item| SummaryRoadmapItem {
            priority: item.priority,
            task: item.task.clone(),
            effort: item.effort.clone(),
        })
        .collect();
    roadmap.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.task.cmp(&b.task)));

    let mut scanner_tooling: Vec<ScannerToolingStatus> = inputs
        .scanner
        .scanner_tool_runs
        .iter()
        .map(|run| ScannerToolingStatus {
            tool: run.tool.clone(),
            status: run.status.into(),
            exit_code: run.exit_code,
            details: run.details.as_deref().map(truncate_detail),
        })
        .collect();
    scanner_tooling.sort_by(|a, b| a.tool.cmp(&b.tool));

    SummaryJson {
        schema_version: inputs.schema_version.to_string(),
        run_id: inputs.run_id.to_string(),
        repo_name: profile.repo_name.clone(),
        language_detected: languages,
        frameworks,
        architecture_type: inputs.architecture.architecture_type,
        top_security_risks: top_risks(&inputs.security.top_security_risks),
        top_performance_risks: top_risks(&inputs.performance.top_performance_risks),
        roadmap,
        scanner_tooling,
        analysis_status: inputs.analysis_status,
    }
}

fn top_risks(risks: &[RiskItem]) -> Vec<RiskItem> {
    let mut sorted = risks.to_vec();
    sorted.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| a.issue.cmp(&b.issue))
            .then_with(|| a.file.cmp(&b.file))
    });
    sorted.truncate(MAX_SUMMARY_RISKS);
    sorted
}

/// Collapse whitespace and cap at [`MAX_TOOL_DETAIL`] characters.
pub(crate) fn truncate_detail(value: &str) -> String {
    let compact = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= MAX_TOOL_DETAIL {
        return compact;
    }
    let head: String = compact.chars().take(MAX_TOOL_DETAIL - 3).collect();
    format!("{}...", head)
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub summary: SummaryJson,
    pub report_markdown: String,
    pub summary_path: PathBuf,
    pub report_path: PathBuf,
}

/// Render both artifacts for `state` into `output_dir`.
pub fn write_artifacts(state: &FlowState, output_dir: &Path) -> Result<GeneratedArtifacts> {
    let inputs = ArtifactInputs::from_state(state)?;
    let summary = build_summary(&inputs);
    let report_markdown = build_report(&inputs);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?;
    let summary_path = output_dir.join(SUMMARY_FILE);
    let report_path = output_dir.join(REPORT_FILE);

    let mut json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
    json.push('\n');
    std::fs::write(&summary_path, json)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    std::fs::write(&report_path, &report_markdown)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    Ok(GeneratedArtifacts {
        summary,
        report_markdown,
        summary_path,
        report_path,
    })
}
