//! Scanner-stage output consumed by every analysis branch.

use serde::{Deserialize, Serialize};

/// Reasons a file was left out of the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReasons {
    pub ignored_pathspec: u64,
    pub binary: u64,
    pub too_large: u64,
    pub encoding_error: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_files_seen: u64,
    pub files_scanned: u64,
    pub files_skipped: u64,
    #[serde(default)]
    pub skipped_reasons: SkipReasons,
}

/// Guessed purpose of a top-level folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub path: String,
    pub purpose_guess: String,
    pub confidence: f64,
}

/// Producer of an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Rg,
    Semgrep,
    Bandit,
    Osv,
    TreeSitter,
    ScannerHeuristic,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rg => "rg",
            Self::Semgrep => "semgrep",
            Self::Bandit => "bandit",
            Self::Osv => "osv",
            Self::TreeSitter => "tree_sitter",
            Self::ScannerHeuristic => "scanner_heuristic",
        }
    }

    /// Sources that come from a security tool.
    pub fn is_security_tool(&self) -> bool {
        matches!(self, Self::Semgrep | Self::Bandit | Self::Osv)
    }
}

/// Kind of signal an evidence item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Entrypoint,
    Config,
    Route,
    Auth,
    Db,
    PerfHotspot,
    Secret,
    Vuln,
    Dependency,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entrypoint => "entrypoint",
            Self::Config => "config",
            Self::Route => "route",
            Self::Auth => "auth",
            Self::Db => "db",
            Self::PerfHotspot => "perf_hotspot",
            Self::Secret => "secret",
            Self::Vuln => "vuln",
            Self::Dependency => "dependency",
        }
    }
}

/// Atomic, content-addressed evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub snippet_hash: String,
    pub source: EvidenceSource,
    pub signal_type: SignalType,
    pub summary: String,
    pub confidence: f64,
}

/// Severity as reported by dependency scanners, which may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencySeverity {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl DependencySeverity {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("medium") | Some("moderate") => Self::Medium,
            Some("high") => Self::High,
            Some("critical") => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyFinding {
    pub package: String,
    pub ecosystem: String,
    pub version: String,
    pub vulnerability_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub severity: DependencySeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub path: String,
    pub ecosystem: String,
    pub direct_dependency_count: u64,
}

/// Execution status of one external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Completed,
    Failed,
    #[default]
    Unavailable,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }

    /// Fold several tool statuses into one: any failure wins, then any completion.
    pub fn fold(statuses: &[ToolStatus]) -> ToolStatus {
        if statuses.contains(&ToolStatus::Failed) {
            ToolStatus::Failed
        } else if statuses.contains(&ToolStatus::Completed) {
            ToolStatus::Completed
        } else {
            ToolStatus::Unavailable
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    #[serde(default)]
    pub manifests: Vec<ManifestSummary>,
    #[serde(default)]
    pub vulnerability_scan_status: ToolStatus,
    #[serde(default)]
    pub vulnerability_findings: Vec<DependencyFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerToolRun {
    pub tool: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoProfile {
    pub repo_name: String,
    #[serde(default)]
    pub languages_detected: Vec<String>,
    #[serde(default)]
    pub frameworks_detected: Vec<String>,
    #[serde(default)]
    pub architecture_hints: Vec<String>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub manifests: Vec<String>,
}

/// Everything the scanner learned about a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerOutput {
    pub schema_version: String,
    pub run_id: String,
    pub repo_profile: RepoProfile,
    pub scan_stats: ScanStats,
    #[serde(default)]
    pub folders: Vec<FolderSummary>,
    #[serde(default)]
    pub dependency_summary: DependencySummary,
    #[serde(default)]
    pub evidence_index: Vec<EvidenceItem>,
    #[serde(default)]
    pub scanner_tool_runs: Vec<ScannerToolRun>,
}

impl ScannerOutput {
    /// First evidence item matching any of the given signal types.
    pub fn first_evidence(&self, signals: &[SignalType]) -> Option<&EvidenceItem> {
        self.evidence_index
            .iter()
            .find(|e| signals.contains(&e.signal_type))
    }
}
