//! Canonical data contracts.
//!
//! These types cross every boundary in the system: the request that starts a
//! run, the scanner output shared by all branches, the per-branch findings,
//! and the roadmap. They are persisted verbatim inside flow checkpoints, so
//! their serde representation is the on-disk format.

pub mod analysis;
pub mod enums;
pub mod output;
pub mod request;
pub mod scanner;

pub use analysis::{
    ArchitectureOutput, BranchReport, Finding, FindingEvidence, ModuleBoundary, PerformanceOutput,
    RiskItem, SecurityOutput,
};
pub use enums::{
    ArchitectureType, FindingCategory, FindingStatus, Priority, ProviderKind, Severity,
    TimelineBucket,
};
pub use output::{RoadmapItem, RoadmapOutput};
pub use request::{
    AnalyzeInput, AnalyzeRequest, ExecutionConfig, FeatureFlags, ProviderConfig, RequestTimeouts,
    SourceType,
};
pub use scanner::{
    DependencyFinding, DependencySeverity, DependencySummary, EvidenceItem, EvidenceSource,
    FolderSummary, ManifestSummary, RepoProfile, ScanStats, ScannerOutput, ScannerToolRun,
    SignalType, SkipReasons, ToolStatus,
};

/// Version stamped on every payload this build produces.
pub const SCHEMA_VERSION: &str = "1.0.0";
