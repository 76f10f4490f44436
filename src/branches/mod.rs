//! Analysis branches: the evidence-to-finding collaborators behind the
//! architecture, security, and performance nodes.
//!
//! - `heuristic`: deterministic rules over scanner evidence
//! - `budget`: token counting against per-branch context budgets
//! - `model`: delegates to a model CLI and validates its JSON
//! - `placeholder`: substitutes used when a branch fails irrecoverably
//! - `roadmap`: join-stage synthesis of prioritised tasks

pub mod budget;
pub mod heuristic;
pub mod model;
pub mod placeholder;
pub mod roadmap;

use anyhow::Result;
use async_trait::async_trait;

use crate::schema::{
    EvidenceItem, FindingEvidence, PerformanceOutput, ScannerOutput, SecurityOutput,
    ArchitectureOutput,
};
use crate::util::stable_id;

pub use heuristic::HeuristicBranchExecutor;
pub use model::{ModelBranchExecutor, ModelSettings};
pub use placeholder::{
    failed_architecture_output, failed_performance_output, failed_security_output,
};
pub use roadmap::synthesize_roadmap;

/// Produces the three branch outputs from a shared scanner output.
#[async_trait]
pub trait BranchExecutor: Send + Sync {
    async fn run_architecture(&self, scanner: &ScannerOutput) -> Result<ArchitectureOutput>;

    async fn run_security(&self, scanner: &ScannerOutput) -> Result<SecurityOutput>;

    async fn run_performance(&self, scanner: &ScannerOutput) -> Result<PerformanceOutput>;
}

/// Deterministic finding id for `category:file_ref:seed`.
pub(crate) fn finding_id(category: &str, file_ref: &str, seed: &str) -> String {
    stable_id(&[category, file_ref, seed])
}

pub(crate) fn finding_evidence(evidence: &EvidenceItem) -> FindingEvidence {
    FindingEvidence {
        file: evidence.file.clone(),
        line_start: evidence.line_start,
        line_end: evidence.line_end,
        source: evidence.source.as_str().to_string(),
        rule_id: None,
    }
}
