//! Branch outputs: architecture, security, and performance.
//!
//! Every branch produces a list of [`Finding`]s plus branch-specific context.
//! The [`BranchReport`] trait gives the roadmap synthesis uniform access to the
//! findings regardless of which branch produced them.

use serde::{Deserialize, Serialize};

use super::enums::{ArchitectureType, FindingCategory, FindingStatus, Severity};

/// File location backing a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingEvidence {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// A single analysis finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub category: FindingCategory,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: FindingStatus,
    pub confidence: f64,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub recommendation: String,
    #[serde(default)]
    pub evidence: Vec<FindingEvidence>,
}

impl Finding {
    /// Check field-level invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("finding id must not be empty".to_string());
        }
        if self.title.trim().is_empty() || self.recommendation.trim().is_empty() {
            return Err(format!("finding {} is missing title or recommendation", self.id));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "finding {} confidence {} outside [0, 1]",
                self.id, self.confidence
            ));
        }
        if self.status == FindingStatus::Confirmed && self.evidence.is_empty() {
            return Err(format!("confirmed finding {} must include evidence", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBoundary {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<String>,
    pub responsibility: String,
}

/// Summary risk line shown in the report and summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskItem {
    pub issue: String,
    pub severity: Severity,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureOutput {
    pub schema_version: String,
    pub run_id: String,
    pub architecture_type: ArchitectureType,
    #[serde(default)]
    pub module_boundaries: Vec<ModuleBoundary>,
    pub runtime_flow_summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityOutput {
    pub schema_version: String,
    pub run_id: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub top_security_risks: Vec<RiskItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceOutput {
    pub schema_version: String,
    pub run_id: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub top_performance_risks: Vec<RiskItem>,
}

/// Common view over the three branch outputs.
pub trait BranchReport {
    const CATEGORY: FindingCategory;

    fn findings(&self) -> &[Finding];

    /// Overwrite the run identity stamped on the output.
    fn stamp(&mut self, run_id: &str, schema_version: &str);

    /// Validate every finding and that all findings belong to this branch.
    fn validate(&self) -> Result<(), String> {
        for finding in self.findings() {
            finding.validate()?;
            if finding.category != Self::CATEGORY {
                return Err(format!(
                    "{} output must only contain {} findings (found {})",
                    Self::CATEGORY,
                    Self::CATEGORY,
                    finding.category
                ));
            }
        }
        Ok(())
    }
}

impl BranchReport for ArchitectureOutput {
    const CATEGORY: FindingCategory = FindingCategory::Architecture;

    fn findings(&self) -> &[Finding] {
        &self.findings
    }

    fn stamp(&mut self, run_id: &str, schema_version: &str) {
        self.run_id = run_id.to_string();
        self.schema_version = schema_version.to_string();
    }
}

impl BranchReport for SecurityOutput {
    const CATEGORY: FindingCategory = FindingCategory::Security;

    fn findings(&self) -> &[Finding] {
        &self.findings
    }

    fn stamp(&mut self, run_id: &str, schema_version: &str) {
        self.run_id = run_id.to_string();
        self.schema_version = schema_version.to_string();
    }
}

impl BranchReport for PerformanceOutput {
    const CATEGORY: FindingCategory = FindingCategory::Performance;

    fn findings(&self) -> &[Finding] {
        &self.findings
    }

    fn stamp(&mut self, run_id: &str, schema_version: &str) {
        self.run_id = run_id.to_string();
        self.schema_version = schema_version.to_string();
    }
}
