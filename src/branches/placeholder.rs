//! Substitute outputs for branches whose collaborator failed every attempt.
//!
//! Each carries exactly one `failed` finding so the roadmap join always gets a
//! structurally valid input. The reason should already be redacted.

use super::finding_id;
use crate::schema::{
    ArchitectureOutput, ArchitectureType, Finding, FindingCategory, FindingStatus,
    PerformanceOutput, SecurityOutput, Severity,
};

struct FailedFinding {
    category: FindingCategory,
    title: &'static str,
    severity: Severity,
    symptom: &'static str,
    recommendation: &'static str,
}

impl FailedFinding {
    fn build(self, run_id: &str, reason: &str) -> Finding {
        Finding {
            id: finding_id(self.category.as_str(), run_id, "failed"),
            category: self.category,
            title: self.title.to_string(),
            description: reason.to_string(),
            severity: self.severity,
            status: FindingStatus::Failed,
            confidence: 0.0,
            symptoms: vec![self.symptom.to_string()],
            recommendation: self.recommendation.to_string(),
            evidence: vec![],
        }
    }
}

pub fn failed_architecture_output(
    run_id: &str,
    schema_version: &str,
    reason: &str,
) -> ArchitectureOutput {
    let finding = FailedFinding {
        category: FindingCategory::Architecture,
        title: "Architecture branch execution failed",
        severity: Severity::Medium,
        symptom: "Architecture analysis could not complete",
        recommendation: "Review branch execution logs and rerun.",
    }
    .build(run_id, reason);
    ArchitectureOutput {
        schema_version: schema_version.to_string(),
        run_id: run_id.to_string(),
        architecture_type: ArchitectureType::Unknown,
        module_boundaries: vec![],
        runtime_flow_summary: format!("Architecture branch failed: {}", reason),
        findings: vec![finding],
    }
}

pub fn failed_security_output(run_id: &str, schema_version: &str, reason: &str) -> SecurityOutput {
    let finding = FailedFinding {
        category: FindingCategory::Security,
        title: "Security branch execution failed",
        severity: Severity::High,
        symptom: "Security analysis unavailable",
        recommendation: "Inspect branch execution failure and rerun security stage.",
    }
    .build(run_id, reason);
    SecurityOutput {
        schema_version: schema_version.to_string(),
        run_id: run_id.to_string(),
        findings: vec![finding],
        top_security_risks: vec![],
    }
}

pub fn failed_performance_output(
    run_id: &str,
    schema_version: &str,
    reason: &str,
) -> PerformanceOutput {
    let finding = FailedFinding {
        category: FindingCategory::Performance,
        title: "Performance branch execution failed",
        severity: Severity::Medium,
        symptom: "Performance branch unavailable",
        recommendation: "Inspect branch execution failure and rerun performance stage.",
    }
    .build(run_id, reason);
    PerformanceOutput {
        schema_version: schema_version.to_string(),
        run_id: run_id.to_string(),
        findings: vec![finding],
        top_performance_risks: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BranchReport;

    #[test]
    fn test_placeholders_have_fixed_shape() {
        let arch = failed_architecture_output("run-1", "1.0.0", "timeout");
        let sec = failed_security_output("run-1", "1.0.0", "timeout");
        let perf = failed_performance_output("run-1", "1.0.0", "timeout");

        for (finding, severity) in [
            (&arch.findings[0], Severity::Medium),
            (&sec.findings[0], Severity::High),
            (&perf.findings[0], Severity::Medium),
        ] {
            assert_eq!(finding.status, FindingStatus::Failed);
            assert_eq!(finding.confidence, 0.0);
            assert_eq!(finding.severity, severity);
            assert_eq!(finding.description, "timeout");
        }
        assert_eq!(arch.findings.len(), 1);
        assert_eq!(arch.architecture_type, ArchitectureType::Unknown);
        assert!(arch.validate().is_ok());
        assert!(sec.validate().is_ok());
        assert!(perf.validate().is_ok());
    }

    #[test]
    fn test_placeholder_ids_are_stable_per_run() {
        let a = failed_security_output("run-1", "1.0.0", "first");
        let b = failed_security_output("run-1", "1.0.0", "second");
        let c = failed_security_output("run-2", "1.0.0", "first");
        assert_eq!(a.findings[0].id, b.findings[0].id);
        assert_ne!(a.findings[0].id, c.findings[0].id);
    }
}
