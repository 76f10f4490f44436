//! Markdown report with a fixed section order.

use std::fmt::Write as _;

use super::{ArtifactInputs, ToolingStatus, truncate_detail};
use crate::schema::{BranchReport, Finding, FindingStatus, RoadmapItem};

const SUMMARY_TABLE_ROWS: usize = 10;

pub fn build_report(inputs: &ArtifactInputs<'_>) -> String {
    let scanner = inputs.scanner;
    let profile = &scanner.repo_profile;
    let architecture = inputs.architecture.as_ref();

    let combined: Vec<&Finding> = architecture
        .findings()
        .iter()
        .chain(inputs.security.findings())
        .chain(inputs.performance.findings())
        .collect();

    let mut out = String::new();
    out.push_str("# Repository Analysis Report\n\n");

    out.push_str("## Analysis Stage Status\n");
    for (stage, status) in inputs.analysis_status.entries() {
        let _ = writeln!(out, "- `{}`: `{}`", stage, status.as_str());
    }

    out.push_str("\n## Scanner Tooling Status\n");
    out.push_str(&tooling_lines(inputs));

    out.push_str("\n## Repository Overview\n");
    let _ = writeln!(out, "- Repository: `{}`", profile.repo_name);
    let _ = writeln!(
        out,
        "- Languages detected: {}",
        join_or(&profile.languages_detected, "Unknown")
    );
    let _ = writeln!(
        out,
        "- Frameworks detected: {}",
        join_or(&profile.frameworks_detected, "Unknown")
    );
    let _ = writeln!(out, "- Entry points: {}", join_or(&profile.entry_points, "Not detected"));
    let _ = writeln!(
        out,
        "- Dependency manifests: {}",
        join_or(&profile.manifests, "Not detected")
    );
    let _ = writeln!(out, "- Files scanned: {}", scanner.scan_stats.files_scanned);
    let _ = writeln!(out, "- Files skipped: {}", scanner.scan_stats.files_skipped);

    out.push_str("\n## Architecture Summary\n");
    let _ = writeln!(out, "- Architecture type: `{}`", architecture.architecture_type.as_str());
    let _ = writeln!(out, "- Runtime flow: {}", architecture.runtime_flow_summary);

    out.push_str("\n## Key Components / Modules\n");
    if architecture.module_boundaries.is_empty() {
        out.push_str("- No module boundaries detected.\n");
    }
    for module in &architecture.module_boundaries {
        let _ = writeln!(
            out,
            "- **{}**: {} (`{}`)",
            module.name,
            module.responsibility,
            module.paths.join(", ")
        );
    }

    out.push_str("\n## Security Risks\n");
    out.push_str(&finding_lines(inputs.security.findings()));

    out.push_str("\n## Performance & Scalability Risks\n");
    out.push_str(&finding_lines(inputs.performance.findings()));

    out.push_str("\n## Roadmap / Improvement Plan\n");
    out.push_str(&roadmap_lines(&inputs.roadmap));

    out.push_str("\n## Summary Table (Top 10 issues)\n");
    out.push_str("| # | Category | Severity | Issue | Status |\n");
    out.push_str("|---|---|---|---|---|\n");
    let top = top_findings(&combined);
    if top.is_empty() {
        out.push_str("| 1 | architecture | Low | No actionable findings | insufficient_evidence |\n");
    }
    for (idx, finding) in top.iter().take(SUMMARY_TABLE_ROWS).enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            idx + 1,
            finding.category,
            finding.severity,
            finding.title,
            render_status(finding.status)
        );
    }
    out
}

fn join_or(values: &[String], fallback: &str) -> String {
    if values.is_empty() {
        fallback.to_string()
    } else {
        values.join(", ")
    }
}

fn tooling_lines(inputs: &ArtifactInputs<'_>) -> String {
    let mut runs: Vec<_> = inputs.scanner.scanner_tool_runs.iter().collect();
    if runs.is_empty() {
        return "- No scanner tool executions recorded.\n".to_string();
    }
    runs.sort_by(|a, b| a.tool.cmp(&b.tool));

    let mut out = String::new();
    for run in runs {
        let status = ToolingStatus::from(run.status);
        let mut meta = Vec::new();
        if let Some(code) = run.exit_code {
            meta.push(format!("exit_code={}", code));
        }
        if let Some(details) = run.details.as_deref().filter(|d| !d.is_empty()) {
            meta.push(format!("details={}", truncate_detail(details)));
        }
        let suffix = if meta.is_empty() {
            String::new()
        } else {
            format!(" ({})", meta.join("; "))
        };
        let _ = writeln!(out, "- `{}`: `{}`{}", run.tool, status.as_str(), suffix);
    }
    out
}

/// Drops findings with nothing to act on, then orders by
/// `(severity rank, 1 - confidence, title)`.
fn top_findings<'a>(findings: &[&'a Finding]) -> Vec<&'a Finding> {
    let mut kept: Vec<&Finding> = findings
        .iter()
        .copied()
        .filter(|f| {
            !matches!(
                f.status,
                FindingStatus::NotApplicable | FindingStatus::InsufficientEvidence
            )
        })
        .collect();
    kept.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| (1.0 - a.confidence).total_cmp(&(1.0 - b.confidence)))
            .then_with(|| a.title.cmp(&b.title))
    });
    kept
}

fn finding_lines(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "- No findings.\n".to_string();
    }
    let refs: Vec<&Finding> = findings.iter().collect();
    let mut out = String::new();
    for finding in top_findings(&refs) {
        let _ = writeln!(
            out,
            "- **{}** `{}` - {}: {}",
            finding.severity,
            render_status(finding.status),
            finding.title,
            finding.recommendation
        );
    }
    out
}

fn roadmap_lines(items: &[RoadmapItem]) -> String {
    if items.is_empty() {
        return "- No roadmap items generated.\n".to_string();
    }
    let mut ordered: Vec<&RoadmapItem> = items.iter().collect();
    ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.task.cmp(&b.task)));

    let mut out = String::new();
    for item in ordered {
        let _ = writeln!(
            out,
            "- **{}** ({}) - {} [impact: {}; effort: {}; risk: {}; justification: {}]",
            item.priority,
            item.timeline_bucket,
            item.task,
            item.impact,
            item.effort,
            item.risk,
            item.justification
        );
    }
    out
}

fn render_status(status: FindingStatus) -> &'static str {
    match status {
        FindingStatus::Failed => "analysis_finding_failed",
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{BranchStatus, FlowState, NodeId};
    use crate::schema::{ScannerOutput, ScannerToolRun, ToolStatus};

    fn state() -> FlowState {
        let mut state = FlowState::new("run-r");
        let mut scanner = ScannerOutput::default();
        scanner.repo_profile.repo_name = "demo".into();
        scanner.scanner_tool_runs = vec![ScannerToolRun {
            tool: "semgrep".into(),
            status: ToolStatus::Failed,
            exit_code: Some(2),
            details: Some("bad\nconfig".into()),
        }];
        state.scanner_output = Some(scanner);
        state.set_status(NodeId::Scanner, BranchStatus::Completed);
        state.set_status(NodeId::Roadmap, BranchStatus::Degraded);
        state
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let state = state();
        let report = build_report(&ArtifactInputs::from_state(&state).unwrap());
        let headings: Vec<&str> = report.lines().filter(|l| l.starts_with('#')).collect();
        assert_eq!(
            headings,
            [
                "# Repository Analysis Report",
                "## Analysis Stage Status",
                "## Scanner Tooling Status",
                "## Repository Overview",
                "## Architecture Summary",
                "## Key Components / Modules",
                "## Security Risks",
                "## Performance & Scalability Risks",
                "## Roadmap / Improvement Plan",
                "## Summary Table (Top 10 issues)",
            ]
        );
    }

    #[test]
    fn test_placeholders_render_as_failed_findings() {
        let state = state();
        let report = build_report(&ArtifactInputs::from_state(&state).unwrap());
        assert!(report.contains("- `roadmap`: `degraded`"));
        assert!(report.contains(
            "- `semgrep`: `tool_execution_failed` (exit_code=2; details=bad config)"
        ));
        assert!(report.contains("`analysis_finding_failed` - Security branch execution failed"));
        assert!(report.contains("- No roadmap items generated."));
        assert!(report.contains("- Languages detected: Unknown"));
    }
}
