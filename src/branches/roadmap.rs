//! Roadmap synthesis for the join stage.

use crate::schema::{
    ArchitectureOutput, BranchReport, Finding, PerformanceOutput, RoadmapItem, SecurityOutput,
};

const MAX_ROADMAP_ITEMS: usize = 10;

/// Turn branch findings into at most ten prioritised roadmap items.
///
/// Findings are concatenated architecture, security, performance. Only
/// confirmed and suspected findings are kept. The sort key is
/// `(severity rank, 1 - confidence)` and the sort is stable, so equal keys keep
/// concatenation order.
pub fn synthesize_roadmap(
    architecture: &ArchitectureOutput,
    security: &SecurityOutput,
    performance: &PerformanceOutput,
) -> Vec<RoadmapItem> {
    let mut actionable: Vec<&Finding> = architecture
        .findings()
        .iter()
        .chain(security.findings())
        .chain(performance.findings())
        .filter(|f| f.status.is_actionable())
        .collect();

    actionable.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| (1.0 - a.confidence).total_cmp(&(1.0 - b.confidence)))
    });

    actionable
        .into_iter()
        .take(MAX_ROADMAP_ITEMS)
        .map(|finding| {
            let priority = finding.severity.priority();
            RoadmapItem {
                priority,
                task: finding.recommendation.clone(),
                impact: format!(
                    "Mitigates {} risk: {}",
                    finding.category.as_str(),
                    finding.title
                ),
                effort: "Medium".to_string(),
                risk: finding.severity.as_str().to_string(),
                justification: finding.description.clone(),
                timeline_bucket: priority.timeline(),
                depends_on: vec![finding.id.clone()],
            }
        })
        .collect()
}
