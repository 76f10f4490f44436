//! Deterministic, evidence-driven branch analysis. No network, no model.

use anyhow::Result;
use async_trait::async_trait;

use super::{BranchExecutor, finding_evidence, finding_id};
use crate::schema::{
    ArchitectureOutput, ArchitectureType, EvidenceItem, Finding, FindingCategory, FindingStatus,
    ModuleBoundary, PerformanceOutput, RiskItem, ScannerOutput, SecurityOutput, Severity,
    SignalType,
};

const MAX_BRANCH_FINDINGS: usize = 10;
const MAX_TOP_RISKS: usize = 5;

const PERF_KEYWORDS: &[&str] = &[
    "n+1",
    "synchronous",
    "sync",
    "pagination",
    "cache",
    "payload",
    "latency",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBranchExecutor;

impl HeuristicBranchExecutor {
    pub fn architecture(&self, scanner: &ScannerOutput) -> ArchitectureOutput {
        let module_boundaries = scanner
            .folders
            .iter()
            .take(10)
            .map(|folder| ModuleBoundary {
                name: folder.path.clone(),
                paths: vec![folder.path.clone()],
                responsibility: folder.purpose_guess.clone(),
            })
            .collect();

        let finding = match scanner.first_evidence(&[
            SignalType::Entrypoint,
            SignalType::Route,
            SignalType::Config,
        ]) {
            Some(evidence) => Finding {
                id: finding_id("architecture", &evidence.file, &evidence.summary),
                category: FindingCategory::Architecture,
                title: "Detected runtime entrypoint and module layering".to_string(),
                description: "Repository layout indicates a bounded runtime flow with clear \
                              entrypoint/module segmentation."
                    .to_string(),
                severity: Severity::Low,
                status: FindingStatus::Confirmed,
                confidence: 0.75,
                symptoms: vec!["Module boundaries are inferable from folder structure".to_string()],
                recommendation: "Document runtime boundaries in architecture docs.".to_string(),
                evidence: vec![finding_evidence(evidence)],
            },
            None => Finding {
                id: finding_id("architecture", &scanner.repo_profile.repo_name, "unknown"),
                category: FindingCategory::Architecture,
                title: "Insufficient architecture evidence".to_string(),
                description: "Scanner produced limited architecture evidence for confident \
                              pattern classification."
                    .to_string(),
                severity: Severity::Medium,
                status: FindingStatus::InsufficientEvidence,
                confidence: 0.35,
                symptoms: vec!["Architecture type may be under-specified".to_string()],
                recommendation: "Increase scanner depth for routing and service boundaries."
                    .to_string(),
                evidence: vec![],
            },
        };

        ArchitectureOutput {
            schema_version: scanner.schema_version.clone(),
            run_id: scanner.run_id.clone(),
            architecture_type: infer_architecture_type(scanner),
            module_boundaries,
            runtime_flow_summary: runtime_flow_summary(scanner),
            findings: vec![finding],
        }
    }

    pub fn security(&self, scanner: &ScannerOutput) -> SecurityOutput {
        let mut findings = Vec::new();
        let mut top_risks = Vec::new();

        let security_evidence = scanner.evidence_index.iter().filter(|e| {
            e.source.is_security_tool()
                || matches!(
                    e.signal_type,
                    SignalType::Secret | SignalType::Vuln | SignalType::Dependency
                )
        });

        for evidence in security_evidence.take(MAX_BRANCH_FINDINGS) {
            let finding = Finding {
                id: finding_id("security", &evidence.file, &evidence.summary),
                category: FindingCategory::Security,
                title: format!("Security signal from {}", evidence.source.as_str()),
                description: evidence.summary.clone(),
                severity: security_severity(evidence),
                status: FindingStatus::Confirmed,
                confidence: evidence.confidence.clamp(0.6, 0.95),
                symptoms: vec!["Potential exploit surface detected in static evidence".to_string()],
                recommendation: security_recommendation(evidence).to_string(),
                evidence: vec![finding_evidence(evidence)],
            };
            top_risks.push(RiskItem {
                issue: finding.title.clone(),
                severity: finding.severity,
                file: evidence.file.clone(),
            });
            findings.push(finding);
        }

        if findings.is_empty() {
            findings.push(Finding {
                id: finding_id("security", &scanner.repo_profile.repo_name, "none"),
                category: FindingCategory::Security,
                title: "No deterministic security evidence found".to_string(),
                description: "No semgrep/bandit/osv/secret evidence was available for confirmation."
                    .to_string(),
                severity: Severity::Low,
                status: FindingStatus::InsufficientEvidence,
                confidence: 0.3,
                symptoms: vec!["Security branch could not confirm concrete risks".to_string()],
                recommendation: "Enable Semgrep/Bandit/OSV and rescan for higher confidence."
                    .to_string(),
                evidence: vec![],
            });
        }

        top_risks.truncate(MAX_TOP_RISKS);
        SecurityOutput {
            schema_version: scanner.schema_version.clone(),
            run_id: scanner.run_id.clone(),
            findings,
            top_security_risks: top_risks,
        }
    }

    pub fn performance(&self, scanner: &ScannerOutput) -> PerformanceOutput {
        let mut findings = Vec::new();
        let mut top_risks = Vec::new();

        let perf_evidence = scanner.evidence_index.iter().filter(|e| {
            e.signal_type == SignalType::PerfHotspot || contains_perf_signal(&e.summary)
        });

        for evidence in perf_evidence.take(MAX_BRANCH_FINDINGS) {
            let finding = Finding {
                id: finding_id("performance", &evidence.file, &evidence.summary),
                category: FindingCategory::Performance,
                title: "Potential performance/scalability signal detected".to_string(),
                description: evidence.summary.clone(),
                severity: Severity::Medium,
                status: FindingStatus::Confirmed,
                confidence: evidence.confidence.clamp(0.55, 0.9),
                symptoms: vec!["Potential latency or throughput degradation".to_string()],
                recommendation: "Review the identified hotspot and add batching/caching/pagination as needed."
                    .to_string(),
                evidence: vec![finding_evidence(evidence)],
            };
            top_risks.push(RiskItem {
                issue: finding.title.clone(),
                severity: finding.severity,
                file: evidence.file.clone(),
            });
            findings.push(finding);
        }

        if findings.is_empty() {
            match scanner.first_evidence(&[SignalType::Route, SignalType::Entrypoint]) {
                Some(route) => {
                    findings.push(Finding {
                        id: finding_id("performance", &route.file, "api-pagination"),
                        category: FindingCategory::Performance,
                        title: "API pagination and caching require review".to_string(),
                        description: "API surface detected; pagination/caching guarantees are not yet evidenced."
                            .to_string(),
                        severity: Severity::Medium,
                        status: FindingStatus::Suspected,
                        confidence: 0.45,
                        symptoms: vec![
                            "Large payload and latency risk on list endpoints".to_string(),
                        ],
                        recommendation: "Audit list endpoints for pagination and response-size controls."
                            .to_string(),
                        evidence: vec![finding_evidence(route)],
                    });
                    top_risks.push(RiskItem {
                        issue: "Review pagination/caching on API routes".to_string(),
                        severity: Severity::Medium,
                        file: route.file.clone(),
                    });
                }
                None => findings.push(Finding {
                    id: finding_id("performance", &scanner.repo_profile.repo_name, "none"),
                    category: FindingCategory::Performance,
                    title: "Insufficient performance evidence".to_string(),
                    description: "No deterministic performance hotspots were detected.".to_string(),
                    severity: Severity::Low,
                    status: FindingStatus::InsufficientEvidence,
                    confidence: 0.3,
                    symptoms: vec![
                        "No clear bottlenecks identified from current evidence".to_string(),
                    ],
                    recommendation: "Expand scanner heuristics for query and I/O hotspot detection."
                        .to_string(),
                    evidence: vec![],
                }),
            }
        }

        top_risks.truncate(MAX_TOP_RISKS);
        PerformanceOutput {
            schema_version: scanner.schema_version.clone(),
            run_id: scanner.run_id.clone(),
            findings,
            top_performance_risks: top_risks,
        }
    }
}

#[async_trait]
impl BranchExecutor for HeuristicBranchExecutor {
    async fn run_architecture(&self, scanner: &ScannerOutput) -> Result<ArchitectureOutput> {
        Ok(self.architecture(scanner))
    }

    async fn run_security(&self, scanner: &ScannerOutput) -> Result<SecurityOutput> {
        Ok(self.security(scanner))
    }

    async fn run_performance(&self, scanner: &ScannerOutput) -> Result<PerformanceOutput> {
        Ok(self.performance(scanner))
    }
}

fn infer_architecture_type(scanner: &ScannerOutput) -> ArchitectureType {
    let hints: Vec<String> = scanner
        .repo_profile
        .architecture_hints
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    if hints.iter().any(|h| h.contains("microservice")) {
        ArchitectureType::Microservices
    } else if hints.iter().any(|h| h.contains("modular")) {
        ArchitectureType::ModularMonolith
    } else if !scanner.repo_profile.entry_points.is_empty() {
        ArchitectureType::Monolith
    } else {
        ArchitectureType::Unknown
    }
}

fn runtime_flow_summary(scanner: &ScannerOutput) -> String {
    let entry_points = &scanner.repo_profile.entry_points;
    if entry_points.is_empty() {
        return "Runtime flow is uncertain due to limited entrypoint evidence.".to_string();
    }
    let shown: Vec<&str> = entry_points.iter().take(3).map(String::as_str).collect();
    format!(
        "Runtime likely starts from {}, then routes through module boundaries inferred from top-level folders.",
        shown.join(", ")
    )
}

fn security_severity(evidence: &EvidenceItem) -> Severity {
    match evidence.signal_type {
        SignalType::Secret | SignalType::Vuln => Severity::High,
        SignalType::Dependency => Severity::Medium,
        _ => Severity::Low,
    }
}

fn security_recommendation(evidence: &EvidenceItem) -> &'static str {
    match evidence.signal_type {
        SignalType::Secret => "Rotate the secret and move credentials to environment/config vault.",
        SignalType::Dependency => "Upgrade affected dependency and pin a patched version.",
        _ => "Review and remediate the reported vulnerability pattern.",
    }
}

fn contains_perf_signal(summary: &str) -> bool {
    let lowered = summary.to_lowercase();
    PERF_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        BranchReport, EvidenceSource, FolderSummary, RepoProfile, ScanStats, SCHEMA_VERSION,
    };

    fn evidence(
        file: &str,
        source: EvidenceSource,
        signal: SignalType,
        summary: &str,
    ) -> EvidenceItem {
        EvidenceItem {
            id: format!("{}-{}", file, signal.as_str()),
            file: file.to_string(),
            line_start: 1,
            line_end: 1,
            snippet_hash: "hash".to_string(),
            source,
            signal_type: signal,
            summary: summary.to_string(),
            confidence: 0.7,
        }
    }

    fn scanner(evidence_index: Vec<EvidenceItem>) -> ScannerOutput {
        ScannerOutput {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: "run-1".to_string(),
            repo_profile: RepoProfile {
                repo_name: "demo".to_string(),
                entry_points: vec!["main.py".to_string()],
                ..Default::default()
            },
            scan_stats: ScanStats::default(),
            folders: vec![FolderSummary {
                path: "api".to_string(),
                purpose_guess: "HTTP/API layer".to_string(),
                confidence: 0.7,
            }],
            dependency_summary: Default::default(),
            evidence_index,
            scanner_tool_runs: vec![],
        }
    }

    #[test]
    fn test_architecture_confirmed_from_entrypoint() {
        let out = HeuristicBranchExecutor.architecture(&scanner(vec![evidence(
            "main.py",
            EvidenceSource::ScannerHeuristic,
            SignalType::Entrypoint,
            "Entrypoint candidate detected",
        )]));
        assert_eq!(out.architecture_type, ArchitectureType::Monolith);
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].status, FindingStatus::Confirmed);
        assert_eq!(out.module_boundaries[0].name, "api");
        assert!(out.runtime_flow_summary.contains("main.py"));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_architecture_without_evidence_is_insufficient() {
        let out = HeuristicBranchExecutor.architecture(&scanner(vec![]));
        assert_eq!(out.findings[0].status, FindingStatus::InsufficientEvidence);
        assert_eq!(out.findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_security_severity_by_signal_and_confidence_clamped() {
        let mut secret = evidence(
            "cfg.py",
            EvidenceSource::Rg,
            SignalType::Secret,
            "Hardcoded token",
        );
        secret.confidence = 0.99;
        let out = HeuristicBranchExecutor.security(&scanner(vec![
            secret,
            evidence("req.txt", EvidenceSource::Osv, SignalType::Dependency, "CVE in requests"),
            evidence("app.py", EvidenceSource::Semgrep, SignalType::Auth, "Weak auth check"),
            evidence("main.py", EvidenceSource::ScannerHeuristic, SignalType::Entrypoint, "entry"),
        ]));
        assert_eq!(out.findings.len(), 3);
        assert_eq!(out.findings[0].severity, Severity::High);
        assert_eq!(out.findings[0].confidence, 0.95);
        assert_eq!(out.findings[1].severity, Severity::Medium);
        assert_eq!(out.findings[2].severity, Severity::Low);
        assert_eq!(out.top_security_risks.len(), 3);
        assert_eq!(out.findings[1].title, "Security signal from osv");
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_security_caps_findings_and_risks() {
        let items = (0..15)
            .map(|i| {
                evidence(
                    &format!("f{i}.py"),
                    EvidenceSource::Bandit,
                    SignalType::Vuln,
                    "issue",
                )
            })
            .collect();
        let out = HeuristicBranchExecutor.security(&scanner(items));
        assert_eq!(out.findings.len(), 10);
        assert_eq!(out.top_security_risks.len(), 5);
    }

    #[test]
    fn test_performance_keyword_match() {
        let out = HeuristicBranchExecutor.performance(&scanner(vec![evidence(
            "db.py",
            EvidenceSource::Rg,
            SignalType::Db,
            "Possible N+1 query in loop",
        )]));
        assert_eq!(out.findings[0].status, FindingStatus::Confirmed);
        assert_eq!(out.findings[0].confidence, 0.7);
    }

    #[test]
    fn test_performance_falls_back_to_route_review() {
        let out = HeuristicBranchExecutor.performance(&scanner(vec![evidence(
            "routes.py",
            EvidenceSource::ScannerHeuristic,
            SignalType::Route,
            "Route table",
        )]));
        assert_eq!(out.findings[0].status, FindingStatus::Suspected);
        assert_eq!(out.top_performance_risks[0].file, "routes.py");

        let out = HeuristicBranchExecutor.performance(&scanner(vec![]));
        assert_eq!(out.findings[0].status, FindingStatus::InsufficientEvidence);
        assert!(out.top_performance_risks.is_empty());
    }

    #[test]
    fn test_outputs_are_deterministic() {
        let input = scanner(vec![evidence("a.py", EvidenceSource::Bandit, SignalType::Vuln, "x")]);
        assert_eq!(
            HeuristicBranchExecutor.security(&input),
            HeuristicBranchExecutor.security(&input)
        );
    }
}
