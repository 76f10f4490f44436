//! Conversion of heuristic results and tool JSON into evidence items.

use serde_json::Value;

use crate::schema::{
    DependencyFinding, DependencySeverity, EvidenceItem, EvidenceSource, SignalType,
};
use crate::util::sha256_hex;

/// Build an evidence item whose id is derived from its content.
pub fn make_evidence(
    file: &str,
    line_start: u32,
    line_end: u32,
    source: EvidenceSource,
    signal_type: SignalType,
    summary: &str,
    confidence: f64,
) -> EvidenceItem {
    let basis = format!(
        "{}:{}:{}:{}:{}:{}",
        file,
        line_start,
        line_end,
        source.as_str(),
        signal_type.as_str(),
        summary
    );
    let digest = sha256_hex(&basis);
    EvidenceItem {
        id: digest[..16].to_string(),
        file: file.to_string(),
        line_start,
        line_end,
        snippet_hash: digest,
        source,
        signal_type,
        summary: summary.to_string(),
        confidence,
    }
}

/// Evidence for detected entry points followed by manifests.
pub fn heuristic_evidence(entry_points: &[String], manifests: &[String]) -> Vec<EvidenceItem> {
    let entries = entry_points.iter().map(|entry| {
        make_evidence(
            entry,
            1,
            1,
            EvidenceSource::ScannerHeuristic,
            SignalType::Entrypoint,
            &format!("Entrypoint candidate: {}", entry),
            0.75,
        )
    });
    let manifests = manifests.iter().map(|manifest| {
        make_evidence(
            manifest,
            1,
            1,
            EvidenceSource::ScannerHeuristic,
            SignalType::Dependency,
            &format!("Dependency manifest detected: {}", manifest),
            0.7,
        )
    });
    entries.chain(manifests).collect()
}

fn results(payload: &Value) -> impl Iterator<Item = &Value> {
    payload
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn line_at(value: Option<&Value>, default: u32) -> u32 {
    value
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(default)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn normalize_semgrep(payload: &Value) -> Vec<EvidenceItem> {
    results(payload)
        .filter_map(|item| {
            let file = non_empty_str(item.get("path"))?;
            let start = line_at(item.pointer("/start/line"), 1);
            let end = line_at(item.pointer("/end/line"), start);
            let summary = non_empty_str(item.pointer("/extra/message"))
                .or_else(|| non_empty_str(item.get("check_id")))
                .unwrap_or("Semgrep finding");
            Some(make_evidence(
                file,
                start,
                end,
                EvidenceSource::Semgrep,
                SignalType::Vuln,
                summary,
                0.9,
            ))
        })
        .collect()
}

pub fn normalize_bandit(payload: &Value) -> Vec<EvidenceItem> {
    results(payload)
        .filter_map(|item| {
            let file = non_empty_str(item.get("filename"))?;
            let line = line_at(item.get("line_number"), 1);
            let summary = non_empty_str(item.get("issue_text"))
                .or_else(|| non_empty_str(item.get("test_name")))
                .unwrap_or("Bandit finding");
            Some(make_evidence(
                file,
                line,
                line,
                EvidenceSource::Bandit,
                SignalType::Vuln,
                summary,
                0.85,
            ))
        })
        .collect()
}

/// OSV results as evidence plus dependency findings.
///
/// Packages without a name are skipped. The fixed version is the first
/// `fixed` event of the first range of the first affected entry.
pub fn normalize_osv(payload: &Value) -> (Vec<EvidenceItem>, Vec<DependencyFinding>) {
    let mut evidence = Vec::new();
    let mut findings = Vec::new();

    for result in results(payload) {
        let source_file = result
            .pointer("/source/path")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let packages = result.get("packages").and_then(Value::as_array);
        for package in packages.into_iter().flatten() {
            let Some(name) = non_empty_str(package.pointer("/package/name")) else {
                continue;
            };
            let ecosystem = package
                .pointer("/package/ecosystem")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let version = package
                .pointer("/package/version")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let vulns = package.get("vulnerabilities").and_then(Value::as_array);
            for vuln in vulns.into_iter().flatten() {
                let vuln_id = vuln.get("id").and_then(Value::as_str).unwrap_or("unknown");
                let aliases = vuln
                    .get("aliases")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let severity = DependencySeverity::parse_lenient(
                    vuln.pointer("/database_specific/severity")
                        .and_then(Value::as_str),
                );
                let fixed_version = vuln
                    .pointer("/affected/0/ranges/0/events")
                    .and_then(Value::as_array)
                    .and_then(|events| {
                        events
                            .iter()
                            .find_map(|e| e.get("fixed").and_then(Value::as_str))
                    })
                    .map(str::to_string);

                findings.push(DependencyFinding {
                    package: name.to_string(),
                    ecosystem: ecosystem.to_string(),
                    version: version.to_string(),
                    vulnerability_id: vuln_id.to_string(),
                    aliases,
                    severity,
                    fixed_version,
                    source_file: source_file.to_string(),
                });
                evidence.push(make_evidence(
                    source_file,
                    1,
                    1,
                    EvidenceSource::Osv,
                    SignalType::Dependency,
                    &format!("{} vulnerable to {}", name, vuln_id),
                    0.9,
                ));
            }
        }
    }
    (evidence, findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evidence_id_is_content_addressed() {
        let a = make_evidence("a.py", 1, 2, EvidenceSource::Semgrep, SignalType::Vuln, "x", 0.9);
        let b = make_evidence("a.py", 1, 2, EvidenceSource::Semgrep, SignalType::Vuln, "x", 0.1);
        let c = make_evidence("a.py", 1, 3, EvidenceSource::Semgrep, SignalType::Vuln, "x", 0.9);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 16);
        assert_eq!(a.snippet_hash.len(), 64);
        assert!(a.snippet_hash.starts_with(&a.id));
        assert_eq!(a.snippet_hash, sha256_hex("a.py:1:2:semgrep:vuln:x"));
    }

    #[test]
    fn test_heuristic_evidence_order_and_shape() {
        let evidence = heuristic_evidence(&["main.py".into()], &["package.json".into()]);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].signal_type, SignalType::Entrypoint);
        assert_eq!(evidence[0].summary, "Entrypoint candidate: main.py");
        assert_eq!(evidence[0].confidence, 0.75);
        assert_eq!(evidence[1].signal_type, SignalType::Dependency);
        assert_eq!(evidence[1].confidence, 0.7);
    }

    #[test]
    fn test_normalize_semgrep_defaults() {
        let payload = json!({"results": [
            {"path": "app.py", "start": {"line": 4}, "end": {"line": 6}, "extra": {"message": "SQL injection"}},
            {"path": "b.py", "start": {"line": 9}, "check_id": "python.eval"},
            {"start": {"line": 1}}
        ]});
        let evidence = normalize_semgrep(&payload);
        assert_eq!(evidence.len(), 2);
        assert_eq!((evidence[0].line_start, evidence[0].line_end), (4, 6));
        assert_eq!(evidence[0].summary, "SQL injection");
        assert_eq!((evidence[1].line_start, evidence[1].line_end), (9, 9));
        assert_eq!(evidence[1].summary, "python.eval");
    }

    #[test]
    fn test_normalize_bandit() {
        let payload = json!({"results": [
            {"filename": "x.py", "line_number": 3, "test_name": "B105"}
        ]});
        let evidence = normalize_bandit(&payload);
        assert_eq!(evidence[0].summary, "B105");
        assert_eq!(evidence[0].source, EvidenceSource::Bandit);
        assert_eq!(evidence[0].confidence, 0.85);
        assert!(normalize_bandit(&json!({})).is_empty());
    }

    #[test]
    fn test_normalize_osv() {
        let payload = json!({"results": [{
            "source": {"path": "requirements.txt"},
            "packages": [
                {
                    "package": {"name": "jinja2", "ecosystem": "PyPI", "version": "2.10"},
                    "vulnerabilities": [{
                        "id": "GHSA-1",
                        "aliases": ["CVE-2020-1"],
                        "database_specific": {"severity": "MODERATE"},
                        "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "2.11.3"}]}]}]
                    }]
                },
                {"package": {"ecosystem": "PyPI"}, "vulnerabilities": [{"id": "GHSA-2"}]}
            ]
        }]});
        let (evidence, findings) = normalize_osv(&payload);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.package, "jinja2");
        assert_eq!(finding.severity, DependencySeverity::Medium);
        assert_eq!(finding.fixed_version.as_deref(), Some("2.11.3"));
        assert_eq!(finding.aliases, ["CVE-2020-1"]);
        assert_eq!(evidence[0].summary, "jinja2 vulnerable to GHSA-1");
        assert_eq!(evidence[0].file, "requirements.txt");
    }
}
