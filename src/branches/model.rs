//! Model-backed branch analysis.
//!
//! Each branch spawns the profile's model CLI, writes a prompt on stdin, and
//! expects a JSON object matching the branch output on stdout. The scanner
//! context is compacted first and then checked against the branch's token
//! budget; an over-budget context fails the attempt before any model call.

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::BranchExecutor;
use super::budget::TokenBudgeter;
use crate::config::{AnalysisSettings, EnvSnapshot, ProviderProfile, TokenBudgets};
use crate::errors::ConfigError;
use crate::schema::{
    ArchitectureOutput, BranchReport, DependencyFinding, DependencySeverity, EvidenceItem,
    PerformanceOutput, ScannerOutput, SecurityOutput,
};
use crate::util::extract_json_object;

const MAX_TOOL_DETAIL_CHARS: usize = 500;

/// Everything the model executor needs, resolved once at construction.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub profile_name: String,
    pub program: String,
    pub args: Vec<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub seed: u64,
    pub max_tokens: u32,
    pub context_window: u32,
    /// `(variable name, value)` injected into the child environment.
    pub api_key: Option<(String, String)>,
    pub analysis: AnalysisSettings,
    pub budgets: TokenBudgets,
}

impl ModelSettings {
    /// Resolve a profile against the startup environment snapshot.
    pub fn from_profile(
        name: &str,
        profile: &ProviderProfile,
        env: &EnvSnapshot,
        analysis: &AnalysisSettings,
        budgets: &TokenBudgets,
    ) -> Result<Self, ConfigError> {
        let (program, args) = profile
            .command
            .split_first()
            .ok_or_else(|| ConfigError::Invalid(format!("provider '{}' has no command", name)))?;

        let api_key = match profile.api_key_env.as_deref() {
            Some(var) => {
                let value = env.get(var).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "provider '{}' requires environment variable {}",
                        name, var
                    ))
                })?;
                Some((var.to_string(), value.to_string()))
            }
            None => None,
        };

        Ok(Self {
            profile_name: name.to_string(),
            program: program.clone(),
            args: args.to_vec(),
            model: profile.model.clone(),
            base_url: profile.base_url.clone(),
            temperature: profile.temperature,
            seed: profile.seed,
            max_tokens: profile.max_tokens,
            context_window: profile.context_window,
            api_key,
            analysis: analysis.clone(),
            budgets: *budgets,
        })
    }
}

struct BranchTask {
    name: &'static str,
    role: &'static str,
    instructions: &'static str,
    output_shape: &'static str,
    budget: fn(&TokenBudgets) -> usize,
}

const ARCHITECTURE_TASK: BranchTask = BranchTask {
    name: "architecture",
    role: "Architecture Analyst",
    budget: |b| b.architecture_context,
    instructions: "Infer the architecture type, module boundaries, and runtime flow from the \
                   scanner evidence. Use only the supplied evidence and cite files.",
    output_shape: r#"{"schema_version": str, "run_id": str, "architecture_type": "monolith|microservices|modular_monolith|unknown", "module_boundaries": [{"name": str, "paths": [str], "responsibility": str}], "runtime_flow_summary": str, "findings": [Finding]}"#,
};

const SECURITY_TASK: BranchTask = BranchTask {
    name: "security",
    role: "Security Risk Reviewer",
    budget: |b| b.security_context,
    instructions: "Identify concrete security risks backed by the static-analysis evidence. \
                   Report explicit severity and a remediation for each.",
    output_shape: r#"{"schema_version": str, "run_id": str, "findings": [Finding], "top_security_risks": [{"issue": str, "severity": "Low|Medium|High|Critical", "file": str}]}"#,
};

const PERFORMANCE_TASK: BranchTask = BranchTask {
    name: "performance",
    role: "Performance Analyst",
    budget: |b| b.performance_context,
    instructions: "Detect bottlenecks and scalability risks from the scanner signals. \
                   Prioritize reproducible evidence, symptoms, and recommendations.",
    output_shape: r#"{"schema_version": str, "run_id": str, "findings": [Finding], "top_performance_risks": [{"issue": str, "severity": "Low|Medium|High|Critical", "file": str}]}"#,
};

const FINDING_SHAPE: &str = r#"Finding = {"id": str, "category": "architecture|security|performance", "title": str, "description": str, "severity": "Low|Medium|High|Critical", "status": "confirmed|suspected|not_applicable|insufficient_evidence|failed", "confidence": 0..1, "symptoms": [str], "recommendation": str, "evidence": [{"file": str, "line_start": int, "line_end": int, "source": str}]}"#;

pub struct ModelBranchExecutor {
    settings: ModelSettings,
    budgeter: TokenBudgeter,
}

impl ModelBranchExecutor {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let budgeter = TokenBudgeter::for_model(&settings.model)?;
        Ok(Self { settings, budgeter })
    }

    async fn run_branch<T>(&self, task: &BranchTask, scanner: &ScannerOutput) -> Result<T>
    where
        T: DeserializeOwned + BranchReport,
    {
        let context = self.bounded_context(task, scanner)?;
        let prompt = build_prompt(task, &context);
        let window = (self.settings.context_window as usize)
            .saturating_sub(self.settings.max_tokens as usize);
        self.budgeter.ensure_within_budget(task.name, &prompt, window)?;
        let raw = self.invoke(&prompt).await?;

        let json = extract_json_object(&raw).with_context(|| {
            format!("{} branch output did not contain a JSON object", task.name)
        })?;
        let mut output: T = serde_json::from_str(json)
            .with_context(|| format!("{} branch output did not match the schema", task.name))?;
        output.stamp(&scanner.run_id, &scanner.schema_version);
        output
            .validate()
            .map_err(|e| anyhow::anyhow!("{} branch output failed validation: {}", task.name, e))?;
        Ok(output)
    }

    /// Serialized scanner context that fits the branch budget.
    ///
    /// With compaction enabled, an over-budget context is compacted again with
    /// halved caps up to `context_compaction_retry_attempts` times.
    fn bounded_context(&self, task: &BranchTask, scanner: &ScannerOutput) -> Result<String> {
        let analysis = &self.settings.analysis;
        let budget = (task.budget)(&self.settings.budgets);

        if !analysis.enable_context_compaction {
            let context =
                serde_json::to_string(scanner).context("Failed to serialize scanner context")?;
            self.budgeter.ensure_within_budget(task.name, &context, budget)?;
            return Ok(context);
        }

        let mut controls = analysis.clone();
        let mut passes = 0;
        loop {
            let context = serde_json::to_string(&compact_scanner_context(scanner, &controls))
                .context("Failed to serialize scanner context")?;
            match self.budgeter.ensure_within_budget(task.name, &context, budget) {
                Ok(tokens) => {
                    tracing::debug!(branch = task.name, tokens, budget, "Context within budget");
                    return Ok(context);
                }
                Err(e) if passes < analysis.context_compaction_retry_attempts => {
                    tracing::info!(branch = task.name, error = %e, "Tightening context compaction");
                    controls = controls.tightened();
                    passes += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let settings = &self.settings;
        let mut cmd = Command::new(&settings.program);
        cmd.args(&settings.args)
            .env("TRIAGE_MODEL", &settings.model)
            .env("TRIAGE_TEMPERATURE", settings.temperature.to_string())
            .env("TRIAGE_SEED", settings.seed.to_string())
            .env("TRIAGE_MAX_TOKENS", settings.max_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(base_url) = settings.base_url.as_deref() {
            cmd.env("TRIAGE_BASE_URL", base_url);
        }
        if let Some((var, value)) = settings.api_key.as_ref() {
            cmd.env(var, value);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn model command '{}'", settings.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to stdin")?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for model command")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Model command exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl BranchExecutor for ModelBranchExecutor {
    async fn run_architecture(&self, scanner: &ScannerOutput) -> Result<ArchitectureOutput> {
        self.run_branch(&ARCHITECTURE_TASK, scanner).await
    }

    async fn run_security(&self, scanner: &ScannerOutput) -> Result<SecurityOutput> {
        self.run_branch(&SECURITY_TASK, scanner).await
    }

    async fn run_performance(&self, scanner: &ScannerOutput) -> Result<PerformanceOutput> {
        self.run_branch(&PERFORMANCE_TASK, scanner).await
    }
}

fn build_prompt(task: &BranchTask, context: &str) -> String {
    format!(
        r#"# {role}

{instructions}

Respond with a single JSON object and nothing else. Shape:
{output_shape}
{finding_shape}

Every finding must have category "{name}". Confirmed findings must include evidence.

## Scanner context
{context}
"#,
        role = task.role,
        instructions = task.instructions,
        output_shape = task.output_shape,
        finding_shape = FINDING_SHAPE,
        name = task.name,
        context = context,
    )
}

/// Deterministically shrink scanner output to the configured evidence limits.
///
/// Evidence is de-duplicated on `(file, line_start, source, summary)`, ordered
/// by source then location, and capped per source and overall. Dependency
/// findings are ordered by severity and capped. Long tool details are cut.
pub(crate) fn compact_scanner_context(
    scanner: &ScannerOutput,
    controls: &AnalysisSettings,
) -> Value {
    let mut seen = std::collections::HashSet::new();
    let mut evidence: Vec<&EvidenceItem> = scanner
        .evidence_index
        .iter()
        .filter(|e| {
            seen.insert((
                e.file.as_str(),
                e.line_start,
                e.source.as_str(),
                e.summary.as_str(),
            ))
        })
        .collect();
    evidence.sort_by(|a, b| {
        (a.source.as_str(), &a.file, a.line_start, a.line_end, &a.summary, &a.id).cmp(&(
            b.source.as_str(),
            &b.file,
            b.line_start,
            b.line_end,
            &b.summary,
            &b.id,
        ))
    });

    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    let mut selected = Vec::new();
    for item in evidence {
        if selected.len() >= controls.max_evidence_total {
            break;
        }
        let source = item.source.as_str();
        let limit = controls
            .max_evidence_per_source
            .get(source)
            .copied()
            .unwrap_or(controls.max_evidence_total);
        let count = per_source.entry(source).or_default();
        if *count >= limit {
            continue;
        }
        *count += 1;
        selected.push(item);
    }

    let mut dependency_findings: Vec<&DependencyFinding> = scanner
        .dependency_summary
        .vulnerability_findings
        .iter()
        .collect();
    dependency_findings.sort_by(|a, b| {
        (dependency_rank(a.severity), &a.vulnerability_id, &a.package, &a.version).cmp(&(
            dependency_rank(b.severity),
            &b.vulnerability_id,
            &b.package,
            &b.version,
        ))
    });
    dependency_findings.truncate(controls.max_dependency_findings);

    let tool_runs: Vec<Value> = scanner
        .scanner_tool_runs
        .iter()
        .map(|run| {
            let details = run.details.as_deref().map(|d| {
                if d.chars().count() > MAX_TOOL_DETAIL_CHARS {
                    let cut: String = d.chars().take(MAX_TOOL_DETAIL_CHARS - 3).collect();
                    format!("{}...", cut)
                } else {
                    d.to_string()
                }
            });
            json!({
                "tool": run.tool,
                "status": run.status,
                "exit_code": run.exit_code,
                "details": details,
            })
        })
        .collect();

    json!({
        "schema_version": scanner.schema_version,
        "run_id": scanner.run_id,
        "repo_profile": scanner.repo_profile,
        "scan_stats": scanner.scan_stats,
        "folders": scanner.folders,
        "dependency_summary": {
            "manifests": scanner.dependency_summary.manifests,
            "vulnerability_scan_status": scanner.dependency_summary.vulnerability_scan_status,
            "vulnerability_findings": dependency_findings,
        },
        "evidence_index": selected,
        "scanner_tool_runs": tool_runs,
        "context_compaction": {
            "original_evidence_count": scanner.evidence_index.len(),
            "compacted_evidence_count": selected.len(),
        },
    })
}

fn dependency_rank(severity: DependencySeverity) -> u8 {
    match severity {
        DependencySeverity::Critical => 0,
        DependencySeverity::High => 1,
        DependencySeverity::Medium => 2,
        DependencySeverity::Low => 3,
        DependencySeverity::Unknown => 4,
    }
}
