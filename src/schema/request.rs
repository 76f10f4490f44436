//! Analyze request contract.

use serde::{Deserialize, Serialize};

use super::enums::ProviderKind;
use super::SCHEMA_VERSION;

/// Where the repository to analyze comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    GithubUrl,
    LocalPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeInput {
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl AnalyzeInput {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::LocalPath,
            github_url: None,
            local_path: Some(path.into()),
            branch: None,
            commit: None,
        }
    }

    pub fn github(url: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::GithubUrl,
            github_url: Some(url.into()),
            local_path: None,
            branch: None,
            commit: None,
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_commit(mut self, commit: Option<String>) -> Self {
        self.commit = commit;
        self
    }
}

/// Provider settings recorded on the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Heuristic,
            model: "heuristic".to_string(),
            temperature: default_temperature(),
            seed: default_seed(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_max_tokens() -> u32 {
    4096
}

/// Per-run stage timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTimeouts {
    #[serde(default = "default_scanner_seconds")]
    pub scanner_seconds: u64,
    #[serde(default = "default_agent_seconds")]
    pub agent_seconds: u64,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            scanner_seconds: default_scanner_seconds(),
            agent_seconds: default_agent_seconds(),
        }
    }
}

fn default_scanner_seconds() -> u64 {
    900
}

fn default_agent_seconds() -> u64 {
    600
}

/// Tool toggles for the deterministic scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "enabled")]
    pub enable_semgrep: bool,
    #[serde(default = "enabled")]
    pub enable_bandit: bool,
    #[serde(default = "enabled")]
    pub enable_osv: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_semgrep: true,
            enable_bandit: true,
            enable_osv: true,
        }
    }
}

impl FeatureFlags {
    /// All external tools switched off.
    pub fn none() -> Self {
        Self {
            enable_semgrep: false,
            enable_bandit: false,
            enable_osv: false,
        }
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub timeouts: RequestTimeouts,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
}

/// A single analysis request. Serialized into flow state as the request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub schema_version: String,
    pub run_id: String,
    pub input: AnalyzeInput,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl AnalyzeRequest {
    pub fn new(run_id: impl Into<String>, input: AnalyzeInput) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.into(),
            input,
            execution: ExecutionConfig::default(),
        }
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Check structural requirements that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version.trim().is_empty() {
            return Err("schema_version must not be empty".to_string());
        }
        if self.run_id.trim().is_empty() {
            return Err("run_id must not be empty".to_string());
        }
        match self.input.source_type {
            SourceType::GithubUrl if is_blank(&self.input.github_url) => {
                return Err("github_url is required when source_type=github_url".to_string());
            }
            SourceType::LocalPath if is_blank(&self.input.local_path) => {
                return Err("local_path is required when source_type=local_path".to_string());
            }
            _ => {}
        }
        let timeouts = &self.execution.timeouts;
        if timeouts.scanner_seconds == 0 || timeouts.agent_seconds == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }
        if self.execution.provider.model.trim().is_empty() {
            return Err("provider model must not be empty".to_string());
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
