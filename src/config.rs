//! Configuration for triage.
//!
//! Settings are read from `.triage/triage.toml` and layered
//! file → environment → CLI. A missing file means built-in defaults: one
//! `heuristic` provider profile and the retry/timeout/scan defaults below.
//!
//! # Configuration File Format
//!
//! ```toml
//! default_provider_profile = "openai"
//!
//! [providers.heuristic]
//! kind = "heuristic"
//! model = "heuristic"
//!
//! [providers.openai]
//! kind = "openai"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//! command = ["llm", "-m", "gpt-4o-mini"]
//!
//! [retries]
//! max_attempts = 3
//! backoff_seconds = 1.0
//! jitter_seconds = 0.2
//!
//! [timeouts]
//! scanner_seconds = 900
//! agent_seconds = 600
//!
//! [feature_flags]
//! enable_semgrep = true
//! enable_bandit = true
//! enable_osv = false
//!
//! [scan_policy]
//! exclude_globs = ["tests/fixtures/**"]
//! max_file_size_bytes = 1000000
//!
//! [analysis]
//! max_evidence_total = 300
//! enable_context_compaction = true
//! parallel_branches = true
//!
//! [token_budgets]
//! architecture_context = 6000
//! security_context = 6000
//! performance_context = 6000
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::retry::RetryPolicy;
use crate::schema::{FeatureFlags, ProviderKind};

/// Environment variable that overrides `default_provider_profile`.
pub const ENV_DEFAULT_PROFILE: &str = "TRIAGE_DEFAULT_PROVIDER_PROFILE";

pub const DEFAULT_CONFIG_PATH: &str = ".triage/triage.toml";
pub const DEFAULT_DB_PATH: &str = ".triage/triage.db";

/// Process environment captured once at startup.
///
/// Everything downstream reads credentials and overrides from this snapshot,
/// never from `std::env` directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model CLI invoked per branch (program followed by arguments).
    #[serde(default = "default_model_command")]
    pub command: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

fn default_model_command() -> Vec<String> {
    vec!["llm".to_string()]
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

fn default_context_window() -> u32 {
    128_000
}

impl ProviderProfile {
    pub fn heuristic() -> Self {
        Self {
            kind: ProviderKind::Heuristic,
            model: "heuristic".to_string(),
            api_key_env: None,
            base_url: None,
            command: default_model_command(),
            temperature: default_temperature(),
            seed: default_seed(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
        }
    }

    fn validate(&mut self, name: &str) -> Result<(), ConfigError> {
        let invalid = |msg: &str| ConfigError::Invalid(format!("provider '{}': {}", name, msg));
        if self.model.trim().is_empty() {
            return Err(invalid("model must not be empty"));
        }
        match self.kind {
            ProviderKind::Heuristic => {}
            ProviderKind::Openai => {
                if self.api_key_env.is_none() {
                    return Err(invalid("openai profiles must define api_key_env"));
                }
            }
            ProviderKind::LmStudio => {
                if self.base_url.is_none() {
                    return Err(invalid("lm_studio profiles must define base_url"));
                }
                if self.api_key_env.is_none() {
                    return Err(invalid("lm_studio profiles must define api_key_env"));
                }
                self.model = normalize_lm_studio_model(&self.model);
            }
        }
        if self.kind.is_model_backed() && self.command.is_empty() {
            return Err(invalid("command must name a program"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be greater than zero"));
        }
        if self.max_tokens > self.context_window {
            return Err(invalid("max_tokens cannot exceed context_window"));
        }
        Ok(())
    }
}

fn normalize_lm_studio_model(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("lm_studio/") {
        model.to_string()
    } else if let Some(rest) = model.strip_prefix("lm-studio/") {
        format!("lm_studio/{}", rest)
    } else {
        format!("lm_studio/{}", model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_seconds: f64,
    pub jitter_seconds: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 1.0,
            jitter_seconds: 0.2,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_seconds, self.jitter_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub scanner_seconds: u64,
    pub agent_seconds: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            scanner_seconds: 900,
            agent_seconds: 600,
        }
    }
}

/// Include/exclude policy for the scanner inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPolicy {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*".to_string()],
            exclude_globs: [
                ".git/**",
                "node_modules/**",
                "dist/**",
                "build/**",
                ".venv/**",
                "__pycache__/**",
                "vendor/**",
                "tests/fixtures/**",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_file_size_bytes: 1_000_000,
            max_files: 25_000,
        }
    }
}

/// Controls for how scanner context is shaped before branch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub max_evidence_total: usize,
    pub max_evidence_per_source: BTreeMap<String, usize>,
    pub max_dependency_findings: usize,
    /// Shrink scanner context before it is sent to a model. When false the
    /// full scanner output is sent and must fit the token budget as-is.
    pub enable_context_compaction: bool,
    /// Extra compaction passes, each halving the evidence caps, when a
    /// compacted context is still over budget.
    pub context_compaction_retry_attempts: u32,
    /// Run the three branches concurrently; sequential when false.
    pub parallel_branches: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_evidence_total: 300,
            max_evidence_per_source: [
                ("bandit", 120),
                ("semgrep", 120),
                ("osv", 120),
                ("scanner_heuristic", 80),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
            max_dependency_findings: 60,
            enable_context_compaction: true,
            context_compaction_retry_attempts: 1,
            parallel_branches: true,
        }
    }
}

impl AnalysisSettings {
    /// The same controls with every evidence cap halved (never below one).
    pub fn tightened(&self) -> Self {
        let halve = |n: usize| (n / 2).max(1);
        Self {
            max_evidence_total: halve(self.max_evidence_total),
            max_evidence_per_source: self
                .max_evidence_per_source
                .iter()
                .map(|(k, v)| (k.clone(), halve(*v)))
                .collect(),
            max_dependency_findings: halve(self.max_dependency_findings),
            ..self.clone()
        }
    }
}

/// Per-branch token budgets for the serialized scanner context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgets {
    pub architecture_context: usize,
    pub security_context: usize,
    pub performance_context: usize,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            architecture_context: 6000,
            security_context: 6000,
            performance_context: 6000,
        }
    }
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub provider_profile: Option<String>,
    pub max_file_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_provider_profile: String,
    pub providers: BTreeMap<String, ProviderProfile>,
    pub retries: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub feature_flags: FeatureFlags,
    pub scan_policy: ScanPolicy,
    pub analysis: AnalysisSettings,
    pub token_budgets: TokenBudgets,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert("heuristic".to_string(), ProviderProfile::heuristic());
        Self {
            default_provider_profile: "heuristic".to_string(),
            providers,
            retries: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            feature_flags: FeatureFlags::default(),
            scan_policy: ScanPolicy::default(),
            analysis: AnalysisSettings::default(),
            token_budgets: TokenBudgets::default(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from a TOML string without validating it.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` (defaults when absent), apply overrides, and validate.
    pub fn load(
        path: &Path,
        env: &EnvSnapshot,
        cli: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::parse(&content, path)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_overrides(env, cli);
        config.validate()?;
        Ok(config)
    }

    /// Precedence: CLI > env > file.
    pub fn apply_overrides(&mut self, env: &EnvSnapshot, cli: &CliOverrides) {
        if let Some(profile) = env.get(ENV_DEFAULT_PROFILE) {
            self.default_provider_profile = profile.to_string();
        }
        if let Some(profile) = cli.provider_profile.as_ref() {
            self.default_provider_profile = profile.clone();
        }
        if let Some(max) = cli.max_file_size_bytes {
            self.scan_policy.max_file_size_bytes = max;
        }
    }

    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if !self.providers.contains_key(&self.default_provider_profile) {
            return Err(ConfigError::Invalid(format!(
                "default_provider_profile '{}' must exist in providers",
                self.default_provider_profile
            )));
        }
        for (name, profile) in self.providers.iter_mut() {
            profile.validate(name)?;
        }

        let retries = &self.retries;
        if !(1..=10).contains(&retries.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "retries.max_attempts must be between 1 and 10 (got {})",
                retries.max_attempts
            )));
        }
        if retries.backoff_seconds < 0.0 {
            return Err(ConfigError::Invalid(
                "retries.backoff_seconds must be >= 0".to_string(),
            ));
        }
        if !(0.0..=5.0).contains(&retries.jitter_seconds) {
            return Err(ConfigError::Invalid(
                "retries.jitter_seconds must be between 0 and 5".to_string(),
            ));
        }
        if self.timeouts.scanner_seconds == 0 || self.timeouts.agent_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.scan_policy.max_file_size_bytes == 0 || self.scan_policy.max_files == 0 {
            return Err(ConfigError::Invalid(
                "scan_policy limits must be greater than zero".to_string(),
            ));
        }
        for pattern in self
            .scan_policy
            .include_globs
            .iter()
            .chain(&self.scan_policy.exclude_globs)
        {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid scan_policy glob '{}': {}", pattern, e))
            })?;
        }
        if self.analysis.max_evidence_total < 10 {
            return Err(ConfigError::Invalid(
                "analysis.max_evidence_total must be at least 10".to_string(),
            ));
        }
        if self.analysis.max_dependency_findings == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_dependency_findings must be greater than zero".to_string(),
            ));
        }
        if self.analysis.context_compaction_retry_attempts > 3 {
            return Err(ConfigError::Invalid(
                "analysis.context_compaction_retry_attempts must be between 0 and 3".to_string(),
            ));
        }
        let budgets = &self.token_budgets;
        if budgets.architecture_context == 0
            || budgets.security_context == 0
            || budgets.performance_context == 0
        {
            return Err(ConfigError::Invalid(
                "token_budgets must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up a profile by name, falling back to the default profile.
    pub fn profile(&self, name: Option<&str>) -> Option<(&str, &ProviderProfile)> {
        let name = name.unwrap_or(&self.default_provider_profile);
        self.providers
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Resolve the config path: explicit flag, else the default under `base`.
pub fn config_path(explicit: Option<&Path>, base: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base.join(DEFAULT_CONFIG_PATH))
}
