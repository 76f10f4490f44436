//! CLI command implementations.
//!
//! | Module     | Commands handled          |
//! |------------|---------------------------|
//! | `analyze`  | `Analyze`, `Resume`       |
//! | `inspect`  | `Status`, `Transitions`   |

pub mod analyze;
pub mod inspect;

use anyhow::{Context as _, Result};
use std::path::PathBuf;

use repo_triage::config::{AppConfig, CliOverrides, DEFAULT_DB_PATH, EnvSnapshot, config_path};
use repo_triage::flow::{DbHandle, FlowRunner};
use repo_triage::scanner::DEFAULT_WORKSPACE_DIR;

pub use analyze::{AnalyzeArgs, cmd_analyze, cmd_resume};
pub use inspect::{cmd_status, cmd_transitions};

/// Loaded config plus a runner bound to the flow database.
pub struct Context {
    pub runner: FlowRunner,
}

impl Context {
    pub fn load(cli: &super::Cli) -> Result<Self> {
        let base = std::env::current_dir().context("Failed to get current directory")?;
        let env = EnvSnapshot::capture();

        let path = config_path(cli.config.as_deref(), &base);
        let overrides = match &cli.command {
            super::Commands::Analyze {
                profile,
                max_file_size_bytes,
                ..
            } => CliOverrides {
                provider_profile: profile.clone(),
                max_file_size_bytes: *max_file_size_bytes,
            },
            _ => CliOverrides::default(),
        };
        let config = AppConfig::load(&path, &env, &overrides)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        let db_path = cli
            .db
            .clone()
            .unwrap_or_else(|| base.join(DEFAULT_DB_PATH));
        let db = DbHandle::open(&db_path)?;
        tracing::debug!(config = %path.display(), db = %db_path.display(), "Context loaded");

        let workspace: PathBuf = base.join(DEFAULT_WORKSPACE_DIR);
        Ok(Self {
            runner: FlowRunner::new(config, env, db).with_workspace_root(workspace),
        })
    }
}
