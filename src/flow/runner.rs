//! Kickoff/resume facade over the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::db::{DbHandle, ScannerRunRecord, TransitionRecord};
use super::orchestrator::FlowOrchestrator;
use super::state::FlowState;
use super::store::{CheckpointStore, ScannerStore, TransitionStore};
use crate::artifacts::{GeneratedArtifacts, write_artifacts};
use crate::branches::{BranchExecutor, HeuristicBranchExecutor, ModelBranchExecutor, ModelSettings};
use crate::config::{AppConfig, EnvSnapshot};
use crate::errors::FlowError;
use crate::manifest::{ManifestCollector, ManifestStore, RunManifest};
use crate::retry::RetryExecutor;
use crate::scanner::{DEFAULT_WORKSPACE_DIR, Scanner, ScannerPipeline};
use crate::schema::{AnalyzeRequest, ProviderKind};

/// Builds an orchestrator per run and persists the run manifest.
///
/// Collaborators default to the production scanner and the branch executor
/// selected by the provider profile; tests swap them in with the `with_*`
/// builders.
pub struct FlowRunner {
    config: AppConfig,
    env: EnvSnapshot,
    db: DbHandle,
    workspace_root: PathBuf,
    scanner: Option<Arc<dyn Scanner>>,
    branches: Option<Arc<dyn BranchExecutor>>,
    retry: Option<RetryExecutor>,
    detect_tool_versions: bool,
}

impl FlowRunner {
    pub fn new(config: AppConfig, env: EnvSnapshot, db: DbHandle) -> Self {
        Self {
            config,
            env,
            db,
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            scanner: None,
            branches: None,
            retry: None,
            detect_tool_versions: true,
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_branch_executor(mut self, branches: Arc<dyn BranchExecutor>) -> Self {
        self.branches = Some(branches);
        self
    }

    pub fn with_retry_executor(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Skip external `--version` calls when building manifests.
    pub fn without_tool_versions(mut self) -> Self {
        self.detect_tool_versions = false;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start a run, or continue it if a checkpoint for the run id exists.
    pub async fn kickoff(
        &self,
        request: &AnalyzeRequest,
        profile: Option<&str>,
    ) -> Result<FlowState, FlowError> {
        let profile_name = self.resolve_profile(profile)?;
        let checkpoints = CheckpointStore::new(self.db.clone());
        let state = match checkpoints
            .load_latest(&request.run_id)
            .await
            .map_err(FlowError::Persistence)?
        {
            Some(existing) => {
                info!(run_id = %request.run_id, "Checkpoint found, continuing existing run");
                existing
            }
            None => FlowState::for_request(request, Some(profile_name.clone()))?,
        };
        self.execute(state, &profile_name).await
    }

    /// Continue a run from its latest checkpoint.
    pub async fn resume(&self, run_id: &str) -> Result<FlowState, FlowError> {
        let state = self.status(run_id).await?;
        let profile_name = self.resolve_profile(state.provider_profile.as_deref())?;
        info!(run_id, node = %state.node_id, "Resuming run");
        self.execute(state, &profile_name).await
    }

    /// Latest checkpointed state for a run.
    pub async fn status(&self, run_id: &str) -> Result<FlowState, FlowError> {
        CheckpointStore::new(self.db.clone())
            .load_latest(run_id)
            .await
            .map_err(FlowError::Persistence)?
            .ok_or_else(|| FlowError::CheckpointNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Transition log for a run in insertion order.
    pub async fn transitions(&self, run_id: &str) -> Result<Vec<TransitionRecord>, FlowError> {
        TransitionStore::new(self.db.clone())
            .list(run_id)
            .await
            .map_err(FlowError::Persistence)
    }

    pub async fn manifest(&self, run_id: &str) -> Result<Option<RunManifest>, FlowError> {
        ManifestStore::new(self.db.clone())
            .load(run_id)
            .await
            .map_err(FlowError::Persistence)
    }

    /// Run row written by the scanner stage, when the scan finished.
    pub async fn scanner_run(&self, run_id: &str) -> Result<Option<ScannerRunRecord>, FlowError> {
        ScannerStore::new(self.db.clone())
            .run(run_id)
            .await
            .map_err(FlowError::Persistence)
    }

    /// Write `summary.json` and `report.md` for a terminal state.
    pub fn materialize_artifacts(
        &self,
        state: &FlowState,
        output_dir: &Path,
    ) -> anyhow::Result<GeneratedArtifacts> {
        write_artifacts(state, output_dir)
    }

    async fn execute(&self, state: FlowState, profile_name: &str) -> Result<FlowState, FlowError> {
        let run_id = state.run_id.clone();
        let orchestrator = self.build_orchestrator(profile_name)?;
        match orchestrator.run(state).await {
            Ok(mut state) => {
                if let Some(manifest) = self.record_manifest(&state, profile_name).await {
                    state.run_manifest = Some(manifest);
                    CheckpointStore::new(self.db.clone())
                        .save(&state.run_id, state.node_id, &state)
                        .await
                        .map_err(FlowError::Persistence)?;
                }
                info!(run_id = %state.run_id, status = %state.run_status(), "Run finished");
                Ok(state)
            }
            Err(err) => {
                // The aborted state is only reachable through its last checkpoint.
                let latest = CheckpointStore::new(self.db.clone())
                    .load_latest(&run_id)
                    .await;
                if let Ok(Some(state)) = latest {
                    self.record_manifest(&state, profile_name).await;
                }
                Err(err)
            }
        }
    }

    async fn record_manifest(&self, state: &FlowState, profile_name: &str) -> Option<RunManifest> {
        let request = match state.request()? {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    run_id = %state.run_id,
                    error = %e,
                    "Cannot build manifest without a valid request"
                );
                return None;
            }
        };
        let mut collector = ManifestCollector::new(self.workspace_root.clone());
        if !self.detect_tool_versions {
            collector = collector.without_tool_versions();
        }
        let manifest = collector
            .collect(state, &request, &self.config, profile_name)
            .await;
        if let Err(e) = ManifestStore::new(self.db.clone()).save(&manifest).await {
            warn!(run_id = %state.run_id, error = %e, "Failed to persist run manifest");
        }
        Some(manifest)
    }

    fn resolve_profile(&self, requested: Option<&str>) -> Result<String, FlowError> {
        let name = requested.unwrap_or(&self.config.default_provider_profile);
        self.config
            .profile(Some(name))
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| FlowError::UnknownProfile(name.to_string()))
    }

    fn branch_executor(&self, profile_name: &str) -> Result<Arc<dyn BranchExecutor>, FlowError> {
        if let Some(branches) = &self.branches {
            return Ok(branches.clone());
        }
        let (name, profile) = self
            .config
            .profile(Some(profile_name))
            .ok_or_else(|| FlowError::UnknownProfile(profile_name.to_string()))?;
        Ok(match profile.kind {
            ProviderKind::Heuristic => Arc::new(HeuristicBranchExecutor),
            ProviderKind::Openai | ProviderKind::LmStudio => {
                let settings = ModelSettings::from_profile(
                    name,
                    profile,
                    &self.env,
                    &self.config.analysis,
                    &self.config.token_budgets,
                )?;
                Arc::new(ModelBranchExecutor::new(settings)?)
            }
        })
    }

    fn build_orchestrator(&self, profile_name: &str) -> Result<FlowOrchestrator, FlowError> {
        let scanner: Arc<dyn Scanner> = match &self.scanner {
            Some(scanner) => scanner.clone(),
            None => Arc::new(
                ScannerPipeline::from_config(&self.config, self.workspace_root.clone())
                    .with_store(ScannerStore::new(self.db.clone())),
            ),
        };
        let retry = self
            .retry
            .clone()
            .unwrap_or_else(|| RetryExecutor::new(self.config.retries.policy()));

        Ok(FlowOrchestrator::new(
            scanner,
            self.branch_executor(profile_name)?,
            retry,
            TransitionStore::new(self.db.clone()),
            CheckpointStore::new(self.db.clone()),
        )
        .with_agent_timeout(Some(Duration::from_secs(self.config.timeouts.agent_seconds)))
        .with_parallel_branches(self.config.analysis.parallel_branches)
        .with_default_profile(profile_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderProfile;
    use crate::flow::{BranchStatus, NodeId};
    use crate::schema::AnalyzeInput;

    fn runner(config: AppConfig) -> FlowRunner {
        FlowRunner::new(config, EnvSnapshot::default(), DbHandle::in_memory().unwrap())
            .without_tool_versions()
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_fails() {
        let err = runner(AppConfig::default()).resume("nope").await.unwrap_err();
        assert!(matches!(err, FlowError::CheckpointNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_profile_rejected_before_running() {
        let runner = runner(AppConfig::default());
        let request = AnalyzeRequest::new("r", AnalyzeInput::local("."));
        let err = runner.kickoff(&request, Some("missing")).await.unwrap_err();
        assert!(matches!(err, FlowError::UnknownProfile(name) if name == "missing"));
        assert!(runner.transitions("r").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_profile_without_key_is_config_error() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "remote".into(),
            ProviderProfile {
                kind: ProviderKind::Openai,
                model: "gpt-4o-mini".into(),
                api_key_env: Some("TRIAGE_TEST_MISSING_KEY".into()),
                ..ProviderProfile::heuristic()
            },
        );
        let runner = runner(config);
        let request = AnalyzeRequest::new("r", AnalyzeInput::local("."));
        let err = runner.kickoff(&request, Some("remote")).await.unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[tokio::test]
    async fn test_kickoff_over_local_fixture_attaches_manifest() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("main.py"), "print('x')\n").unwrap();
        let mut config = AppConfig::default();
        config.feature_flags = crate::schema::FeatureFlags::none();
        let runner = runner(config).with_workspace_root(repo.path().join(".ws"));

        let request =
            AnalyzeRequest::new("run-k", AnalyzeInput::local(repo.path().to_string_lossy()));
        let state = runner.kickoff(&request, None).await.unwrap();
        assert_eq!(state.status(NodeId::Roadmap), BranchStatus::Completed);

        let manifest = state.run_manifest.as_ref().unwrap();
        assert_eq!(manifest.provider.kind, ProviderKind::Heuristic);
        assert_eq!(runner.manifest("run-k").await.unwrap().as_ref(), Some(manifest));
        assert_eq!(runner.status("run-k").await.unwrap(), state);
    }
}
