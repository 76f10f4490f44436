//! The `start → scanner → {architecture, security, performance} → roadmap` graph.
//!
//! Each node checks the completed-node ledger on entry and returns early when
//! it already ran, so the whole graph can be re-entered for resume without
//! repeating side effects. Every transition is appended to the transition log
//! and followed by a full-state checkpoint.
//!
//! The three branches share the scanner output read-only and each writes only
//! its own output slot. They run concurrently (joined with `join3`) or one
//! after another, and the roadmap node only starts once all three returned.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join3;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::node::{BranchStatus, NodeId, NodeState};
use super::state::FlowState;
use super::store::{CheckpointStore, TransitionStore};
use crate::branches::{
    BranchExecutor, failed_architecture_output, failed_performance_output,
    failed_security_output, synthesize_roadmap,
};
use crate::errors::{FlowError, RetryError};
use crate::redaction::redact_text;
use crate::retry::RetryExecutor;
use crate::scanner::Scanner;
use crate::schema::{
    AnalyzeRequest, ArchitectureOutput, PerformanceOutput, RoadmapOutput, ScannerOutput,
    SecurityOutput,
};

/// Output of one branch collaborator.
enum BranchOutput {
    Architecture(ArchitectureOutput),
    Security(SecurityOutput),
    Performance(PerformanceOutput),
}

pub struct FlowOrchestrator {
    scanner: Arc<dyn Scanner>,
    branches: Arc<dyn BranchExecutor>,
    retry: RetryExecutor,
    transitions: TransitionStore,
    checkpoints: CheckpointStore,
    agent_timeout: Option<Duration>,
    parallel_branches: bool,
    default_profile: String,
}

impl FlowOrchestrator {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        branches: Arc<dyn BranchExecutor>,
        retry: RetryExecutor,
        transitions: TransitionStore,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            scanner,
            branches,
            retry,
            transitions,
            checkpoints,
            agent_timeout: None,
            parallel_branches: true,
            default_profile: "heuristic".to_string(),
        }
    }

    /// Per-attempt timeout for branch collaborators.
    pub fn with_agent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_parallel_branches(mut self, parallel: bool) -> Self {
        self.parallel_branches = parallel;
        self
    }

    /// Profile recorded when the state does not name one.
    pub fn with_default_profile(mut self, profile: impl Into<String>) -> Self {
        self.default_profile = profile.into();
        self
    }

    /// Drive `state` through every node that has not completed yet.
    ///
    /// Returns the terminal state. Fails only on a contract violation, a
    /// scanner failure after retries, or a persistence error.
    pub async fn run(&self, state: FlowState) -> Result<FlowState, FlowError> {
        let shared = Mutex::new(state);

        self.start(&shared).await?;
        self.scanner_stage(&shared).await?;

        if self.parallel_branches {
            let (arch, sec, perf) = join3(
                self.branch_stage(&shared, NodeId::Architecture),
                self.branch_stage(&shared, NodeId::Security),
                self.branch_stage(&shared, NodeId::Performance),
            )
            .await;
            arch?;
            sec?;
            perf?;
        } else {
            for node in NodeId::BRANCHES {
                self.branch_stage(&shared, node).await?;
            }
        }

        self.roadmap_stage(&shared).await?;
        Ok(shared.into_inner())
    }

    async fn start(&self, shared: &Mutex<FlowState>) -> Result<(), FlowError> {
        let mut state = shared.lock().await;
        if state.is_completed(NodeId::Start) {
            return Ok(());
        }

        let request = parse_request(&state)?;
        request.validate().map_err(FlowError::InvalidRequest)?;
        state.schema_version = request.schema_version.clone();
        state.run_id = request.run_id.clone();
        if state.provider_profile.is_none() {
            state.provider_profile = Some(self.default_profile.clone());
        }

        self.mark_transition(
            &mut state,
            NodeId::Start,
            NodeState::Completed,
            "Validated analyze request and provider profile",
        )
        .await
    }

    async fn scanner_stage(&self, shared: &Mutex<FlowState>) -> Result<(), FlowError> {
        let request = {
            let mut state = shared.lock().await;
            if state.is_completed(NodeId::Scanner) {
                return Ok(());
            }
            let request = parse_request(&state)?;
            state.set_status(NodeId::Scanner, BranchStatus::Running);
            self.mark_transition(
                &mut state,
                NodeId::Scanner,
                NodeState::Running,
                "Executing scanner stage",
            )
            .await?;
            request
        };

        let timeout = Some(Duration::from_secs(request.execution.timeouts.scanner_seconds));
        let scanner = self.scanner.clone();
        let request = Arc::new(request);
        let result = self
            .retry
            .run(&NodeId::Scanner.stage_name(), timeout, move || {
                let scanner = scanner.clone();
                let request = request.clone();
                async move { scanner.scan(&request).await }
            })
            .await;

        let mut state = shared.lock().await;
        match result {
            Ok(output) => {
                state.scanner_output = Some(output);
                state.set_status(NodeId::Scanner, BranchStatus::Completed);
                state.branch_failures.remove(&NodeId::Scanner);
                self.mark_transition(
                    &mut state,
                    NodeId::Scanner,
                    NodeState::Completed,
                    "Scanner stage completed",
                )
                .await
            }
            Err(err) => {
                let redacted = redact_text(&err.to_string());
                warn!(run_id = %state.run_id, error = %redacted, "Scanner stage failed");
                state.set_status(NodeId::Scanner, BranchStatus::Failed);
                state.branch_failures.insert(NodeId::Scanner, redacted.clone());
                self.mark_transition(
                    &mut state,
                    NodeId::Scanner,
                    NodeState::Failed,
                    &format!("Scanner stage failed: {}", redacted),
                )
                .await?;
                Err(FlowError::StageFailed {
                    node: NodeId::Scanner,
                    source: err,
                })
            }
        }
    }

    /// Run one branch. Collaborator failures are absorbed into a placeholder
    /// output; only persistence errors escape.
    ///
    /// A branch that failed earlier is retried on resume unless the roadmap
    /// already consumed its placeholder.
    async fn branch_stage(&self, shared: &Mutex<FlowState>, node: NodeId) -> Result<(), FlowError> {
        let scanner_output = {
            let mut state = shared.lock().await;
            if state.is_completed(node) || state.is_completed(NodeId::Roadmap) {
                return Ok(());
            }
            let Some(output) = state.scanner_output.clone() else {
                return Err(FlowError::Other(anyhow::anyhow!(
                    "{} branch entered without scanner output",
                    node
                )));
            };
            state.set_status(node, BranchStatus::Running);
            self.mark_transition(
                &mut state,
                node,
                NodeState::Running,
                &format!("Executing {} branch", node),
            )
            .await?;
            Arc::new(output)
        };

        let result = self.invoke_branch(node, scanner_output).await;

        let mut state = shared.lock().await;
        let title = capitalize(node.as_str());
        match result {
            Ok(output) => {
                match output {
                    BranchOutput::Architecture(o) => state.architecture_output = Some(o),
                    BranchOutput::Security(o) => state.security_output = Some(o),
                    BranchOutput::Performance(o) => state.performance_output = Some(o),
                }
                state.set_status(node, BranchStatus::Completed);
                state.branch_failures.remove(&node);
                self.mark_transition(
                    &mut state,
                    node,
                    NodeState::Completed,
                    &format!("{} branch completed", title),
                )
                .await
            }
            Err(err) => {
                let redacted = redact_text(&err.to_string());
                warn!(
                    run_id = %state.run_id,
                    node = %node,
                    error = %redacted,
                    "Branch failed, using placeholder"
                );
                let run_id = state.run_id.clone();
                let version = state.schema_version.clone();
                match node {
                    NodeId::Architecture => {
                        state.architecture_output =
                            Some(failed_architecture_output(&run_id, &version, &redacted))
                    }
                    NodeId::Security => {
                        state.security_output =
                            Some(failed_security_output(&run_id, &version, &redacted))
                    }
                    _ => {
                        state.performance_output =
                            Some(failed_performance_output(&run_id, &version, &redacted))
                    }
                }
                state.set_status(node, BranchStatus::Failed);
                state.branch_failures.insert(node, redacted.clone());
                self.mark_transition(
                    &mut state,
                    node,
                    NodeState::Failed,
                    &format!("{} branch failed: {}", title, redacted),
                )
                .await
            }
        }
    }

    async fn invoke_branch(
        &self,
        node: NodeId,
        scanner_output: Arc<ScannerOutput>,
    ) -> Result<BranchOutput, RetryError> {
        let branches = self.branches.clone();
        let stage = node.stage_name();
        self.retry
            .run(&stage, self.agent_timeout, move || {
                let branches = branches.clone();
                let input = scanner_output.clone();
                async move {
                    match node {
                        NodeId::Architecture => branches
                            .run_architecture(&input)
                            .await
                            .map(BranchOutput::Architecture),
                        NodeId::Security => {
                            branches.run_security(&input).await.map(BranchOutput::Security)
                        }
                        _ => branches
                            .run_performance(&input)
                            .await
                            .map(BranchOutput::Performance),
                    }
                }
            })
            .await
    }

    /// Fan-in join. Synthesis failures are recorded as a failed roadmap and
    /// never raised.
    async fn roadmap_stage(&self, shared: &Mutex<FlowState>) -> Result<(), FlowError> {
        let mut state = shared.lock().await;
        if state.is_completed(NodeId::Roadmap) {
            return Ok(());
        }
        for node in NodeId::BRANCHES {
            let status = state.status(node);
            if !status.is_terminal() {
                return Err(FlowError::BarrierViolation {
                    node,
                    status: status.to_string(),
                });
            }
        }

        state.set_status(NodeId::Roadmap, BranchStatus::Running);
        self.mark_transition(
            &mut state,
            NodeId::Roadmap,
            NodeState::Running,
            "Executing roadmap synthesis trigger",
        )
        .await?;

        let synthesized = match (
            &state.architecture_output,
            &state.security_output,
            &state.performance_output,
        ) {
            (Some(arch), Some(sec), Some(perf)) => Ok(synthesize_roadmap(arch, sec, perf)),
            _ => Err(missing_outputs(&state)),
        };

        match synthesized {
            Ok(items) => {
                let status = if state.any_branch_failed() {
                    BranchStatus::Degraded
                } else {
                    BranchStatus::Completed
                };
                state.set_status(NodeId::Roadmap, status);
                state.roadmap_output = Some(RoadmapOutput {
                    schema_version: state.schema_version.clone(),
                    run_id: state.run_id.clone(),
                    status,
                    items,
                    branch_failures: state.branch_failures.clone(),
                });
                info!(run_id = %state.run_id, status = %status, "Roadmap synthesized");
                self.mark_transition(
                    &mut state,
                    NodeId::Roadmap,
                    NodeState::Completed,
                    "Roadmap trigger completed",
                )
                .await
            }
            Err(reason) => {
                let redacted = redact_text(&reason);
                warn!(run_id = %state.run_id, error = %redacted, "Roadmap synthesis failed");
                state.set_status(NodeId::Roadmap, BranchStatus::Failed);
                state.branch_failures.insert(NodeId::Roadmap, redacted.clone());
                state.roadmap_output = Some(RoadmapOutput::failed(
                    &state.run_id,
                    &state.schema_version,
                    state.branch_failures.clone(),
                ));
                self.mark_transition(
                    &mut state,
                    NodeId::Roadmap,
                    NodeState::Failed,
                    &format!("Roadmap trigger failed: {}", redacted),
                )
                .await
            }
        }
    }

    /// Record a transition and checkpoint the full state under the run id.
    async fn mark_transition(
        &self,
        state: &mut FlowState,
        node: NodeId,
        to_state: NodeState,
        reason: &str,
    ) -> Result<(), FlowError> {
        let from_state = state.state;
        let run_id = state.run_id.clone();
        state.node_id = node;
        state.state = to_state;
        state.checkpoint_id = Some(format!("{}:{}", run_id, node));
        state.resume_token = Some(run_id.clone());
        if to_state == NodeState::Completed {
            state.mark_completed(node);
        }

        self.transitions
            .record(&run_id, node, from_state, to_state, Some(reason))
            .await
            .map_err(FlowError::Persistence)?;
        self.checkpoints
            .save(&run_id, node, state)
            .await
            .map_err(FlowError::Persistence)?;
        info!(
            run_id = %run_id,
            node = %node,
            from = %from_state,
            to = %to_state,
            "Node transition"
        );
        Ok(())
    }
}

fn parse_request(state: &FlowState) -> Result<AnalyzeRequest, FlowError> {
    match state.request() {
        None => Err(FlowError::MissingRequestPayload),
        Some(Err(e)) => Err(FlowError::InvalidRequest(e.to_string())),
        Some(Ok(request)) => Ok(request),
    }
}

fn missing_outputs(state: &FlowState) -> String {
    let missing: Vec<&str> = [
        (NodeId::Architecture, state.architecture_output.is_none()),
        (NodeId::Security, state.security_output.is_none()),
        (NodeId::Performance, state.performance_output.is_none()),
    ]
    .iter()
    .filter(|(_, missing)| *missing)
    .map(|(node, _)| node.as_str())
    .collect();
    format!("missing branch output: {}", missing.join(", "))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branches::HeuristicBranchExecutor;
    use crate::flow::db::DbHandle;
    use crate::retry::RetryPolicy;
    use crate::schema::{AnalyzeInput, RepoProfile, SCHEMA_VERSION, ScanStats};
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedScanner;

    #[async_trait]
    impl Scanner for FixedScanner {
        async fn scan(&self, request: &AnalyzeRequest) -> Result<ScannerOutput> {
            Ok(ScannerOutput {
                schema_version: SCHEMA_VERSION.to_string(),
                run_id: request.run_id.clone(),
                repo_profile: RepoProfile {
                    repo_name: "fixture".into(),
                    ..Default::default()
                },
                scan_stats: ScanStats::default(),
                folders: vec![],
                dependency_summary: Default::default(),
                evidence_index: vec![],
                scanner_tool_runs: vec![],
            })
        }
    }

    fn orchestrator(db: &DbHandle) -> FlowOrchestrator {
        FlowOrchestrator::new(
            Arc::new(FixedScanner),
            Arc::new(HeuristicBranchExecutor),
            RetryExecutor::new(RetryPolicy::new(1, 0.0, 0.0)),
            TransitionStore::new(db.clone()),
            CheckpointStore::new(db.clone()),
        )
    }

    fn seeded_state(run_id: &str) -> FlowState {
        let request = AnalyzeRequest::new(run_id, AnalyzeInput::local("/tmp/fixture"));
        FlowState::for_request(&request, None).unwrap()
    }

    #[tokio::test]
    async fn test_missing_request_payload_is_contract_violation() {
        let db = DbHandle::in_memory().unwrap();
        let err = orchestrator(&db).run(FlowState::new("r")).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingRequestPayload));
        assert!(TransitionStore::new(db).list("r").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_at_start() {
        let db = DbHandle::in_memory().unwrap();
        let mut state = seeded_state("r");
        state.request_payload = Some(serde_json::json!({"run_id": "r"}));
        let err = orchestrator(&db).run(state).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_full_run_marks_every_node() {
        let db = DbHandle::in_memory().unwrap();
        let state = orchestrator(&db)
            .with_default_profile("local")
            .run(seeded_state("run-a"))
            .await
            .unwrap();

        assert_eq!(
            state.completed_nodes()[0..2],
            [NodeId::Start, NodeId::Scanner]
        );
        assert_eq!(state.completed_nodes().len(), 6);
        assert_eq!(state.provider_profile.as_deref(), Some("local"));
        assert_eq!(state.status(NodeId::Roadmap), BranchStatus::Completed);
        assert_eq!(state.node_id, NodeId::Roadmap);
        assert_eq!(state.checkpoint_id.as_deref(), Some("run-a:roadmap"));
        assert_eq!(state.resume_token.as_deref(), Some("run-a"));
        assert!(state.branch_failures.is_empty());

        let saved = CheckpointStore::new(db).load_latest("run-a").await.unwrap().unwrap();
        assert_eq!(saved, state);
    }

    #[tokio::test]
    async fn test_sequential_branches_follow_fixed_order() {
        let db = DbHandle::in_memory().unwrap();
        orchestrator(&db)
            .with_parallel_branches(false)
            .run(seeded_state("run-seq"))
            .await
            .unwrap();
        let nodes: Vec<NodeId> = TransitionStore::new(db)
            .list("run-seq")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.node_id)
            .collect();
        assert_eq!(
            nodes,
            [
                NodeId::Start,
                NodeId::Scanner,
                NodeId::Scanner,
                NodeId::Architecture,
                NodeId::Architecture,
                NodeId::Security,
                NodeId::Security,
                NodeId::Performance,
                NodeId::Performance,
                NodeId::Roadmap,
                NodeId::Roadmap,
            ]
        );
    }

    #[tokio::test]
    async fn test_barrier_rejects_non_terminal_branch() {
        let db = DbHandle::in_memory().unwrap();
        let orch = orchestrator(&db);
        let mut state = seeded_state("run-b");
        for node in [NodeId::Start, NodeId::Scanner, NodeId::Architecture, NodeId::Performance] {
            state.mark_completed(node);
        }
        state.set_status(NodeId::Architecture, BranchStatus::Completed);
        state.set_status(NodeId::Performance, BranchStatus::Completed);
        state.set_status(NodeId::Security, BranchStatus::Running);
        let err = orch.roadmap_stage(&Mutex::new(state)).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::BarrierViolation { node: NodeId::Security, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_branch_output_fails_roadmap_without_raising() {
        let db = DbHandle::in_memory().unwrap();
        let orch = orchestrator(&db);
        let mut state = seeded_state("run-c");
        for node in NodeId::BRANCHES {
            state.set_status(node, BranchStatus::Completed);
        }
        let shared = Mutex::new(state);
        orch.roadmap_stage(&shared).await.unwrap();
        let state = shared.into_inner();
        assert_eq!(state.status(NodeId::Roadmap), BranchStatus::Failed);
        let roadmap = state.roadmap_output.as_ref().unwrap();
        assert_eq!(roadmap.status, BranchStatus::Failed);
        assert!(roadmap.items.is_empty());
        assert!(
            state.branch_failures[&NodeId::Roadmap]
                .contains("architecture, security, performance")
        );
        assert!(!state.is_completed(NodeId::Roadmap));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("security"), "Security");
        assert_eq!(capitalize(""), "");
    }
}
