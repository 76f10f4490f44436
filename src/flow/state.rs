//! The single mutable record threaded through a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node::{BranchStatus, NodeId, NodeState};
use crate::manifest::RunManifest;
use crate::schema::{
    AnalyzeRequest, ArchitectureOutput, PerformanceOutput, RoadmapOutput, SCHEMA_VERSION,
    ScannerOutput, SecurityOutput,
};

/// Flow state persisted in every checkpoint.
///
/// Output slots are partitioned by node: each is written once by its owning
/// node. `completed_nodes` is the idempotency ledger and only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub schema_version: String,
    pub run_id: String,
    #[serde(default)]
    pub request_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub provider_profile: Option<String>,
    pub node_id: NodeId,
    pub state: NodeState,
    #[serde(default)]
    pub resume_token: Option<String>,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    #[serde(default)]
    completed_nodes: Vec<NodeId>,
    pub branch_statuses: BTreeMap<NodeId, BranchStatus>,
    #[serde(default)]
    pub branch_failures: BTreeMap<NodeId, String>,
    #[serde(default)]
    pub run_manifest: Option<RunManifest>,
    #[serde(default)]
    pub scanner_output: Option<ScannerOutput>,
    #[serde(default)]
    pub architecture_output: Option<ArchitectureOutput>,
    #[serde(default)]
    pub security_output: Option<SecurityOutput>,
    #[serde(default)]
    pub performance_output: Option<PerformanceOutput>,
    #[serde(default)]
    pub roadmap_output: Option<RoadmapOutput>,
}

impl FlowState {
    /// Empty state for `run_id` with every tracked node pending.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.into(),
            request_payload: None,
            provider_profile: None,
            node_id: NodeId::Start,
            state: NodeState::Pending,
            resume_token: None,
            checkpoint_id: None,
            completed_nodes: Vec::new(),
            branch_statuses: NodeId::TRACKED
                .iter()
                .map(|node| (*node, BranchStatus::Pending))
                .collect(),
            branch_failures: BTreeMap::new(),
            run_manifest: None,
            scanner_output: None,
            architecture_output: None,
            security_output: None,
            performance_output: None,
            roadmap_output: None,
        }
    }

    /// Fresh state seeded from a request.
    pub fn for_request(
        request: &AnalyzeRequest,
        provider_profile: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut state = Self::new(request.run_id.clone());
        state.schema_version = request.schema_version.clone();
        state.request_payload = Some(serde_json::to_value(request)?);
        state.provider_profile = provider_profile;
        Ok(state)
    }

    pub fn completed_nodes(&self) -> &[NodeId] {
        &self.completed_nodes
    }

    pub fn is_completed(&self, node: NodeId) -> bool {
        self.completed_nodes.contains(&node)
    }

    /// Append `node` to the ledger. Returns false if it was already present.
    pub fn mark_completed(&mut self, node: NodeId) -> bool {
        if self.is_completed(node) {
            return false;
        }
        self.completed_nodes.push(node);
        true
    }

    pub fn status(&self, node: NodeId) -> BranchStatus {
        self.branch_statuses.get(&node).copied().unwrap_or_default()
    }

    pub fn set_status(&mut self, node: NodeId, status: BranchStatus) {
        self.branch_statuses.insert(node, status);
    }

    /// Deserialize the stored request payload.
    pub fn request(&self) -> Option<anyhow::Result<AnalyzeRequest>> {
        self.request_payload
            .as_ref()
            .map(|payload| serde_json::from_value(payload.clone()).map_err(Into::into))
    }

    /// Status of the run as a whole: the roadmap status once it is terminal,
    /// `failed` if the scanner failed, otherwise the current roadmap status.
    pub fn run_status(&self) -> BranchStatus {
        if self.status(NodeId::Scanner) == BranchStatus::Failed {
            return BranchStatus::Failed;
        }
        self.status(NodeId::Roadmap)
    }

    pub fn any_branch_failed(&self) -> bool {
        NodeId::BRANCHES
            .iter()
            .any(|node| self.status(*node) == BranchStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AnalyzeInput;

    #[test]
    fn test_new_state_has_all_nodes_pending() {
        let state = FlowState::new("run-1");
        assert_eq!(state.branch_statuses.len(), 5);
        assert!(state.branch_statuses.values().all(|s| *s == BranchStatus::Pending));
        assert!(!state.branch_statuses.contains_key(&NodeId::Start));
        assert_eq!(state.node_id, NodeId::Start);
        assert!(state.completed_nodes().is_empty());
    }

    #[test]
    fn test_ledger_is_append_only_and_unique() {
        let mut state = FlowState::new("run-1");
        assert!(state.mark_completed(NodeId::Start));
        assert!(state.mark_completed(NodeId::Scanner));
        assert!(!state.mark_completed(NodeId::Start));
        assert_eq!(state.completed_nodes(), &[NodeId::Start, NodeId::Scanner]);
    }

    #[test]
    fn test_request_round_trip_through_payload() {
        let request = AnalyzeRequest::new("run-7", AnalyzeInput::local("/tmp/repo"));
        let state = FlowState::for_request(&request, Some("default".to_string())).unwrap();
        let decoded = state.request().unwrap().unwrap();
        assert_eq!(decoded, request);
        assert_eq!(state.provider_profile.as_deref(), Some("default"));
    }

    #[test]
    fn test_state_survives_json_round_trip() {
        let mut state = FlowState::new("run-1");
        state.mark_completed(NodeId::Start);
        state.set_status(NodeId::Security, BranchStatus::Failed);
        state
            .branch_failures
            .insert(NodeId::Security, "boom".to_string());
        let json = serde_json::to_string(&state).unwrap();
        let back: FlowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_run_status() {
        let mut state = FlowState::new("run-1");
        state.set_status(NodeId::Roadmap, BranchStatus::Degraded);
        assert_eq!(state.run_status(), BranchStatus::Degraded);
        state.set_status(NodeId::Scanner, BranchStatus::Failed);
        assert_eq!(state.run_status(), BranchStatus::Failed);
    }
}
