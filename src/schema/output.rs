//! Roadmap contracts produced by the join stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{Priority, TimelineBucket};
use crate::flow::{BranchStatus, NodeId};

/// One prioritised improvement task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapItem {
    pub priority: Priority,
    pub task: String,
    pub impact: String,
    pub effort: String,
    pub risk: String,
    pub justification: String,
    pub timeline_bucket: TimelineBucket,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Output of the roadmap node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapOutput {
    pub schema_version: String,
    pub run_id: String,
    pub status: BranchStatus,
    #[serde(default)]
    pub items: Vec<RoadmapItem>,
    #[serde(default)]
    pub branch_failures: BTreeMap<NodeId, String>,
}

impl RoadmapOutput {
    /// Empty roadmap recorded when synthesis itself fails.
    pub fn failed(
        run_id: &str,
        schema_version: &str,
        branch_failures: BTreeMap<NodeId, String>,
    ) -> Self {
        Self {
            schema_version: schema_version.to_string(),
            run_id: run_id.to_string(),
            status: BranchStatus::Failed,
            items: Vec::new(),
            branch_failures,
        }
    }
}
