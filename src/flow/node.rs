//! Node identifiers and lifecycle states of the analysis graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A node in the `start → scanner → {architecture, security, performance} → roadmap` graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Start,
    Scanner,
    Architecture,
    Security,
    Performance,
    Roadmap,
}

impl NodeId {
    /// The fan-out branches, in the fixed order used for fan-in concatenation.
    pub const BRANCHES: [NodeId; 3] = [Self::Architecture, Self::Security, Self::Performance];

    /// Nodes that carry a status in `branch_statuses`.
    pub const TRACKED: [NodeId; 5] = [
        Self::Scanner,
        Self::Architecture,
        Self::Security,
        Self::Performance,
        Self::Roadmap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Scanner => "scanner",
            Self::Architecture => "architecture",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Roadmap => "roadmap",
        }
    }

    pub fn is_branch(&self) -> bool {
        Self::BRANCHES.contains(self)
    }

    /// Stage name used by the retry executor in error messages and logs.
    pub fn stage_name(&self) -> String {
        format!("{}-stage", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "scanner" => Ok(Self::Scanner),
            "architecture" => Ok(Self::Architecture),
            "security" => Ok(Self::Security),
            "performance" => Ok(Self::Performance),
            "roadmap" => Ok(Self::Roadmap),
            other => anyhow::bail!("Unknown flow node '{}'", other),
        }
    }
}

/// Lifecycle of the node currently executing; recorded in transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("Unknown node state '{}'", other),
        }
    }
}

/// Per-node status reported to artifact and manifest consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Degraded,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Degraded => "degraded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Degraded)
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<NodeState> for BranchStatus {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Pending => Self::Pending,
            NodeState::Running => Self::Running,
            NodeState::Completed => Self::Completed,
            NodeState::Failed => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trips_through_str() {
        for node in [
            NodeId::Start,
            NodeId::Scanner,
            NodeId::Architecture,
            NodeId::Security,
            NodeId::Performance,
            NodeId::Roadmap,
        ] {
            assert_eq!(node.as_str().parse::<NodeId>().unwrap(), node);
        }
        assert!("planner".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_branch_membership() {
        assert!(NodeId::Security.is_branch());
        assert!(!NodeId::Scanner.is_branch());
        assert!(!NodeId::Roadmap.is_branch());
        assert_eq!(NodeId::Scanner.stage_name(), "scanner-stage");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BranchStatus::Degraded.is_terminal());
        assert!(BranchStatus::Failed.is_terminal());
        assert!(!BranchStatus::Running.is_terminal());
        assert!(NodeState::Failed.is_terminal());
        assert!(!NodeState::Pending.is_terminal());
    }

    #[test]
    fn test_node_id_serializes_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(NodeId::Performance, "x");
        map.insert(NodeId::Architecture, "y");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"architecture":"y","performance":"x"}"#);
    }
}
