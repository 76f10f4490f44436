//! Checkpointed fan-out/fan-in flow.
//!
//! - `node`: node ids and lifecycle enums
//! - `state`: the per-run `FlowState`
//! - `db` / `store`: SQLite transition log and checkpoints
//! - `orchestrator`: the node graph
//! - `runner`: kickoff/resume facade that wires collaborators together

pub mod db;
pub mod node;
pub mod orchestrator;
pub mod runner;
pub mod state;
pub mod store;

pub use db::{DbHandle, ScannerRunRecord, TransitionRecord};
pub use node::{BranchStatus, NodeId, NodeState};
pub use orchestrator::FlowOrchestrator;
pub use runner::FlowRunner;
pub use state::FlowState;
pub use store::{CheckpointStore, ScannerStore, TransitionStore};
