//! Typed error hierarchy for the triage orchestrator.
//!
//! Five top-level enums cover the subsystems:
//! - `FlowError`: orchestration and runner failures
//! - `RetryError`: final outcome of a retried stage operation
//! - `AttemptError`: a single failed attempt inside the retry loop
//! - `BranchError`: branch executor failures worth matching on
//! - `ConfigError`: configuration loading and validation

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::flow::NodeId;

/// Errors from the flow orchestrator and runner.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("request_payload is required in flow state before kickoff execution")]
    MissingRequestPayload,

    #[error("Invalid analyze request: {0}")]
    InvalidRequest(String),

    #[error("{node} stage failed: {source}")]
    StageFailed {
        node: NodeId,
        #[source]
        source: RetryError,
    },

    #[error("Roadmap barrier reached with non-terminal branch {node} ({status})")]
    BarrierViolation { node: NodeId, status: String },

    #[error("No checkpoint found for run {run_id}")]
    CheckpointNotFound { run_id: String },

    #[error("Unknown provider profile '{0}'")]
    UnknownProfile(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Node that aborted the run, when the failure belongs to a stage.
    pub fn failed_node(&self) -> Option<NodeId> {
        match self {
            Self::StageFailed { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// Final outcome of an operation run through the retry executor.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("max_attempts must be >= 1 (got {max_attempts})")]
    InvalidPolicy { max_attempts: u32 },

    #[error("{stage} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        stage: String,
        attempts: u32,
        #[source]
        last_error: AttemptError,
    },
}

impl RetryError {
    /// Number of attempts made before giving up (zero for policy errors).
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidPolicy { .. } => 0,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// A single failed attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Operation timed out after {} second(s)", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl AttemptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// Typed failures from the model branch executor.
#[derive(Debug, Error)]
pub enum BranchError {
    #[error("{branch} context exceeds its token budget: {tokens} > {budget}")]
    TokenBudgetExceeded {
        branch: String,
        tokens: usize,
        budget: usize,
    },
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
