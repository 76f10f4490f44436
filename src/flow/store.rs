//! Typed stores over the flow database: the append-only transition log, the
//! per-node state snapshots used by resume, and the scanner stage output.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::db::{DbHandle, ScannerRunRecord, TransitionRecord};
use super::node::{NodeId, NodeState};
use super::state::FlowState;
use crate::redaction::redact_text;
use crate::schema::ScannerOutput;

#[derive(Clone)]
pub struct TransitionStore {
    db: DbHandle,
}

impl TransitionStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Append one transition. The reason is redacted before it is stored.
    pub async fn record(
        &self,
        run_id: &str,
        node_id: NodeId,
        from_state: NodeState,
        to_state: NodeState,
        reason: Option<&str>,
    ) -> Result<i64> {
        let run_id = run_id.to_string();
        let reason = reason.map(redact_text);
        self.db
            .call(move |db| {
                db.insert_transition(
                    &run_id,
                    node_id,
                    from_state,
                    to_state,
                    Utc::now(),
                    reason.as_deref(),
                )
            })
            .await
    }

    pub async fn list(&self, run_id: &str) -> Result<Vec<TransitionRecord>> {
        let run_id = run_id.to_string();
        self.db.call(move |db| db.list_transitions(&run_id)).await
    }
}

#[derive(Clone)]
pub struct CheckpointStore {
    db: DbHandle,
}

impl CheckpointStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Persist the full state keyed by `(run_key, node_id)`.
    pub async fn save(&self, run_key: &str, node_id: NodeId, state: &FlowState) -> Result<()> {
        let run_key = run_key.to_string();
        let json = serde_json::to_string(state).context("Failed to serialize flow state")?;
        self.db
            .call(move |db| db.upsert_checkpoint(&run_key, node_id, &json))
            .await
    }

    pub async fn load_latest(&self, run_key: &str) -> Result<Option<FlowState>> {
        let key = run_key.to_string();
        let json = self.db.call(move |db| db.latest_checkpoint(&key)).await?;
        json.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("Corrupt checkpoint for run {}", run_key))
        })
        .transpose()
    }
}

/// Run status written alongside a persisted scanner output.
pub const SCANNER_COMPLETED: &str = "scanner_completed";

/// Scanner outputs keyed by run, with the resolved source location.
#[derive(Clone)]
pub struct ScannerStore {
    db: DbHandle,
}

impl ScannerStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub async fn save(
        &self,
        output: &ScannerOutput,
        resolved_path: &Path,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let run = ScannerRunRecord {
            run_id: output.run_id.clone(),
            schema_version: output.schema_version.clone(),
            repo_name: output.repo_profile.repo_name.clone(),
            resolved_path: resolved_path.display().to_string(),
            status: SCANNER_COMPLETED.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Some(Utc::now().to_rfc3339()),
        };
        let json = serde_json::to_string(output).context("Failed to serialize scanner output")?;
        self.db
            .call(move |db| db.upsert_scanner_output(&run, &json))
            .await
    }

    pub async fn run(&self, run_id: &str) -> Result<Option<ScannerRunRecord>> {
        let run_id = run_id.to_string();
        self.db.call(move |db| db.get_scanner_run(&run_id)).await
    }

    pub async fn load(&self, run_id: &str) -> Result<Option<ScannerOutput>> {
        let key = run_id.to_string();
        let json = self.db.call(move |db| db.get_scanner_output(&key)).await?;
        json.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("Corrupt scanner output for run {}", run_id))
        })
        .transpose()
    }
}
