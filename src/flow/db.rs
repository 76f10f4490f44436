use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use super::node::{NodeId, NodeState};

/// Async-safe handle to the flow database.
///
/// Wraps `FlowDb` behind `Arc<Mutex>` and runs every statement on tokio's
/// blocking pool via `spawn_blocking`, so SQLite I/O never stalls async
/// worker threads. Each call is a single insert, upsert, or read.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<FlowDb>>,
}

impl DbHandle {
    pub fn new(db: FlowDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Self::new(FlowDb::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(FlowDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&FlowDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// One node state transition. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransitionRecord {
    /// Insertion position; assigned by the database.
    pub id: i64,
    pub run_id: String,
    pub node_id: NodeId,
    pub from_state: NodeState,
    pub to_state: NodeState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Row of the `runs` table written when the scanner stage finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerRunRecord {
    pub run_id: String,
    pub schema_version: String,
    pub repo_name: String,
    pub resolved_path: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

pub struct FlowDb {
    conn: Connection,
}

impl FlowDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS flow_transitions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    from_state TEXT NOT NULL,
                    to_state TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    reason TEXT
                );

                CREATE TABLE IF NOT EXISTS flow_checkpoints (
                    run_key TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    state_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (run_key, node_id)
                );

                CREATE TABLE IF NOT EXISTS run_manifests (
                    run_id TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    payload_json TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    schema_version TEXT NOT NULL,
                    repo_name TEXT NOT NULL,
                    resolved_path TEXT NOT NULL,
                    status TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    finished_at TEXT
                );

                CREATE TABLE IF NOT EXISTS scanner_outputs (
                    run_id TEXT PRIMARY KEY REFERENCES runs(run_id),
                    payload_json TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_flow_transitions_run
                    ON flow_transitions(run_id);
                CREATE INDEX IF NOT EXISTS idx_flow_checkpoints_seq
                    ON flow_checkpoints(run_key, seq);
                ",
            )
            .context("Failed to create flow tables")?;
        Ok(())
    }

    // ── Transition log ────────────────────────────────────────────────

    pub fn insert_transition(
        &self,
        run_id: &str,
        node_id: NodeId,
        from_state: NodeState,
        to_state: NodeState,
        timestamp: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO flow_transitions
                    (run_id, node_id, from_state, to_state, timestamp, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    node_id.as_str(),
                    from_state.as_str(),
                    to_state.as_str(),
                    timestamp.to_rfc3339(),
                    reason
                ],
            )
            .context("Failed to insert flow transition")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All transitions for a run in insertion order.
    pub fn list_transitions(&self, run_id: &str) -> Result<Vec<TransitionRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, run_id, node_id, from_state, to_state, timestamp, reason
                 FROM flow_transitions WHERE run_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_transitions")?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .context("Failed to query flow transitions")?;

        let mut records = Vec::new();
        for row in rows {
            let (id, run_id, node_id, from_state, to_state, timestamp, reason) =
                row.context("Failed to read transition row")?;
            records.push(TransitionRecord {
                id,
                run_id,
                node_id: node_id.parse()?,
                from_state: from_state.parse()?,
                to_state: to_state.parse()?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Invalid transition timestamp '{}'", timestamp))?
                    .with_timezone(&Utc),
                reason,
            });
        }
        Ok(records)
    }

    // ── Checkpoints ───────────────────────────────────────────────────

    /// Upsert the snapshot for `(run_key, node_id)` and make it the latest.
    pub fn upsert_checkpoint(
        &self,
        run_key: &str,
        node_id: NodeId,
        state_json: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO flow_checkpoints (run_key, node_id, seq, state_json)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM flow_checkpoints), ?3)
                 ON CONFLICT(run_key, node_id) DO UPDATE SET
                    seq = excluded.seq,
                    state_json = excluded.state_json,
                    updated_at = datetime('now')",
                params![run_key, node_id.as_str(), state_json],
            )
            .context("Failed to upsert flow checkpoint")?;
        Ok(())
    }

    /// Most recently written snapshot for a run, if any.
    pub fn latest_checkpoint(&self, run_key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT state_json FROM flow_checkpoints WHERE run_key = ?1
                 ORDER BY seq DESC LIMIT 1",
            )
            .context("Failed to prepare latest_checkpoint")?;
        let mut rows = stmt
            .query_map(params![run_key], |row| row.get::<_, String>(0))
            .context("Failed to query flow checkpoints")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read checkpoint row")?)),
            None => Ok(None),
        }
    }

    // ── Run manifests ─────────────────────────────────────────────────

    pub fn upsert_manifest(
        &self,
        run_id: &str,
        created_at: &str,
        payload_json: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO run_manifests (run_id, created_at, payload_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(run_id) DO UPDATE SET
                    created_at = excluded.created_at,
                    payload_json = excluded.payload_json",
                params![run_id, created_at, payload_json],
            )
            .context("Failed to upsert run manifest")?;
        Ok(())
    }

    pub fn get_manifest(&self, run_id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM run_manifests WHERE run_id = ?1")
            .context("Failed to prepare get_manifest")?;
        let mut rows = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))
            .context("Failed to query run manifests")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read manifest row")?)),
            None => Ok(None),
        }
    }

    // ── Scanner outputs ───────────────────────────────────────────────

    /// Upsert the run row and its scanner payload in one transaction.
    ///
    /// `started_at` is kept from the first write so a resumed scan does not
    /// move it.
    pub fn upsert_scanner_output(&self, run: &ScannerRunRecord, payload_json: &str) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin scanner output transaction")?;
        tx.execute(
            "INSERT INTO runs
                (run_id, schema_version, repo_name, resolved_path, status, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(run_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                repo_name = excluded.repo_name,
                resolved_path = excluded.resolved_path,
                status = excluded.status,
                finished_at = excluded.finished_at",
            params![
                run.run_id,
                run.schema_version,
                run.repo_name,
                run.resolved_path,
                run.status,
                run.started_at,
                run.finished_at
            ],
        )
        .context("Failed to upsert run row")?;
        tx.execute(
            "INSERT INTO scanner_outputs (run_id, payload_json) VALUES (?1, ?2)
             ON CONFLICT(run_id) DO UPDATE SET payload_json = excluded.payload_json",
            params![run.run_id, payload_json],
        )
        .context("Failed to upsert scanner output")?;
        tx.commit().context("Failed to commit scanner output")?;
        Ok(())
    }

    pub fn get_scanner_run(&self, run_id: &str) -> Result<Option<ScannerRunRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT run_id, schema_version, repo_name, resolved_path, status,
                        started_at, finished_at
                 FROM runs WHERE run_id = ?1",
            )
            .context("Failed to prepare get_scanner_run")?;
        let mut rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ScannerRunRecord {
                    run_id: row.get(0)?,
                    schema_version: row.get(1)?,
                    repo_name: row.get(2)?,
                    resolved_path: row.get(3)?,
                    status: row.get(4)?,
                    started_at: row.get(5)?,
                    finished_at: row.get(6)?,
                })
            })
            .context("Failed to query runs")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read run row")?)),
            None => Ok(None),
        }
    }

    pub fn get_scanner_output(&self, run_id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM scanner_outputs WHERE run_id = ?1")
            .context("Failed to prepare get_scanner_output")?;
        let mut rows = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))
            .context("Failed to query scanner outputs")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read scanner output row")?)),
            None => Ok(None),
        }
    }
}
