//! Append-only, per-run audit record of reconciliation outcomes.
//!
//! Auditing is diagnostic only. Engines trap every `AuditError` and trace it;
//! a failing sink never changes reconciliation control flow.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplysync_catalog::Changeset;
use supplysync_core::{RunId, SupplierId, SupplyItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Created,
    Updated,
    Unchanged,
    Failed,
    MarkedDeleted,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Created => "created",
            AuditOutcome::Updated => "updated",
            AuditOutcome::Unchanged => "unchanged",
            AuditOutcome::Failed => "failed",
            AuditOutcome::MarkedDeleted => "marked_deleted",
        }
    }
}

/// One audited row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub run_id: RunId,
    pub supplier: SupplierId,
    pub outcome: AuditOutcome,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<SupplyItemId>,
    /// Present for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Changeset>,
    /// Error detail for failures, warnings for creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(
        run_id: RunId,
        supplier: SupplierId,
        outcome: AuditOutcome,
        code: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            at,
            run_id,
            supplier,
            outcome,
            code: code.into(),
            item_id: None,
            changes: None,
            detail: None,
        }
    }

    pub fn with_item(mut self, id: SupplyItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    pub fn with_changes(mut self, changes: Changeset) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("audit sink lock poisoned")]
    Poisoned,
}

/// Audit sink.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLog;

impl AuditLog for NoopAuditLog {
    fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Keeps entries in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn with_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.outcome == outcome)
            .collect()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }
}

/// One JSON object per line, appended to a file.
#[derive(Debug)]
pub struct JsonLinesAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesAuditLog {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// `<dir>/supplier_import_<timestamp>.log` for a run started at `started`.
    pub fn create_for_run(dir: &Path, started: DateTime<Utc>) -> Result<Self, AuditError> {
        Self::create(dir.join(run_file_name(started)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn run_file_name(started: DateTime<Utc>) -> String {
    format!("supplier_import_{}.log", started.format("%Y%m%d%H%M%S"))
}

impl AuditLog for JsonLinesAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut writer = self.writer.lock().map_err(|_| AuditError::Poisoned)?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        // Entries must survive a crash mid-run.
        writer.flush()?;
        Ok(())
    }
}
