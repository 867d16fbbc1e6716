use chrono::{DateTime, Utc};
use serde::Serialize;

use supplysync_core::{RunId, SupplierId};

use crate::delta::ScopeExit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCompletion {
    Completed,
    /// Stopped early; the soft-delete phase did not run.
    Cancelled,
}

/// Per-run counts reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub supplier: SupplierId,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Data lines without a key.
    pub skipped: usize,
    pub coercion_warnings: usize,
    pub completion: RunCompletion,
    pub cascade: ScopeExit,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn start(run_id: RunId, supplier: SupplierId, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            supplier,
            created: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            failed: 0,
            skipped: 0,
            coercion_warnings: 0,
            completion: RunCompletion::Completed,
            cascade: ScopeExit::Nested,
            started_at,
            finished_at: started_at,
        }
    }

    /// Rows that reached a reconciliation decision.
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion == RunCompletion::Cancelled
    }
}

impl core::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "processed={} created={} updated={} unchanged={} deleted={} failed={} skipped={} warnings={}",
            self.processed(),
            self.created,
            self.updated,
            self.unchanged,
            self.deleted,
            self.failed,
            self.skipped,
            self.coercion_warnings
        )?;
        if self.is_cancelled() {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}
