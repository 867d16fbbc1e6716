//! Delta-suspension scope: defers downstream cascades until a batch is done.
//!
//! A scope value replaces any process-wide "suspend deltas" flag. While it is
//! open, mutations only record the touched item id. Closing the outermost
//! level fires the cascade once over the whole touched set, and only if that
//! set is non-empty.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use supplysync_core::{SupplierId, SupplyItemId};

use crate::collaborators::PriceCascade;

/// What closing one scope level did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeExit {
    /// An inner level closed; the scope is still open.
    Nested,
    /// The outermost level closed with nothing touched.
    Empty,
    Fired { items: usize },
    Failed { items: usize, error: String },
    /// Touched state was dropped deliberately.
    Abandoned { items: usize, reason: String },
    AlreadyClosed,
}

/// Reentrant deferral context for one supplier.
pub struct DeltaScope {
    supplier: SupplierId,
    cascade: Arc<dyn PriceCascade>,
    depth: usize,
    touched: BTreeSet<SupplyItemId>,
}

impl core::fmt::Debug for DeltaScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeltaScope")
            .field("supplier", &self.supplier)
            .field("depth", &self.depth)
            .field("touched", &self.touched.len())
            .finish_non_exhaustive()
    }
}

impl DeltaScope {
    /// Open a scope at depth 1.
    pub fn enter(supplier: SupplierId, cascade: Arc<dyn PriceCascade>) -> Self {
        Self {
            supplier,
            cascade,
            depth: 1,
            touched: BTreeSet::new(),
        }
    }

    /// Open a nested level. Reopening a closed scope starts a fresh batch.
    pub fn reenter(&mut self) {
        self.depth += 1;
    }

    pub fn touch(&mut self, item: SupplyItemId) {
        if self.depth == 0 {
            tracing::warn!(supplier = %self.supplier, %item, "touch on a closed delta scope");
        }
        self.touched.insert(item);
    }

    pub fn supplier(&self) -> SupplierId {
        self.supplier
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Close one level. Only the outermost close fires the cascade.
    pub fn exit(&mut self) -> ScopeExit {
        match self.depth {
            0 => ScopeExit::AlreadyClosed,
            1 => {
                self.depth = 0;
                self.fire()
            }
            _ => {
                self.depth -= 1;
                ScopeExit::Nested
            }
        }
    }

    /// Close every level without firing, dropping the touched set.
    pub fn abandon(&mut self, reason: impl Into<String>) -> ScopeExit {
        if self.depth == 0 {
            return ScopeExit::AlreadyClosed;
        }
        let reason = reason.into();
        let items = std::mem::take(&mut self.touched).len();
        self.depth = 0;
        tracing::warn!(supplier = %self.supplier, items, %reason, "delta scope abandoned");
        ScopeExit::Abandoned { items, reason }
    }

    fn fire(&mut self) -> ScopeExit {
        let touched = std::mem::take(&mut self.touched);
        if touched.is_empty() {
            return ScopeExit::Empty;
        }
        let items = touched.len();
        match self.cascade.recompute(self.supplier, &touched) {
            Ok(()) => {
                tracing::info!(supplier = %self.supplier, items, "price cascade fired");
                ScopeExit::Fired { items }
            }
            Err(err) => {
                tracing::error!(supplier = %self.supplier, items, error = %err, "price cascade failed");
                ScopeExit::Failed {
                    items,
                    error: err.to_string(),
                }
            }
        }
    }
}

impl Drop for DeltaScope {
    fn drop(&mut self) {
        if self.depth > 0 {
            tracing::warn!(
                supplier = %self.supplier,
                depth = self.depth,
                "delta scope dropped while open, firing cascade"
            );
            self.depth = 0;
            let _ = self.fire();
        }
    }
}
