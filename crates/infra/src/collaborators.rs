//! External collaborator hooks triggered by synchronization runs.

use std::collections::BTreeSet;
use std::sync::Mutex;

use supplysync_core::{SupplierId, SupplyItemId};

/// Failure reported by a downstream cascade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cascade failed: {0}")]
pub struct CascadeError(pub String);

impl CascadeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Derived price / availability recomputation for a batch of touched items.
///
/// Invoked once per closed `DeltaScope`, never per row.
pub trait PriceCascade: Send + Sync {
    fn recompute(
        &self,
        supplier: SupplierId,
        items: &BTreeSet<SupplyItemId>,
    ) -> Result<(), CascadeError>;
}

/// Category tree cache owned by the storefront. Idempotent.
pub trait CategoryCacheInvalidator: Send + Sync {
    fn invalidate(&self, supplier: SupplierId);
}

/// Collaborators that only trace what they would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCollaborators;

impl PriceCascade for TracingCollaborators {
    fn recompute(
        &self,
        supplier: SupplierId,
        items: &BTreeSet<SupplyItemId>,
    ) -> Result<(), CascadeError> {
        tracing::info!(%supplier, items = items.len(), "price cascade requested");
        Ok(())
    }
}

impl CategoryCacheInvalidator for TracingCollaborators {
    fn invalidate(&self, supplier: SupplierId) {
        tracing::info!(%supplier, "category cache invalidation requested");
    }
}

/// Records every cascade call (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingCascade {
    calls: Mutex<Vec<(SupplierId, BTreeSet<SupplyItemId>)>>,
    fail_with: Option<String>,
}

impl RecordingCascade {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cascade that records the call and then fails.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            calls: Mutex::default(),
            fail_with: Some(msg.into()),
        }
    }

    pub fn calls(&self) -> Vec<(SupplierId, BTreeSet<SupplyItemId>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl PriceCascade for RecordingCascade {
    fn recompute(
        &self,
        supplier: SupplierId,
        items: &BTreeSet<SupplyItemId>,
    ) -> Result<(), CascadeError> {
        self.calls
            .lock()
            .map_err(|_| CascadeError::new("recording lock poisoned"))?
            .push((supplier, items.clone()));
        match &self.fail_with {
            Some(msg) => Err(CascadeError::new(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Counts invalidations per supplier (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    calls: Mutex<Vec<SupplierId>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SupplierId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CategoryCacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, supplier: SupplierId) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(supplier);
        }
    }
}
