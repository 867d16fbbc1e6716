//! Quick stock updater: create-free stock level sync from the secondary feed.
//!
//! Known keys are loaded once per updater, so each call costs O(incoming
//! pairs) rather than O(catalog). Every known pair gets an audit entry, as in
//! a full sync; unknown codes are only counted.

mod xml;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use supplysync_catalog::{
    Candidates, ChangeDetector, FieldPolicy, FieldRule, FieldValue, ItemField, NumberLocale,
    StockFeedLayout, Supplier, SupplierProfile,
};
use supplysync_core::{RunId, SupplyItemId};

pub use xml::{StockFeed, StockLevel, read_stock_levels};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome, NoopAuditLog};
use crate::cancel::CancellationToken;
use crate::collaborators::{PriceCascade, TracingCollaborators};
use crate::delta::{DeltaScope, ScopeExit};
use crate::store::SupplyItemStore;
use crate::sync::{FeedError, RunCompletion, SyncError};

const STOCK_RULE: [FieldRule; 1] = [FieldRule {
    field: ItemField::Stock,
    policy: FieldPolicy::OverwriteIfDifferent,
}];

/// Per-call counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickStockSummary {
    pub run_id: RunId,
    pub updated: usize,
    pub unchanged: usize,
    pub ignored_unknown: usize,
    /// Feed items dropped by the XML reader.
    pub rejected: usize,
    pub failed: usize,
    pub completion: RunCompletion,
    pub cascade: ScopeExit,
}

impl core::fmt::Display for QuickStockSummary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "updated={} unchanged={} ignored_unknown={} rejected={} failed={}",
            self.updated, self.unchanged, self.ignored_unknown, self.rejected, self.failed
        )
    }
}

pub struct QuickStockUpdater<S> {
    store: S,
    supplier: Supplier,
    layout: StockFeedLayout,
    locale: NumberLocale,
    known: HashMap<String, SupplyItemId>,
    audit: Arc<dyn AuditLog>,
    cascade: Arc<dyn PriceCascade>,
    cancel: CancellationToken,
}

impl<S> core::fmt::Debug for QuickStockUpdater<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuickStockUpdater")
            .field("supplier", &self.supplier)
            .field("known", &self.known.len())
            .finish_non_exhaustive()
    }
}

impl<S> QuickStockUpdater<S>
where
    S: SupplyItemStore,
{
    /// Resolve the profile's supplier and load its known keys.
    pub fn new(store: S, profile: &SupplierProfile) -> Result<Self, SyncError> {
        profile.validate()?;
        let supplier = store.find_or_create_supplier(&profile.supplier_name)?;
        let mut updater = Self {
            store,
            supplier,
            layout: profile.stock_feed.clone(),
            locale: profile.number_locale.clone(),
            known: HashMap::new(),
            audit: Arc::new(NoopAuditLog),
            cascade: Arc::new(TracingCollaborators),
            cancel: CancellationToken::new(),
        };
        updater.refresh_known_keys()?;
        Ok(updater)
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_cascade(mut self, cascade: Arc<dyn PriceCascade>) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reload the known-key set (e.g. after a full sync created items).
    ///
    /// Deleted items stay known: their stock is still mirrored.
    pub fn refresh_known_keys(&mut self) -> Result<(), SyncError> {
        self.known = self
            .store
            .snapshot_codes(self.supplier.id)?
            .into_iter()
            .map(|(code, state)| (code, state.id))
            .collect();
        debug!(supplier = %self.supplier.name, known = self.known.len(), "known keys loaded");
        Ok(())
    }

    pub fn known_keys(&self) -> usize {
        self.known.len()
    }

    pub fn supplier(&self) -> &Supplier {
        &self.supplier
    }

    pub fn enter_scope(&self) -> DeltaScope {
        DeltaScope::enter(self.supplier.id, self.cascade.clone())
    }

    pub fn update_from_file(&self, path: impl AsRef<Path>) -> Result<QuickStockSummary, SyncError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            SyncError::FeedSourceUnavailable(FeedError::Unavailable {
                path: path.to_path_buf(),
                source,
            })
        })?;
        self.update_from_reader(BufReader::new(file))
    }

    /// Parse the whole feed, then apply it inside a scope of its own.
    pub fn update_from_reader<R: BufRead>(&self, reader: R) -> Result<QuickStockSummary, SyncError> {
        let feed = read_stock_levels(reader, &self.layout, &self.locale)
            .map_err(SyncError::FeedSourceUnavailable)?;

        let mut scope = self.enter_scope();
        let mut summary = self.apply(&feed.levels, &mut scope);
        summary.rejected = feed.rejected;
        summary.cascade = scope.exit();
        info!(run_id = %summary.run_id, summary = %summary, "quick stock update finished");
        Ok(summary)
    }

    /// Apply stock levels inside a caller-owned scope. Unknown codes are
    /// dropped; no item is ever created here.
    pub fn apply(&self, levels: &[StockLevel], scope: &mut DeltaScope) -> QuickStockSummary {
        let mut summary = QuickStockSummary {
            run_id: RunId::new(),
            updated: 0,
            unchanged: 0,
            ignored_unknown: 0,
            rejected: 0,
            failed: 0,
            completion: RunCompletion::Completed,
            cascade: ScopeExit::Nested,
        };
        let detector = ChangeDetector::new(&STOCK_RULE);

        scope.reenter();
        for level in levels {
            if self.cancel.is_cancelled() {
                warn!(run_id = %summary.run_id, "quick stock update cancelled");
                summary.completion = RunCompletion::Cancelled;
                break;
            }
            let Some(&id) = self.known.get(level.code.as_str()) else {
                summary.ignored_unknown += 1;
                continue;
            };

            let mut item = match self.store.get(id) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    self.fail(&mut summary, &level.code, id, "known item missing from store".to_string());
                    continue;
                }
                Err(err) => {
                    self.fail(&mut summary, &level.code, id, err.to_string());
                    continue;
                }
            };

            let candidates = Candidates::single(ItemField::Stock, FieldValue::Integer(level.quantity));
            let changes = detector.detect(&item, &candidates);
            if changes.is_empty() {
                summary.unchanged += 1;
                self.record(
                    AuditEntry::new(summary.run_id, self.supplier.id, AuditOutcome::Unchanged, &level.code, Utc::now())
                        .with_item(id),
                );
                continue;
            }
            if let Err(err) = changes.apply_to(&mut item) {
                self.fail(&mut summary, &level.code, id, err.to_string());
                continue;
            }
            item.touch(Utc::now());
            if let Err(err) = self.store.update(&item) {
                self.fail(&mut summary, &level.code, id, err.to_string());
                continue;
            }

            summary.updated += 1;
            scope.touch(id);
            debug!(run_id = %summary.run_id, code = %level.code, changes = %changes, "stock updated");
            self.record(
                AuditEntry::new(summary.run_id, self.supplier.id, AuditOutcome::Updated, &level.code, Utc::now())
                    .with_item(id)
                    .with_changes(changes),
            );
        }
        summary.cascade = scope.exit();
        summary
    }

    fn fail(&self, summary: &mut QuickStockSummary, code: &str, id: SupplyItemId, detail: String) {
        summary.failed += 1;
        error!(run_id = %summary.run_id, code, error = %detail, "stock update failed");
        self.record(
            AuditEntry::new(summary.run_id, self.supplier.id, AuditOutcome::Failed, code, Utc::now())
                .with_item(id)
                .with_detail(detail),
        );
    }

    fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.record(&entry) {
            warn!(code = %entry.code, error = %err, "audit sink failed");
        }
    }
}
