//! Full-sync reconciliation of a supplier feed against the local mirror.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use supplysync_catalog::{
    Candidates, ChangeDetector, ItemStatus, Supplier, SupplierProfile, SupplyItem, parse_line,
};
use supplysync_core::{RunId, SupplyItemId};

use super::error::{FeedError, SyncError};
use super::lines::FeedLines;
use super::summary::{RunCompletion, RunSummary};
use crate::audit::{AuditEntry, AuditLog, AuditOutcome, NoopAuditLog};
use crate::cancel::CancellationToken;
use crate::collaborators::{CategoryCacheInvalidator, PriceCascade, TracingCollaborators};
use crate::delta::DeltaScope;
use crate::store::SupplyItemStore;

/// One reconciliation engine per supplier profile.
///
/// Runs for the same supplier must be serialized by the caller: the key
/// snapshot and the seen-set of concurrent runs would race.
pub struct ReconciliationEngine<S> {
    store: S,
    profile: SupplierProfile,
    supplier: Supplier,
    audit: Arc<dyn AuditLog>,
    cascade: Arc<dyn PriceCascade>,
    category_cache: Arc<dyn CategoryCacheInvalidator>,
    cancel: CancellationToken,
}

impl<S> core::fmt::Debug for ReconciliationEngine<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("profile", &self.profile.name)
            .field("supplier", &self.supplier)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for one run.
struct RunState {
    summary: RunSummary,
    seen: HashSet<String>,
}

impl<S> ReconciliationEngine<S>
where
    S: SupplyItemStore,
{
    /// Validate the profile and find (or create) its supplier.
    pub fn new(store: S, profile: SupplierProfile) -> Result<Self, SyncError> {
        profile.validate()?;
        let supplier = store.find_or_create_supplier(&profile.supplier_name)?;
        let collaborators = Arc::new(TracingCollaborators);
        Ok(Self {
            store,
            profile,
            supplier,
            audit: Arc::new(NoopAuditLog),
            cascade: collaborators.clone(),
            category_cache: collaborators,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_cascade(mut self, cascade: Arc<dyn PriceCascade>) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_category_cache(mut self, category_cache: Arc<dyn CategoryCacheInvalidator>) -> Self {
        self.category_cache = category_cache;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn supplier(&self) -> &Supplier {
        &self.supplier
    }

    pub fn profile(&self) -> &SupplierProfile {
        &self.profile
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open a delta scope bound to this engine's supplier and cascade.
    pub fn enter_scope(&self) -> DeltaScope {
        DeltaScope::enter(self.supplier.id, self.cascade.clone())
    }

    pub fn full_sync_file(&self, path: impl AsRef<Path>) -> Result<RunSummary, SyncError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            SyncError::FeedSourceUnavailable(FeedError::Unavailable {
                path: path.to_path_buf(),
                source,
            })
        })?;
        self.full_sync(BufReader::new(file))
    }

    /// Full sync inside a scope of its own; the cascade fires on return.
    pub fn full_sync<R: BufRead>(&self, reader: R) -> Result<RunSummary, SyncError> {
        let mut scope = self.enter_scope();
        let result = self.full_sync_within(reader, &mut scope);
        let exit = scope.exit();
        match result {
            Ok(mut summary) => {
                summary.cascade = exit;
                Ok(summary)
            }
            Err(SyncError::FeedRead { lines, source, .. }) => Err(SyncError::FeedRead {
                lines,
                source,
                cascade: exit,
            }),
            Err(err) => Err(err),
        }
    }

    /// Full sync nested inside a caller-owned scope (batching several runs
    /// into one cascade).
    pub fn full_sync_within<R: BufRead>(
        &self,
        reader: R,
        scope: &mut DeltaScope,
    ) -> Result<RunSummary, SyncError> {
        let started = Utc::now();
        let supplier = self.supplier.id;
        let snapshot = self.store.snapshot_codes(supplier)?;

        let mut lines = FeedLines::new(reader);
        match lines.next_line() {
            Ok(Some(_header)) => {}
            Ok(None) => return Err(SyncError::EmptyFeed),
            Err(err) => return Err(SyncError::FeedSourceUnavailable(FeedError::Read(err))),
        }

        let mut run = RunState {
            summary: RunSummary::start(RunId::new(), supplier, started),
            seen: HashSet::with_capacity(snapshot.len()),
        };
        info!(
            run_id = %run.summary.run_id,
            supplier = %self.supplier.name,
            known = snapshot.len(),
            "full sync started"
        );

        scope.reenter();
        let mut read_error = None;
        loop {
            if self.cancel.is_cancelled() {
                warn!(run_id = %run.summary.run_id, "full sync cancelled, skipping soft-delete");
                run.summary.completion = RunCompletion::Cancelled;
                break;
            }
            match lines.next_line() {
                Ok(Some(line)) => self.reconcile_line(&line, &mut run, scope),
                Ok(None) => break,
                Err(err) => {
                    error!(run_id = %run.summary.run_id, error = %err, "feed read failed mid-stream");
                    read_error = Some(err);
                    break;
                }
            }
        }

        self.category_cache.invalidate(supplier);

        if read_error.is_none() && run.summary.completion == RunCompletion::Completed {
            let mut missing: Vec<(&String, SupplyItemId)> = snapshot
                .iter()
                .filter(|(code, state)| {
                    state.status == ItemStatus::Active && !run.seen.contains(code.as_str())
                })
                .map(|(code, state)| (code, state.id))
                .collect();
            missing.sort();
            for (code, id) in missing {
                self.soft_delete(code, id, &mut run, scope);
            }
        }

        run.summary.cascade = scope.exit();
        run.summary.finished_at = Utc::now();

        if let Some(err) = read_error {
            return Err(SyncError::FeedRead {
                lines: lines.lines_read(),
                source: FeedError::Read(err),
                cascade: run.summary.cascade,
            });
        }

        info!(run_id = %run.summary.run_id, summary = %run.summary, "full sync finished");
        Ok(run.summary)
    }

    fn reconcile_line(&self, line: &str, run: &mut RunState, scope: &mut DeltaScope) {
        let row = parse_line(line, &self.profile);
        let Some(code) = row.key() else {
            run.summary.skipped += 1;
            debug!(run_id = %run.summary.run_id, "skipping line without key");
            return;
        };
        let code = code.to_string();
        // Seen before lookup: a failed lookup must not lead to a soft-delete.
        run.seen.insert(code.clone());

        let candidates = Candidates::from_row(&row, &self.profile);
        for warning in candidates.warnings() {
            run.summary.coercion_warnings += 1;
            warn!(
                run_id = %run.summary.run_id,
                code = %code,
                field = ?warning.field,
                raw = %warning.raw,
                "numeric coercion failed"
            );
        }

        match self.store.find_by_code(self.supplier.id, &code) {
            Ok(None) => self.create(&code, &candidates, run, scope),
            Ok(Some(item)) => self.update(item, &candidates, run, scope),
            Err(err) => self.fail(run, &code, None, err.to_string()),
        }
    }

    fn create(&self, code: &str, candidates: &Candidates, run: &mut RunState, scope: &mut DeltaScope) {
        let item = match candidates.build_item(self.supplier.id, code, Utc::now()) {
            Ok(item) => item,
            Err(err) => return self.fail(run, code, None, err.to_string()),
        };
        let id = item.id();
        if let Err(err) = self.store.insert(item) {
            return self.fail(run, code, None, err.to_string());
        }

        run.summary.created += 1;
        scope.touch(id);
        debug!(run_id = %run.summary.run_id, code, "created");

        let mut entry = self.entry(run, AuditOutcome::Created, code).with_item(id);
        if !candidates.warnings().is_empty() {
            let fields: Vec<String> = candidates
                .warnings()
                .iter()
                .map(|w| format!("{:?}={:?}", w.field, w.raw))
                .collect();
            entry = entry.with_detail(format!("defaulted unparseable values: {}", fields.join(", ")));
        }
        self.record(entry);
    }

    fn update(
        &self,
        mut item: SupplyItem,
        candidates: &Candidates,
        run: &mut RunState,
        scope: &mut DeltaScope,
    ) {
        let code = item.supplier_product_code().to_string();
        let id = item.id();
        let changes = ChangeDetector::new(&self.profile.checked_fields).detect(&item, candidates);
        if changes.is_empty() {
            run.summary.unchanged += 1;
            self.record(self.entry(run, AuditOutcome::Unchanged, &code).with_item(id));
            return;
        }

        if let Err(err) = changes.apply_to(&mut item) {
            return self.fail(run, &code, Some(id), err.to_string());
        }
        item.touch(Utc::now());
        if let Err(err) = self.store.update(&item) {
            return self.fail(run, &code, Some(id), err.to_string());
        }

        run.summary.updated += 1;
        scope.touch(id);
        debug!(run_id = %run.summary.run_id, code = %code, changes = %changes, "updated");
        self.record(
            self.entry(run, AuditOutcome::Updated, &code)
                .with_item(id)
                .with_changes(changes),
        );
    }

    fn soft_delete(&self, code: &str, id: SupplyItemId, run: &mut RunState, scope: &mut DeltaScope) {
        let mut item = match self.store.get(id) {
            Ok(Some(item)) => item,
            Ok(None) => return self.fail(run, code, Some(id), "item vanished before soft-delete".to_string()),
            Err(err) => return self.fail(run, code, Some(id), err.to_string()),
        };
        if !item.mark_deleted(Utc::now()) {
            return;
        }
        if let Err(err) = self.store.update(&item) {
            return self.fail(run, code, Some(id), err.to_string());
        }

        run.summary.deleted += 1;
        scope.touch(id);
        debug!(run_id = %run.summary.run_id, code, "marked deleted");
        self.record(self.entry(run, AuditOutcome::MarkedDeleted, code).with_item(id));
    }

    fn fail(&self, run: &mut RunState, code: &str, id: Option<SupplyItemId>, detail: String) {
        run.summary.failed += 1;
        error!(run_id = %run.summary.run_id, code, error = %detail, "row failed");
        let mut entry = self.entry(run, AuditOutcome::Failed, code).with_detail(detail);
        if let Some(id) = id {
            entry = entry.with_item(id);
        }
        self.record(entry);
    }

    fn entry(&self, run: &RunState, outcome: AuditOutcome, code: &str) -> AuditEntry {
        AuditEntry::new(run.summary.run_id, self.supplier.id, outcome, code, Utc::now())
    }

    /// Best effort: audit failures are traced, never propagated.
    fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.record(&entry) {
            warn!(
                code = %entry.code,
                outcome = entry.outcome.as_str(),
                error = %err,
                "audit sink failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use supplysync_catalog::ItemField;

    use super::*;
    use crate::audit::{AuditError, InMemoryAuditLog};
    use crate::collaborators::{RecordingCascade, RecordingInvalidator};
    use crate::delta::ScopeExit;
    use crate::store::InMemorySupplyItemStore;

    const HEADER: &str = "code\tx\tname01\tname02\tstock\tweight\tx\tprice\tdesc01\tdesc02\n";

    fn line(code: &str, name: &str, stock: &str, price: &str) -> String {
        format!("{code}\t\t{name}\t\t{stock}\t0,5\t\t{price}\t\t\n")
    }

    fn feed(lines: &[String]) -> String {
        let mut feed = HEADER.to_string();
        for l in lines {
            feed.push_str(l);
        }
        feed
    }

    struct Fixture {
        store: Arc<InMemorySupplyItemStore>,
        audit: Arc<InMemoryAuditLog>,
        cascade: Arc<RecordingCascade>,
        cache: Arc<RecordingInvalidator>,
        engine: ReconciliationEngine<Arc<InMemorySupplyItemStore>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySupplyItemStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let cascade = Arc::new(RecordingCascade::new());
        let cache = Arc::new(RecordingInvalidator::new());
        let engine = ReconciliationEngine::new(store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_audit(audit.clone())
            .with_cascade(cascade.clone())
            .with_category_cache(cache.clone());
        Fixture {
            store,
            audit,
            cascade,
            cache,
            engine,
        }
    }

    fn run(f: &Fixture, lines: &[String]) -> RunSummary {
        f.engine.full_sync(feed(lines).as_bytes()).unwrap()
    }

    #[test]
    fn creates_unknown_keys() {
        let f = fixture();
        let summary = run(&f, &[line("1289", "Transferrolle", "4", "40,38")]);

        assert_eq!(summary.created, 1);
        assert_eq!(summary.cascade, ScopeExit::Fired { items: 1 });
        let item = f
            .store
            .find_by_code(f.engine.supplier().id, "1289")
            .unwrap()
            .unwrap();
        assert_eq!(item.name(), "Transferrolle");
        assert_eq!(item.stock(), 4);
        assert_eq!(item.purchase_price(), Decimal::new(4038, 2));
        assert_eq!(f.audit.with_outcome(AuditOutcome::Created).len(), 1);
    }

    #[test]
    fn rerun_is_idempotent() {
        let f = fixture();
        let lines = [line("1", "A", "1", "1,00"), line("2", "B", "2", "2,00")];
        run(&f, &lines);
        let second = run(&f, &lines);

        assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 2));
        assert_eq!(second.cascade, ScopeExit::Empty);
        assert_eq!(f.cascade.call_count(), 1);
    }

    #[test]
    fn update_records_changeset() {
        let f = fixture();
        run(&f, &[line("2313", "Toner", "3", "24,49")]);
        let summary = run(&f, &[line("2313", "Toner", "100", "24,49")]);

        assert_eq!(summary.updated, 1);
        let updates = f.audit.with_outcome(AuditOutcome::Updated);
        let changes = updates[0].changes.as_ref().unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes.get(ItemField::Stock).is_some());
    }

    #[test]
    fn zero_price_does_not_overwrite() {
        let f = fixture();
        run(&f, &[line("5509", "Tinte", "5", "25,00")]);
        let summary = run(&f, &[line("5509", "Tinte", "5", "0")]);

        assert_eq!(summary.unchanged, 1);
        let item = f.store.find_by_code(f.engine.supplier().id, "5509").unwrap().unwrap();
        assert_eq!(item.purchase_price(), Decimal::new(2500, 2));
    }

    #[test]
    fn blank_key_lines_are_skipped_not_failed() {
        let f = fixture();
        let summary = run(&f, &[line("  ", "Nameless", "1", "1"), line("7", "Seven", "1", "1")]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn invalid_rows_fail_and_the_run_continues() {
        let f = fixture();
        let summary = run(&f, &[line("1", "", "1", "1"), line("2", "Valid", "1", "1")]);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        let failed = f.audit.with_outcome(AuditOutcome::Failed);
        assert!(failed[0].detail.as_ref().unwrap().contains("name cannot be empty"));
    }

    #[test]
    fn coercion_failure_defaults_on_create() {
        let f = fixture();
        let summary = run(&f, &[line("9", "Nine", "viele", "1,00")]);

        assert_eq!(summary.created, 1);
        assert_eq!(summary.coercion_warnings, 1);
        let item = f.store.find_by_code(f.engine.supplier().id, "9").unwrap().unwrap();
        assert_eq!(item.stock(), 0);
        let created = f.audit.with_outcome(AuditOutcome::Created);
        assert!(created[0].detail.as_ref().unwrap().contains("viele"));
    }

    #[test]
    fn missing_keys_are_soft_deleted_once() {
        let f = fixture();
        run(&f, &[line("1", "A", "1", "1"), line("2", "B", "1", "1")]);

        let first = run(&f, &[line("1", "A", "1", "1")]);
        assert_eq!(first.deleted, 1);
        let second = run(&f, &[line("1", "A", "1", "1")]);
        assert_eq!(second.deleted, 0);

        let item = f.store.find_by_code(f.engine.supplier().id, "2").unwrap().unwrap();
        assert_eq!(item.status(), ItemStatus::Deleted);
        assert_eq!(f.audit.with_outcome(AuditOutcome::MarkedDeleted).len(), 1);
    }

    #[test]
    fn header_only_feed_deletes_everything() {
        let f = fixture();
        run(&f, &[line("1", "A", "1", "1")]);
        let summary = run(&f, &[]);
        assert_eq!(summary.deleted, 1);
    }

    #[test]
    fn empty_feed_is_rejected_before_reconciling() {
        let f = fixture();
        run(&f, &[line("1", "A", "1", "1")]);

        let err = f.engine.full_sync(&b""[..]).unwrap_err();
        assert!(matches!(err, SyncError::EmptyFeed));
        let item = f.store.find_by_code(f.engine.supplier().id, "1").unwrap().unwrap();
        assert!(item.is_active());
    }

    #[test]
    fn duplicate_keys_last_occurrence_wins() {
        let f = fixture();
        let summary = run(&f, &[line("1", "First", "1", "1"), line("1", "Second", "7", "1")]);

        assert_eq!((summary.created, summary.updated), (1, 1));
        let item = f.store.find_by_code(f.engine.supplier().id, "1").unwrap().unwrap();
        assert_eq!(item.stock(), 7);
        // Name is not a checked field; the first sighting's name stays.
        assert_eq!(item.name(), "First");
    }

    #[test]
    fn category_cache_invalidated_once_per_run() {
        let f = fixture();
        run(&f, &[line("1", "A", "1", "1"), line("2", "B", "1", "1")]);
        assert_eq!(f.cache.calls(), vec![f.engine.supplier().id]);
    }

    #[test]
    fn missing_feed_file_is_fatal() {
        let f = fixture();
        let err = f.engine.full_sync_file("/nonexistent/alltron.csv").unwrap_err();
        assert!(matches!(
            err,
            SyncError::FeedSourceUnavailable(FeedError::Unavailable { .. })
        ));
        assert_eq!(f.cascade.call_count(), 0);
    }

    struct BrokenAudit;

    impl AuditLog for BrokenAudit {
        fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Poisoned)
        }
    }

    #[test]
    fn audit_failures_do_not_affect_the_run() {
        let store = Arc::new(InMemorySupplyItemStore::new());
        let engine = ReconciliationEngine::new(store, SupplierProfile::alltron())
            .unwrap()
            .with_audit(Arc::new(BrokenAudit));
        let summary = engine.full_sync(feed(&[line("1", "A", "1", "1")]).as_bytes()).unwrap();
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn invalid_profile_is_rejected() {
        let mut profile = SupplierProfile::alltron();
        profile.supplier_name = " ".to_string();
        let err = ReconciliationEngine::new(InMemorySupplyItemStore::new(), profile).unwrap_err();
        assert!(matches!(err, SyncError::InvalidProfile(_)));
    }
}
