//! Integration tests for the full synchronization pipeline.
//!
//! Tests: Feed → Parser → ChangeDetector → Store → Audit → DeltaScope → Cascade
//!
//! Verifies:
//! - Full sync creates, updates, leaves alone and soft-deletes correctly
//! - Downstream products follow supply item deletions
//! - Quick stock updates never create items
//! - Persistence failures, cancellation and broken feeds are isolated

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::{self, BufReader, Read};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use supplysync_catalog::{ItemField, ItemStatus, Supplier, SupplierProfile, SupplyItem};
    use supplysync_core::{SupplierId, SupplyItemId};

    use crate::audit::{
        AuditEntry, AuditError, AuditLog, AuditOutcome, InMemoryAuditLog, JsonLinesAuditLog,
    };
    use crate::cancel::CancellationToken;
    use crate::collaborators::{RecordingCascade, RecordingInvalidator};
    use crate::delta::ScopeExit;
    use crate::products::ProductAvailabilityCascade;
    use crate::quick_stock::{QuickStockUpdater, StockLevel};
    use crate::store::{InMemorySupplyItemStore, KeySnapshot, StoreError, SupplyItemStore};
    use crate::sync::{ReconciliationEngine, RunCompletion, SyncError};

    const REMOVED: [u32; 15] = [
        1227, 1510, 1841, 1847, 2180, 2193, 2353, 2379, 3220, 4264, 5048, 5768, 5862, 5863, 8209,
    ];

    /// Codes of the 500-row catalog: the removed set plus 485 others.
    fn catalog_codes() -> Vec<u32> {
        let mut codes: Vec<u32> = REMOVED.to_vec();
        let mut next = 10_000;
        while codes.len() < 500 {
            codes.push(next);
            next += 7;
        }
        codes
    }

    fn alltron_row(code: u32) -> String {
        let mut columns = vec![String::new(); 20];
        columns[0] = code.to_string();
        columns[2] = format!("Artikel {code}");
        columns[3] = "schwarz".to_string();
        columns[4] = format!("{}", code % 50);
        columns[5] = "0,54".to_string();
        columns[7] = format!("{},90", code % 90 + 1);
        columns[8] = "Beschreibung".to_string();
        columns[11] = format!("MPN-{code}");
        columns[12] = "Brother".to_string();
        columns[17] = "Drucker".to_string();
        columns[18] = "Zubehör".to_string();
        columns[19] = "Farbbänder".to_string();
        columns.join("\t")
    }

    fn alltron_feed(codes: impl IntoIterator<Item = u32>) -> String {
        let mut feed = String::from("Artikelnummer\t...\tBezeichnung\n");
        for code in codes {
            feed.push_str(&alltron_row(code));
            feed.push('\n');
        }
        feed
    }

    struct Pipeline {
        store: Arc<InMemorySupplyItemStore>,
        audit: Arc<InMemoryAuditLog>,
        cascade: Arc<RecordingCascade>,
        engine: ReconciliationEngine<Arc<InMemorySupplyItemStore>>,
    }

    fn setup() -> Pipeline {
        let store = Arc::new(InMemorySupplyItemStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let cascade = Arc::new(RecordingCascade::new());
        let engine = ReconciliationEngine::new(store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_audit(audit.clone())
            .with_cascade(cascade.clone());
        Pipeline {
            store,
            audit,
            cascade,
            engine,
        }
    }

    fn supplier(p: &Pipeline) -> SupplierId {
        p.engine.supplier().id
    }

    fn item(p: &Pipeline, code: u32) -> SupplyItem {
        p.store
            .find_by_code(supplier(p), &code.to_string())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn scenario_a_initial_import_creates_everything_and_fires_once() {
        let p = setup();
        let summary = p.engine.full_sync(alltron_feed(catalog_codes()).as_bytes()).unwrap();

        assert_eq!(summary.created, 500);
        assert_eq!((summary.updated, summary.failed, summary.deleted), (0, 0, 0));
        assert_eq!(summary.cascade, ScopeExit::Fired { items: 500 });
        assert_eq!(p.cascade.call_count(), 1);
        assert_eq!(p.cascade.calls()[0].1.len(), 500);

        let sample = item(&p, 1227);
        assert_eq!(sample.name(), "Artikel 1227 schwarz");
        assert_eq!(sample.manufacturer(), "Brother");
        assert_eq!(sample.manufacturer_product_code(), "MPN-1227");
        assert_eq!(sample.categories(), ["Drucker", "Zubehör", "Farbbänder"]);
        assert_eq!(sample.stock(), 27);
    }

    #[test]
    fn scenario_b_rerun_is_idempotent() {
        let p = setup();
        let feed = alltron_feed(catalog_codes());
        p.engine.full_sync(feed.as_bytes()).unwrap();
        let before = p.store.snapshot().unwrap();

        let summary = p.engine.full_sync(feed.as_bytes()).unwrap();

        assert_eq!((summary.created, summary.updated), (0, 0));
        assert_eq!(summary.unchanged, 500);
        assert_eq!(summary.cascade, ScopeExit::Empty);
        assert_eq!(p.cascade.call_count(), 1);
        assert_eq!(p.store.snapshot().unwrap(), before);
    }

    #[test]
    fn scenario_c_removed_keys_are_deleted_and_products_disabled() {
        let store = Arc::new(InMemorySupplyItemStore::new());
        let products = Arc::new(ProductAvailabilityCascade::new(store.clone()));
        let engine = ReconciliationEngine::new(store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_cascade(products.clone());
        let supplier = engine.supplier().id;

        engine.full_sync(alltron_feed(catalog_codes()).as_bytes()).unwrap();
        let linked: Vec<_> = REMOVED
            .iter()
            .map(|code| {
                let item = store.find_by_code(supplier, &code.to_string()).unwrap().unwrap();
                let product = products.link(item.id()).unwrap();
                assert!(products.get(product).unwrap().available);
                product
            })
            .collect();
        let before = store.snapshot().unwrap();

        let remaining = catalog_codes().into_iter().filter(|c| !REMOVED.contains(c));
        let summary = engine.full_sync(alltron_feed(remaining).as_bytes()).unwrap();

        assert_eq!(summary.deleted, 15);
        assert_eq!(summary.unchanged, 485);
        assert_eq!(summary.cascade, ScopeExit::Fired { items: 15 });
        for code in REMOVED {
            let item = store.find_by_code(supplier, &code.to_string()).unwrap().unwrap();
            assert_eq!(item.status(), ItemStatus::Deleted);
        }
        for product in linked {
            assert!(!products.get(product).unwrap().available);
        }
        let after = store.snapshot().unwrap();
        let untouched = before
            .items
            .iter()
            .filter(|i| !REMOVED.iter().any(|c| c.to_string() == i.supplier_product_code()))
            .all(|i| after.items.contains(i));
        assert!(untouched);

        // Deleting again is a no-op.
        let remaining = catalog_codes().into_iter().filter(|c| !REMOVED.contains(c));
        let again = engine.full_sync(alltron_feed(remaining).as_bytes()).unwrap();
        assert_eq!(again.deleted, 0);
        assert_eq!(again.cascade, ScopeExit::Empty);
    }

    #[test]
    fn overflowing_product_price_fails_the_cascade_without_panicking() {
        let store = Arc::new(InMemorySupplyItemStore::new());
        let products =
            Arc::new(ProductAvailabilityCascade::new(store.clone()).with_markup(Decimal::from(2)));
        let engine = ReconciliationEngine::new(store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_cascade(products.clone());
        let supplier = engine.supplier().id;

        engine.full_sync(alltron_feed([1227]).as_bytes()).unwrap();
        let item = store.find_by_code(supplier, "1227").unwrap().unwrap();
        let product = products.link(item.id()).unwrap();
        let before = products.get(product).unwrap();

        let mut columns: Vec<String> = alltron_row(1227).split('\t').map(String::from).collect();
        columns[7] = "50000000000000000000000000000".to_string();
        let feed = format!("Artikelnummer\n{}\n", columns.join("\t"));
        let summary = engine.full_sync(feed.as_bytes()).unwrap();

        assert_eq!(summary.updated, 1);
        assert!(matches!(summary.cascade, ScopeExit::Failed { items: 1, .. }));
        assert_eq!(products.get(product).unwrap(), before);
    }

    #[test]
    fn scenario_d_quick_stock_ignores_unknown_and_updates_known() {
        let p = setup();
        p.engine.full_sync(alltron_feed([1227, 1510]).as_bytes()).unwrap();
        let audit = Arc::new(InMemoryAuditLog::new());
        let updater = QuickStockUpdater::new(p.store.clone(), &SupplierProfile::alltron())
            .unwrap()
            .with_audit(audit.clone());

        let xml = "<items>\
            <item><LITM>424242</LITM><STQU>5</STQU></item>\
            <item><LITM>1227</LITM><STQU>999</STQU></item>\
            <item><LITM>1510</LITM><STQU>10</STQU></item>\
        </items>";
        let summary = updater.update_from_reader(xml.as_bytes()).unwrap();

        assert_eq!(summary.ignored_unknown, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unchanged, 1);
        assert!(p.store.find_by_code(supplier(&p), "424242").unwrap().is_none());
        assert_eq!(p.store.len(), 2);

        let entries = audit.with_outcome(AuditOutcome::Updated);
        assert_eq!(entries.len(), 1);
        let changes = entries[0].changes.as_ref().unwrap();
        assert_eq!(changes.len(), 1);
        let stock = changes.get(ItemField::Stock).unwrap();
        assert_eq!(stock.old.to_string(), "27");
        assert_eq!(stock.new.to_string(), "999");
    }

    #[test]
    fn blank_feed_cells_never_erase_curated_values() {
        let p = setup();
        p.engine.full_sync(alltron_feed([1227]).as_bytes()).unwrap();

        let sparse = "header\n1227\t\tArtikel 1227\tschwarz\t27\t\t\t\t\n";
        let summary = p.engine.full_sync(sparse.as_bytes()).unwrap();

        assert_eq!(summary.unchanged, 1);
        let item = item(&p, 1227);
        assert_eq!(item.manufacturer(), "Brother");
        assert_eq!(item.categories()[2], "Farbbänder");
        assert_eq!(item.weight().to_string(), "0.54");
    }

    /// Fails writes for one key, delegating everything else.
    struct FlakyStore {
        inner: InMemorySupplyItemStore,
        poisoned_code: String,
    }

    impl FlakyStore {
        fn check(&self, item: &SupplyItem) -> Result<(), StoreError> {
            if item.supplier_product_code() == self.poisoned_code {
                return Err(StoreError::Storage("disk full".to_string()));
            }
            Ok(())
        }
    }

    impl SupplyItemStore for FlakyStore {
        fn find_or_create_supplier(&self, name: &str) -> Result<Supplier, StoreError> {
            self.inner.find_or_create_supplier(name)
        }

        fn get(&self, id: SupplyItemId) -> Result<Option<SupplyItem>, StoreError> {
            self.inner.get(id)
        }

        fn find_by_code(
            &self,
            supplier: SupplierId,
            code: &str,
        ) -> Result<Option<SupplyItem>, StoreError> {
            self.inner.find_by_code(supplier, code)
        }

        fn insert(&self, item: SupplyItem) -> Result<(), StoreError> {
            self.check(&item)?;
            self.inner.insert(item)
        }

        fn update(&self, item: &SupplyItem) -> Result<(), StoreError> {
            self.check(item)?;
            self.inner.update(item)
        }

        fn snapshot_codes(&self, supplier: SupplierId) -> Result<KeySnapshot, StoreError> {
            self.inner.snapshot_codes(supplier)
        }

        fn list(&self, supplier: SupplierId) -> Result<Vec<SupplyItem>, StoreError> {
            self.inner.list(supplier)
        }
    }

    #[test]
    fn persistence_failure_is_isolated_to_its_row() {
        let store = FlakyStore {
            inner: InMemorySupplyItemStore::new(),
            poisoned_code: "1510".to_string(),
        };
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = ReconciliationEngine::new(store, SupplierProfile::alltron())
            .unwrap()
            .with_audit(audit.clone());

        let summary = engine.full_sync(alltron_feed([1227, 1510, 1841]).as_bytes()).unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.failed, 1);
        let failed = audit.with_outcome(AuditOutcome::Failed);
        assert_eq!(failed[0].code, "1510");
        assert!(failed[0].detail.as_ref().unwrap().contains("disk full"));
        assert_eq!(engine.store().list(engine.supplier().id).unwrap().len(), 2);
    }

    /// Cancels the token once `after` items were created.
    struct CancellingAudit {
        token: CancellationToken,
        after: usize,
        created: AtomicUsize,
    }

    impl AuditLog for CancellingAudit {
        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            if entry.outcome == AuditOutcome::Created
                && self.created.fetch_add(1, Ordering::SeqCst) + 1 == self.after
            {
                self.token.cancel();
            }
            Ok(())
        }
    }

    #[test]
    fn cancellation_skips_soft_delete_but_still_fires_cascade() {
        let p = setup();
        p.engine.full_sync(alltron_feed([1, 2]).as_bytes()).unwrap();

        let token = CancellationToken::new();
        let cascade = Arc::new(RecordingCascade::new());
        let engine = ReconciliationEngine::new(p.store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_cascade(cascade.clone())
            .with_cancellation(token.clone())
            .with_audit(Arc::new(CancellingAudit {
                token,
                after: 2,
                created: AtomicUsize::new(0),
            }));

        // Items 1 and 2 are missing from this feed, but the run never finishes.
        let summary = engine.full_sync(alltron_feed([10, 11, 12, 13]).as_bytes()).unwrap();

        assert_eq!(summary.completion, RunCompletion::Cancelled);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.cascade, ScopeExit::Fired { items: 2 });
        assert_eq!(cascade.call_count(), 1);
        assert!(item(&p, 1).is_active());
    }

    /// Yields `data`, then fails.
    struct BrokenPipe {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "feed connection reset")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn mid_stream_read_error_keeps_applied_rows_and_skips_deletes() {
        let p = setup();
        p.engine.full_sync(alltron_feed([1, 2]).as_bytes()).unwrap();

        let reader = BufReader::new(BrokenPipe {
            data: io::Cursor::new(alltron_feed([1, 3]).into_bytes()),
        });
        let err = p.engine.full_sync(reader).unwrap_err();

        match err {
            SyncError::FeedRead { lines, cascade, .. } => {
                assert_eq!(lines, 3);
                assert_eq!(cascade, ScopeExit::Fired { items: 1 });
            }
            other => panic!("expected FeedRead, got {other:?}"),
        }
        assert!(item(&p, 2).is_active());
        assert!(p.store.find_by_code(supplier(&p), "3").unwrap().is_some());
        assert_eq!(p.cascade.call_count(), 2);
    }

    #[test]
    fn nested_runs_share_one_cascade() {
        let p = setup();
        let invalidator = Arc::new(RecordingInvalidator::new());
        let engine = ReconciliationEngine::new(p.store.clone(), SupplierProfile::alltron())
            .unwrap()
            .with_cascade(p.cascade.clone())
            .with_category_cache(invalidator.clone());
        let mut updater =
            QuickStockUpdater::new(p.store.clone(), &SupplierProfile::alltron()).unwrap();

        let mut scope = engine.enter_scope();
        let summary = engine
            .full_sync_within(alltron_feed([1, 2]).as_bytes(), &mut scope)
            .unwrap();
        assert_eq!(summary.cascade, ScopeExit::Nested);

        updater.refresh_known_keys().unwrap();
        let stock = updater.apply(&[StockLevel::new("2", 500)], &mut scope);
        assert_eq!(stock.updated, 1);
        assert_eq!(p.cascade.call_count(), 0);

        assert_eq!(scope.exit(), ScopeExit::Fired { items: 2 });
        let calls = p.cascade.calls();
        assert_eq!(calls.len(), 1);
        let expected: BTreeSet<_> = [item(&p, 1).id(), item(&p, 2).id()].into();
        assert_eq!(calls[0].1, expected);
        assert_eq!(invalidator.calls().len(), 1);
    }

    #[test]
    fn run_writes_json_lines_audit_file() {
        let dir = tempfile::tempdir().unwrap();
        let started = chrono::Utc::now();
        let log = Arc::new(JsonLinesAuditLog::create_for_run(dir.path(), started).unwrap());
        let store = Arc::new(InMemorySupplyItemStore::new());
        let engine = ReconciliationEngine::new(store, SupplierProfile::alltron())
            .unwrap()
            .with_audit(log.clone());

        engine.full_sync(alltron_feed([1227, 1510]).as_bytes()).unwrap();
        engine.full_sync(alltron_feed([1227]).as_bytes()).unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("supplier_import_") && name.ends_with(".log"));
        let outcomes: Vec<String> = std::fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["outcome"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(outcomes, vec!["created", "created", "unchanged", "marked_deleted"]);
    }

    #[test]
    fn audit_trail_covers_every_outcome() {
        let p = setup();
        p.engine.full_sync(alltron_feed([1, 2, 3]).as_bytes()).unwrap();

        let changed = alltron_row(2).replacen("\t2\t0,54", "\t40\t0,54", 1);
        let feed = format!("header\n{}\n{}\n", alltron_row(1), changed);
        let summary = p.engine.full_sync(feed.as_bytes()).unwrap();

        assert_eq!(
            (summary.unchanged, summary.updated, summary.deleted),
            (1, 1, 1)
        );
        for outcome in [
            AuditOutcome::Created,
            AuditOutcome::Unchanged,
            AuditOutcome::Updated,
            AuditOutcome::MarkedDeleted,
        ] {
            assert!(!p.audit.with_outcome(outcome).is_empty(), "no {outcome:?} entry");
        }
    }
}
