use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use supplysync_catalog::{Supplier, SupplyItem};
use supplysync_core::{SupplierId, SupplyItemId};

use super::in_memory::{InMemorySupplyItemStore, StoreSnapshot};
use super::{KeySnapshot, StoreError, SupplyItemStore};

/// JSON document store: the in-memory store loaded from (and flushed to) a
/// single file.
///
/// Writes go to memory; `flush` persists them by writing a sibling temp file
/// and renaming it over the target, so a crash never leaves a half-written
/// document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: InMemorySupplyItemStore,
}

impl JsonFileStore {
    /// Load `path`, or start empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = if path.exists() {
            let raw = fs::read(&path).map_err(|e| io_error(&path, e))?;
            let snapshot: StoreSnapshot = serde_json::from_slice(&raw).map_err(|e| {
                StoreError::Storage(format!("cannot parse {}: {e}", path.display()))
            })?;
            InMemorySupplyItemStore::from_snapshot(snapshot)?
        } else {
            InMemorySupplyItemStore::new()
        };
        tracing::debug!(path = %path.display(), items = inner.len(), "opened json store");
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .map_err(|e| StoreError::Storage(format!("cannot serialize store: {e}")))?;
            writer.flush().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), items = snapshot.items.len(), "flushed json store");
        Ok(())
    }
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Storage(format!("{}: {err}", path.display()))
}

impl SupplyItemStore for JsonFileStore {
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
        self.inner.insert(item)
    }

    fn update(&self, item: &SupplyItem) -> Result<(), StoreError> {
        self.inner.update(item)
    }

    fn snapshot_codes(&self, supplier: SupplierId) -> Result<KeySnapshot, StoreError> {
        self.inner.snapshot_codes(supplier)
    }

    fn list(&self, supplier: SupplierId) -> Result<Vec<SupplyItem>, StoreError> {
        self.inner.list(supplier)
    }
}
