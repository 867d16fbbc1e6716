//! Supplier-scoped keyed record store abstraction.
//!
//! The reconciliation engines only need keyed lookup, insert/update and a
//! snapshot of the keys a supplier currently has. Persistence technology is an
//! implementation detail of each store.

pub mod file;
pub mod in_memory;

use std::collections::HashMap;
use std::sync::Arc;

use supplysync_catalog::{ItemStatus, Supplier, SupplyItem};
use supplysync_core::{DomainError, SupplierId, SupplyItemId};

pub use file::JsonFileStore;
pub use in_memory::{InMemorySupplyItemStore, StoreSnapshot};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("supply item not found: {0}")]
    NotFound(SupplyItemId),
    #[error("supply item already exists for supplier {supplier}: {code}")]
    AlreadyExists { supplier: SupplierId, code: String },
    #[error("rejected by validation: {0}")]
    Validation(#[from] DomainError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// State of one reconciliation key at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub id: SupplyItemId,
    pub status: ItemStatus,
}

/// Every key a supplier has locally (active and deleted).
pub type KeySnapshot = HashMap<String, KeyState>;

/// Supply item store abstraction.
///
/// Implementations validate items (`SupplyItem::validate`) before every write
/// and enforce `(supplier, supplier_product_code)` uniqueness.
pub trait SupplyItemStore: Send + Sync {
    /// Find a supplier by name, creating it on first use.
    fn find_or_create_supplier(&self, name: &str) -> Result<Supplier, StoreError>;

    fn get(&self, id: SupplyItemId) -> Result<Option<SupplyItem>, StoreError>;

    /// Look up by reconciliation key.
    fn find_by_code(
        &self,
        supplier: SupplierId,
        code: &str,
    ) -> Result<Option<SupplyItem>, StoreError>;

    fn insert(&self, item: SupplyItem) -> Result<(), StoreError>;

    /// Replace an existing item. The reconciliation key cannot change.
    fn update(&self, item: &SupplyItem) -> Result<(), StoreError>;

    /// Snapshot of all keys for a supplier.
    fn snapshot_codes(&self, supplier: SupplierId) -> Result<KeySnapshot, StoreError>;

    fn list(&self, supplier: SupplierId) -> Result<Vec<SupplyItem>, StoreError>;
}

impl<S> SupplyItemStore for Arc<S>
where
    S: SupplyItemStore + ?Sized,
{
    fn find_or_create_supplier(&self, name: &str) -> Result<Supplier, StoreError> {
        (**self).find_or_create_supplier(name)
    }

    fn get(&self, id: SupplyItemId) -> Result<Option<SupplyItem>, StoreError> {
        (**self).get(id)
    }

    fn find_by_code(
        &self,
        supplier: SupplierId,
        code: &str,
    ) -> Result<Option<SupplyItem>, StoreError> {
        (**self).find_by_code(supplier, code)
    }

    fn insert(&self, item: SupplyItem) -> Result<(), StoreError> {
        (**self).insert(item)
    }

    fn update(&self, item: &SupplyItem) -> Result<(), StoreError> {
        (**self).update(item)
    }

    fn snapshot_codes(&self, supplier: SupplierId) -> Result<KeySnapshot, StoreError> {
        (**self).snapshot_codes(supplier)
    }

    fn list(&self, supplier: SupplierId) -> Result<Vec<SupplyItem>, StoreError> {
        (**self).list(supplier)
    }
}
