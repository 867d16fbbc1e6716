use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use supplysync_catalog::{Supplier, SupplyItem};
use supplysync_core::{SupplierId, SupplyItemId};

use super::{KeySnapshot, KeyState, StoreError, SupplyItemStore};

/// Serializable full copy of a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub suppliers: Vec<Supplier>,
    pub items: Vec<SupplyItem>,
}

#[derive(Debug, Default)]
struct State {
    suppliers: HashMap<SupplierId, Supplier>,
    items: HashMap<SupplyItemId, SupplyItem>,
    by_code: HashMap<(SupplierId, String), SupplyItemId>,
}

/// In-memory supply item store for tests/dev, and the working set of
/// `JsonFileStore`.
#[derive(Debug, Default)]
pub struct InMemorySupplyItemStore {
    inner: RwLock<State>,
}

fn poisoned() -> StoreError {
    StoreError::Storage("store lock poisoned".to_string())
}

impl InMemorySupplyItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store (and its key index) from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        {
            let mut state = store.inner.write().map_err(|_| poisoned())?;
            for supplier in snapshot.suppliers {
                state.suppliers.insert(supplier.id, supplier);
            }
        }
        for item in snapshot.items {
            store.insert(item)?;
        }
        Ok(store)
    }

    /// Copy of the full contents, items ordered by id (creation order).
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        let mut suppliers: Vec<_> = state.suppliers.values().cloned().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        let mut items: Vec<_> = state.items.values().cloned().collect();
        items.sort_by_key(|i| i.id());
        Ok(StoreSnapshot { suppliers, items })
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SupplyItemStore for InMemorySupplyItemStore {
    fn find_or_create_supplier(&self, name: &str) -> Result<Supplier, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        if let Some(existing) = state.suppliers.values().find(|s| s.name == name) {
            return Ok(existing.clone());
        }
        let supplier = Supplier::new(name);
        state.suppliers.insert(supplier.id, supplier.clone());
        Ok(supplier)
    }

    fn get(&self, id: SupplyItemId) -> Result<Option<SupplyItem>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.items.get(&id).cloned())
    }

    fn find_by_code(
        &self,
        supplier: SupplierId,
        code: &str,
    ) -> Result<Option<SupplyItem>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .by_code
            .get(&(supplier, code.to_string()))
            .and_then(|id| state.items.get(id))
            .cloned())
    }

    fn insert(&self, item: SupplyItem) -> Result<(), StoreError> {
        item.validate()?;
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let key = (item.supplier_id(), item.supplier_product_code().to_string());
        if state.by_code.contains_key(&key) || state.items.contains_key(&item.id()) {
            return Err(StoreError::AlreadyExists {
                supplier: key.0,
                code: key.1,
            });
        }
        state.by_code.insert(key, item.id());
        state.items.insert(item.id(), item);
        Ok(())
    }

    fn update(&self, item: &SupplyItem) -> Result<(), StoreError> {
        item.validate()?;
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let Some(existing) = state.items.get(&item.id()) else {
            return Err(StoreError::NotFound(item.id()));
        };
        if existing.supplier_id() != item.supplier_id()
            || existing.supplier_product_code() != item.supplier_product_code()
        {
            return Err(StoreError::Validation(supplysync_core::DomainError::invariant(
                "reconciliation key cannot change on update",
            )));
        }
        state.items.insert(item.id(), item.clone());
        Ok(())
    }

    fn snapshot_codes(&self, supplier: SupplierId) -> Result<KeySnapshot, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .items
            .values()
            .filter(|i| i.supplier_id() == supplier)
            .map(|i| {
                (
                    i.supplier_product_code().to_string(),
                    KeyState {
                        id: i.id(),
                        status: i.status(),
                    },
                )
            })
            .collect())
    }

    fn list(&self, supplier: SupplierId) -> Result<Vec<SupplyItem>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|i| i.supplier_id() == supplier)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.supplier_product_code().cmp(b.supplier_product_code()));
        Ok(items)
    }
}
