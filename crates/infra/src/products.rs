//! In-memory downstream product catalog acting as the price/availability
//! cascade.
//!
//! Products are linked to at most one supply item. The cascade never decides
//! an item's status itself: it only reacts to what the store says about the
//! items a scope touched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::Serialize;

use supplysync_catalog::SupplyItem;
use supplysync_core::{ProductId, SupplierId, SupplyItemId};

use crate::collaborators::{CascadeError, PriceCascade};
use crate::store::SupplyItemStore;

/// A sellable product derived from a supply item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownstreamProduct {
    pub id: ProductId,
    pub supply_item: SupplyItemId,
    pub available: bool,
    pub stock: i64,
    pub sales_price: Decimal,
}

/// Recomputes linked products for touched supply items.
///
/// `sales_price = purchase_price * markup`, rounded to cents. A DELETED item
/// makes every linked product unavailable. A price the markup would overflow
/// leaves the product unchanged and fails the recompute.
#[derive(Debug)]
pub struct ProductAvailabilityCascade<S> {
    store: S,
    markup: Decimal,
    products: RwLock<BTreeMap<ProductId, DownstreamProduct>>,
}

impl<S> ProductAvailabilityCascade<S>
where
    S: SupplyItemStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            markup: Decimal::ONE,
            products: RwLock::default(),
        }
    }

    pub fn with_markup(mut self, markup: Decimal) -> Self {
        self.markup = markup;
        self
    }

    /// Create an available product for `item`.
    pub fn link(&self, item: SupplyItemId) -> Result<ProductId, CascadeError> {
        let source = self
            .store
            .get(item)
            .map_err(|e| CascadeError::new(e.to_string()))?
            .ok_or_else(|| CascadeError::new(format!("supply item not found: {item}")))?;

        let product = DownstreamProduct {
            id: ProductId::new(),
            supply_item: item,
            available: source.is_active(),
            stock: source.stock(),
            sales_price: self.sales_price(&source)?,
        };
        let id = product.id;
        self.products
            .write()
            .map_err(|_| CascadeError::new("product catalog lock poisoned"))?
            .insert(id, product);
        Ok(id)
    }

    pub fn get(&self, id: ProductId) -> Option<DownstreamProduct> {
        self.products.read().ok()?.get(&id).cloned()
    }

    fn sales_price(&self, item: &SupplyItem) -> Result<Decimal, CascadeError> {
        item.purchase_price()
            .checked_mul(self.markup)
            .map(|price| price.round_dp(2))
            .ok_or_else(|| {
                CascadeError::new(format!(
                    "sales price overflow for {} ({} x {})",
                    item.supplier_product_code(),
                    item.purchase_price(),
                    self.markup
                ))
            })
    }
}

impl<S> PriceCascade for ProductAvailabilityCascade<S>
where
    S: SupplyItemStore,
{
    fn recompute(
        &self,
        supplier: SupplierId,
        items: &BTreeSet<SupplyItemId>,
    ) -> Result<(), CascadeError> {
        let mut products = self
            .products
            .write()
            .map_err(|_| CascadeError::new("product catalog lock poisoned"))?;

        let mut disabled = 0usize;
        let mut repriced = 0usize;
        let mut overflowed = Vec::new();
        for product in products.values_mut().filter(|p| items.contains(&p.supply_item)) {
            let Some(item) = self
                .store
                .get(product.supply_item)
                .map_err(|e| CascadeError::new(e.to_string()))?
            else {
                continue;
            };
            if item.is_active() {
                match self.sales_price(&item) {
                    Ok(price) => {
                        product.stock = item.stock();
                        product.sales_price = price;
                        repriced += 1;
                    }
                    Err(err) => overflowed.push(err.to_string()),
                }
            } else if product.available {
                product.available = false;
                disabled += 1;
            }
        }

        tracing::debug!(%supplier, touched = items.len(), repriced, disabled, "products recomputed");
        if overflowed.is_empty() {
            Ok(())
        } else {
            Err(CascadeError::new(overflowed.join("; ")))
        }
    }
}
