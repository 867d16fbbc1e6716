use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use supplysync_core::{DomainError, DomainResult, SupplierId, SupplyItemId};

use crate::field::{FieldValue, ItemField, descriptor};

/// A supplier whose catalog is mirrored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
}

impl Supplier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SupplierId::new(),
            name: name.into(),
        }
    }
}

/// Supply item lifecycle.
///
/// `Deleted` is terminal: items are never hard-deleted and never revived by a
/// sync run. Marking an already deleted item again is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Deleted,
}

/// Local mirror of one supplier catalog row.
///
/// `(supplier_id, supplier_product_code)` is unique and is the reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyItem {
    pub(crate) id: SupplyItemId,
    pub(crate) supplier_id: SupplierId,
    pub(crate) supplier_product_code: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) manufacturer: String,
    pub(crate) manufacturer_product_code: String,
    pub(crate) product_link: String,
    pub(crate) weight: Decimal,
    pub(crate) purchase_price: Decimal,
    pub(crate) stock: i64,
    pub(crate) status: ItemStatus,
    pub(crate) image_url: String,
    pub(crate) pdf_url: String,
    pub(crate) category01: String,
    pub(crate) category02: String,
    pub(crate) category03: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl SupplyItem {
    /// Create a blank, active item for a reconciliation key.
    ///
    /// Numeric fields start at zero, text fields empty.
    pub fn new(
        supplier_id: SupplierId,
        supplier_product_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SupplyItemId::new(),
            supplier_id,
            supplier_product_code: supplier_product_code.into(),
            name: String::new(),
            description: String::new(),
            manufacturer: String::new(),
            manufacturer_product_code: String::new(),
            product_link: String::new(),
            weight: Decimal::ZERO,
            purchase_price: Decimal::ZERO,
            stock: 0,
            status: ItemStatus::Active,
            image_url: String::new(),
            pdf_url: String::new(),
            category01: String::new(),
            category02: String::new(),
            category03: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> SupplyItemId {
        self.id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn supplier_product_code(&self) -> &str {
        &self.supplier_product_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn manufacturer_product_code(&self) -> &str {
        &self.manufacturer_product_code
    }

    pub fn product_link(&self) -> &str {
        &self.product_link
    }

    pub fn weight(&self) -> Decimal {
        self.weight
    }

    pub fn purchase_price(&self) -> Decimal {
        self.purchase_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn pdf_url(&self) -> &str {
        &self.pdf_url
    }

    /// Category breadcrumbs, most general first.
    pub fn categories(&self) -> [&str; 3] {
        [&self.category01, &self.category02, &self.category03]
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Read a field through the descriptor table.
    pub fn field(&self, field: ItemField) -> FieldValue {
        (descriptor(field).get)(self)
    }

    /// Write a field through the descriptor table.
    pub fn set_field(&mut self, field: ItemField, value: FieldValue) -> DomainResult<()> {
        (descriptor(field).set)(self, value)
    }

    /// Record that the item was written at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Transition ACTIVE -> DELETED.
    ///
    /// Returns `false` (and changes nothing) if the item is already deleted.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ItemStatus::Deleted {
            return false;
        }
        self.status = ItemStatus::Deleted;
        self.updated_at = now;
        true
    }

    /// Validation applied by stores before every insert/update.
    pub fn validate(&self) -> DomainResult<()> {
        if self.supplier_product_code.trim().is_empty() {
            return Err(DomainError::validation("supplier product code cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "name cannot be empty (supplier product code {})",
                self.supplier_product_code
            )));
        }
        if self.purchase_price < Decimal::ZERO {
            return Err(DomainError::validation("purchase price cannot be negative"));
        }
        if self.weight < Decimal::ZERO {
            return Err(DomainError::validation("weight cannot be negative"));
        }
        Ok(())
    }
}

impl core::fmt::Display for SupplyItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.supplier_product_code, self.name)
    }
}
