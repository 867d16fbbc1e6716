//! Field descriptor table for `SupplyItem`.
//!
//! The change detector and the candidate builder never address item fields by
//! string name. They walk a fixed table of `(field, getter, setter)` descriptors
//! built once for the entity type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use supplysync_core::{DomainError, DomainResult};

use crate::item::SupplyItem;

/// The writable, feed-sourced fields of a supply item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    Name,
    Description,
    Manufacturer,
    ManufacturerProductCode,
    ProductLink,
    Weight,
    PurchasePrice,
    Stock,
    ImageUrl,
    PdfUrl,
    Category01,
    Category02,
    Category03,
}

impl ItemField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemField::Name => "name",
            ItemField::Description => "description",
            ItemField::Manufacturer => "manufacturer",
            ItemField::ManufacturerProductCode => "manufacturer_product_code",
            ItemField::ProductLink => "product_link",
            ItemField::Weight => "weight",
            ItemField::PurchasePrice => "purchase_price",
            ItemField::Stock => "stock",
            ItemField::ImageUrl => "image_url",
            ItemField::PdfUrl => "pdf_url",
            ItemField::Category01 => "category01",
            ItemField::Category02 => "category02",
            ItemField::Category03 => "category03",
        }
    }
}

impl core::fmt::Display for ItemField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed field value.
///
/// Only text can be blank. Numbers are never blank: a zero stock level is a
/// real value, an absent or unparseable cell is represented by having no
/// candidate at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    fn into_text(self, field: ItemField) -> DomainResult<String> {
        match self {
            FieldValue::Text(s) => Ok(s),
            other => Err(mismatch(field, "text", &other)),
        }
    }

    fn into_integer(self, field: ItemField) -> DomainResult<i64> {
        match self {
            FieldValue::Integer(n) => Ok(n),
            other => Err(mismatch(field, "an integer", &other)),
        }
    }

    fn into_decimal(self, field: ItemField) -> DomainResult<Decimal> {
        match self {
            FieldValue::Decimal(d) => Ok(d),
            FieldValue::Integer(n) => Ok(Decimal::from(n)),
            other => Err(mismatch(field, "a decimal", &other)),
        }
    }
}

impl core::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
        }
    }
}

fn mismatch(field: ItemField, expected: &str, found: &FieldValue) -> DomainError {
    DomainError::validation(format!("{field} expects {expected}, got {found:?}"))
}

/// Accessor pair for one item field.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub field: ItemField,
    pub get: fn(&SupplyItem) -> FieldValue,
    pub set: fn(&mut SupplyItem, FieldValue) -> DomainResult<()>,
}

impl core::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

macro_rules! text_field {
    ($variant:ident, $attr:ident) => {
        FieldDescriptor {
            field: ItemField::$variant,
            get: |item| FieldValue::Text(item.$attr.clone()),
            set: |item, value| {
                item.$attr = value.into_text(ItemField::$variant)?;
                Ok(())
            },
        }
    };
}

static DESCRIPTORS: [FieldDescriptor; 13] = [
    text_field!(Name, name),
    text_field!(Description, description),
    text_field!(Manufacturer, manufacturer),
    text_field!(ManufacturerProductCode, manufacturer_product_code),
    text_field!(ProductLink, product_link),
    FieldDescriptor {
        field: ItemField::Weight,
        get: |item| FieldValue::Decimal(item.weight),
        set: |item, value| {
            item.weight = value.into_decimal(ItemField::Weight)?;
            Ok(())
        },
    },
    FieldDescriptor {
        field: ItemField::PurchasePrice,
        get: |item| FieldValue::Decimal(item.purchase_price),
        set: |item, value| {
            item.purchase_price = value.into_decimal(ItemField::PurchasePrice)?;
            Ok(())
        },
    },
    FieldDescriptor {
        field: ItemField::Stock,
        get: |item| FieldValue::Integer(item.stock),
        set: |item, value| {
            item.stock = value.into_integer(ItemField::Stock)?;
            Ok(())
        },
    },
    text_field!(ImageUrl, image_url),
    text_field!(PdfUrl, pdf_url),
    text_field!(Category01, category01),
    text_field!(Category02, category02),
    text_field!(Category03, category03),
];

/// All descriptors, in declaration order of `ItemField`.
pub fn descriptors() -> &'static [FieldDescriptor] {
    &DESCRIPTORS
}

/// Descriptor for one field.
pub fn descriptor(field: ItemField) -> &'static FieldDescriptor {
    // Table order matches the enum's discriminants.
    &DESCRIPTORS[field as usize]
}
