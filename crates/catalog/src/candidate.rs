//! Lexical cleanup and typed candidate values built from a parsed feed row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use supplysync_core::{DomainResult, SupplierId};

use crate::feed::FeedRow;
use crate::field::{FieldValue, ItemField};
use crate::item::SupplyItem;
use crate::profile::{FeedField, SupplierProfile};

/// A numeric cell that could not be coerced. The field falls back to its safe
/// default on create and is left untouched on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub field: FeedField,
    pub raw: String,
}

/// Cleaned, typed, non-blank values for the fields a row provides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidates {
    values: BTreeMap<ItemField, FieldValue>,
    warnings: Vec<CoercionWarning>,
}

impl Candidates {
    pub fn single(field: ItemField, value: FieldValue) -> Self {
        let mut values = BTreeMap::new();
        values.insert(field, value);
        Self {
            values,
            warnings: Vec::new(),
        }
    }

    pub fn get(&self, field: ItemField) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn warnings(&self) -> &[CoercionWarning] {
        &self.warnings
    }

    /// Build candidates from a parsed row using the profile's locale.
    pub fn from_row(row: &FeedRow, profile: &SupplierProfile) -> Self {
        let mut candidates = Self::default();

        candidates.put_text(ItemField::Name, compose_name(row));
        candidates.put_text(ItemField::Description, compose_description(row));

        for (item_field, feed_field) in [
            (ItemField::Manufacturer, FeedField::Manufacturer),
            (ItemField::ManufacturerProductCode, FeedField::ManufacturerProductCode),
            (ItemField::ProductLink, FeedField::ProductLink),
            (ItemField::ImageUrl, FeedField::ImageUrl),
            (ItemField::PdfUrl, FeedField::PdfUrl),
            (ItemField::Category01, FeedField::Category01),
            (ItemField::Category02, FeedField::Category02),
            (ItemField::Category03, FeedField::Category03),
        ] {
            candidates.put_text(item_field, clean_text(row.get(feed_field).unwrap_or("")));
        }

        let locale = &profile.number_locale;
        if let Some(raw) = row.get(FeedField::Weight) {
            match locale.parse_decimal(raw) {
                Ok(Some(weight)) => candidates.put(ItemField::Weight, FieldValue::Decimal(weight)),
                Ok(None) => {}
                Err(_) => candidates.warn(FeedField::Weight, raw),
            }
        }
        if let Some(raw) = row.get(FeedField::PriceExcludingVat) {
            match locale.parse_decimal(raw) {
                // A zero price is a feed gap, never a real purchase price.
                Ok(Some(price)) if !price.is_zero() => {
                    candidates.put(ItemField::PurchasePrice, FieldValue::Decimal(price))
                }
                Ok(_) => {}
                Err(_) => candidates.warn(FeedField::PriceExcludingVat, raw),
            }
        }
        if let Some(raw) = row.get(FeedField::StockLevel) {
            match locale.parse_integer(raw) {
                Ok(Some(stock)) => candidates.put(ItemField::Stock, FieldValue::Integer(stock)),
                Ok(None) => {}
                Err(_) => candidates.warn(FeedField::StockLevel, raw),
            }
        }

        candidates
    }

    /// Construct a new item carrying every candidate verbatim.
    ///
    /// Fields without a candidate keep the blank defaults of `SupplyItem::new`.
    pub fn build_item(
        &self,
        supplier_id: SupplierId,
        supplier_product_code: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<SupplyItem> {
        let mut item = SupplyItem::new(supplier_id, supplier_product_code.trim(), now);
        for (field, value) in &self.values {
            item.set_field(*field, value.clone())?;
        }
        Ok(item)
    }

    fn put(&mut self, field: ItemField, value: FieldValue) {
        if !value.is_blank() {
            self.values.insert(field, value);
        }
    }

    fn put_text(&mut self, field: ItemField, text: String) {
        self.put(field, FieldValue::Text(text));
    }

    fn warn(&mut self, field: FeedField, raw: &str) {
        self.warnings.push(CoercionWarning {
            field,
            raw: raw.to_string(),
        });
    }
}

/// Trim and replace non-breaking spaces.
pub fn clean_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}

/// `clean_text` plus `ß` -> `ss`, for names and descriptions.
pub fn clean_display_text(raw: &str) -> String {
    clean_text(&raw.replace('ß', "ss"))
}

fn non_blank(row: &FeedRow, field: FeedField) -> Option<&str> {
    row.get(field).filter(|v| !v.trim().is_empty())
}

/// `name01 [name02] [(name03)]`
fn compose_name(row: &FeedRow) -> String {
    let mut name = row.get(FeedField::Name01).unwrap_or("").trim().to_string();
    if let Some(part) = non_blank(row, FeedField::Name02) {
        name.push(' ');
        name.push_str(part.trim());
    }
    if let Some(part) = non_blank(row, FeedField::Name03) {
        name.push_str(&format!(" ({})", part.trim()));
    }
    clean_display_text(&name)
}

fn compose_description(row: &FeedRow) -> String {
    let mut description = row.get(FeedField::Description01).unwrap_or("").to_string();
    if let Some(part) = non_blank(row, FeedField::Description02) {
        description.push_str(part);
    }
    clean_display_text(&description)
}
