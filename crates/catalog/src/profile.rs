//! Supplier profiles: everything that differs between supplier feeds.
//!
//! Onboarding a supplier means writing a new profile value (in code or as a
//! JSON file), never a new reconciliation code path.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplysync_core::{DomainError, DomainResult};

use crate::change::{FieldPolicy, FieldRule};
use crate::field::ItemField;

/// Semantic columns a primary feed can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedField {
    SupplierProductCode,
    Name01,
    Name02,
    Name03,
    Description01,
    Description02,
    PriceExcludingVat,
    StockLevel,
    Weight,
    Manufacturer,
    ManufacturerProductCode,
    ProductLink,
    ImageUrl,
    PdfUrl,
    Category01,
    Category02,
    Category03,
}

/// Field name -> column index. A field mapped to `None` is not present in
/// this supplier's feed; an unmapped field is treated the same way.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnLayout(BTreeMap<FeedField, Option<usize>>);

impl ColumnLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: FeedField, column: Option<usize>) -> Self {
        self.0.insert(field, column);
        self
    }

    pub fn column(&self, field: FeedField) -> Option<usize> {
        self.0.get(&field).copied().flatten()
    }

    /// Mapped fields with their positions, absent ones included.
    pub fn iter(&self) -> impl Iterator<Item = (FeedField, Option<usize>)> + '_ {
        self.0.iter().map(|(f, c)| (*f, *c))
    }
}

/// A value that could not be coerced to a number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a number: {raw:?}")]
pub struct InvalidNumber {
    pub raw: String,
}

/// Locale-specific numeric cleanup.
///
/// Grouping separators are removed, the decimal separator becomes `.`.
/// Blank input is "no value" rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberLocale {
    pub decimal_separator: char,
    #[serde(default)]
    pub grouping_separators: Vec<char>,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separators: Vec::new(),
        }
    }
}

impl NumberLocale {
    /// Swiss feeds: `0,54` decimals and `1'250` thousands.
    pub fn swiss() -> Self {
        Self {
            decimal_separator: ',',
            grouping_separators: vec!['\'', '\u{2019}'],
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        raw.trim()
            .chars()
            .filter(|c| !self.grouping_separators.contains(c) && !c.is_whitespace())
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect()
    }

    pub fn parse_decimal(&self, raw: &str) -> Result<Option<Decimal>, InvalidNumber> {
        let normalized = self.normalize(raw);
        if normalized.is_empty() {
            return Ok(None);
        }
        Decimal::from_str(&normalized)
            .map(Some)
            .map_err(|_| InvalidNumber { raw: raw.to_string() })
    }

    /// Integers accept decimal notation and truncate (`4.0` -> 4).
    pub fn parse_integer(&self, raw: &str) -> Result<Option<i64>, InvalidNumber> {
        let normalized = self.normalize(raw);
        if normalized.is_empty() {
            return Ok(None);
        }
        if let Ok(n) = normalized.parse::<i64>() {
            return Ok(Some(n));
        }
        Decimal::from_str(&normalized)
            .ok()
            .and_then(|d| d.trunc().to_i64())
            .map(Some)
            .ok_or_else(|| InvalidNumber { raw: raw.to_string() })
    }
}

/// Element names of the secondary (stock level) XML feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFeedLayout {
    pub item_element: String,
    pub code_element: String,
    pub quantity_element: String,
}

impl Default for StockFeedLayout {
    fn default() -> Self {
        Self {
            item_element: "item".to_string(),
            code_element: "LITM".to_string(),
            quantity_element: "STQU".to_string(),
        }
    }
}

/// Per-supplier feed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierProfile {
    /// Profile key (e.g. `alltron`).
    pub name: String,
    /// Supplier record name; the supplier is created on first use.
    pub supplier_name: String,
    pub separator: char,
    pub columns: ColumnLayout,
    #[serde(default)]
    pub number_locale: NumberLocale,
    /// Fields compared on update, with their overwrite policy.
    #[serde(default = "default_checked_fields")]
    pub checked_fields: Vec<FieldRule>,
    #[serde(default)]
    pub stock_feed: StockFeedLayout,
}

/// Price, stock, weight, manufacturer identity, URLs, and category breadcrumbs.
pub fn default_checked_fields() -> Vec<FieldRule> {
    [
        ItemField::PurchasePrice,
        ItemField::Stock,
        ItemField::Weight,
        ItemField::Manufacturer,
        ItemField::ManufacturerProductCode,
        ItemField::ImageUrl,
        ItemField::PdfUrl,
        ItemField::Category01,
        ItemField::Category02,
        ItemField::Category03,
    ]
    .into_iter()
    .map(|field| FieldRule::new(field, FieldPolicy::OverwriteIfDifferent))
    .collect()
}

impl SupplierProfile {
    /// Alltron AG: tab-separated article export, Swiss number formatting.
    pub fn alltron() -> Self {
        use FeedField::*;

        let columns = ColumnLayout::new()
            .with(SupplierProductCode, Some(0))
            .with(Name01, Some(2))
            .with(Name02, Some(3))
            .with(Name03, None)
            .with(StockLevel, Some(4))
            .with(Weight, Some(5))
            .with(PriceExcludingVat, Some(7))
            .with(Description01, Some(8))
            .with(Description02, Some(9))
            .with(ProductLink, Some(8))
            .with(ManufacturerProductCode, Some(11))
            .with(Manufacturer, Some(12))
            .with(PdfUrl, None)
            .with(ImageUrl, None)
            .with(Category01, Some(17))
            .with(Category02, Some(18))
            .with(Category03, Some(19));

        Self {
            name: "alltron".to_string(),
            supplier_name: "Alltron AG".to_string(),
            separator: '\t',
            columns,
            number_locale: NumberLocale::swiss(),
            checked_fields: default_checked_fields(),
            stock_feed: StockFeedLayout::default(),
        }
    }

    /// Look up a profile compiled into the binary.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "alltron" => Some(Self::alltron()),
            _ => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("profile supplier_name cannot be empty"));
        }
        if self.separator == '\n' || self.separator == '\r' {
            return Err(DomainError::validation("profile separator cannot be a line break"));
        }
        if self.columns.column(FeedField::SupplierProductCode).is_none() {
            return Err(DomainError::validation(
                "profile must map supplier_product_code to a column",
            ));
        }
        let locale = &self.number_locale;
        if locale.grouping_separators.contains(&locale.decimal_separator) {
            return Err(DomainError::validation(
                "decimal separator cannot also be a grouping separator",
            ));
        }
        Ok(())
    }
}
