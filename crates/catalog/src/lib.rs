//! Supplier catalog domain module.
//!
//! This crate contains the catalog mirror model and the pure parts of supplier
//! feed reconciliation: line parsing, lexical cleanup, field-level change
//! detection. Deterministic domain logic only (no IO, no storage).

pub mod candidate;
pub mod change;
pub mod feed;
pub mod field;
pub mod item;
pub mod profile;

pub use candidate::{Candidates, CoercionWarning};
pub use change::{ChangeDetector, Changeset, FieldChange, FieldPolicy, FieldRule};
pub use feed::{FeedRow, parse_line};
pub use field::{FieldDescriptor, FieldValue, ItemField, descriptor, descriptors};
pub use item::{ItemStatus, Supplier, SupplyItem};
pub use profile::{
    ColumnLayout, FeedField, InvalidNumber, NumberLocale, StockFeedLayout, SupplierProfile,
};
