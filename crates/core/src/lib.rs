//! `supplysync-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns)
//! shared by the catalog model and the synchronization infrastructure.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ProductId, RunId, SupplierId, SupplyItemId};
