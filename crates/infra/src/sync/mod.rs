//! Full-sync reconciliation engine.

mod engine;
mod error;
mod lines;
mod summary;

pub use engine::ReconciliationEngine;
pub use error::{FeedError, SyncError};
pub use summary::{RunCompletion, RunSummary};
