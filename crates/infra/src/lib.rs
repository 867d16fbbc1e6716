//! Infrastructure layer: stores, feed readers, audit sinks, collaborators,
//! and the synchronization engines that tie them together.

pub mod audit;
pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod delta;
pub mod products;
pub mod quick_stock;
pub mod store;
pub mod sync;

mod integration_tests;

pub use audit::{
    AuditEntry, AuditError, AuditLog, AuditOutcome, InMemoryAuditLog, JsonLinesAuditLog,
    NoopAuditLog,
};
pub use cancel::CancellationToken;
pub use collaborators::{
    CascadeError, CategoryCacheInvalidator, PriceCascade, RecordingCascade, RecordingInvalidator,
    TracingCollaborators,
};
pub use config::{ConfigError, SyncConfig};
pub use delta::{DeltaScope, ScopeExit};
pub use products::{DownstreamProduct, ProductAvailabilityCascade};
pub use quick_stock::{QuickStockSummary, QuickStockUpdater, StockFeed, StockLevel, read_stock_levels};
pub use store::{
    InMemorySupplyItemStore, JsonFileStore, KeySnapshot, KeyState, StoreError, SupplyItemStore,
};
pub use sync::{FeedError, ReconciliationEngine, RunCompletion, RunSummary, SyncError};
