use std::io;
use std::path::PathBuf;

use supplysync_core::DomainError;

use crate::delta::ScopeExit;
use crate::store::StoreError;

/// Feed source failure (primary or stock feed).
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("cannot open feed {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("feed read failed: {0}")]
    Read(#[from] io::Error),
    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// Run-level failure. Per-row problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Nothing was reconciled.
    #[error("feed source unavailable: {0}")]
    FeedSourceUnavailable(#[source] FeedError),
    /// The stream broke after `lines` lines. Rows read so far were reconciled
    /// and the soft-delete phase was skipped. `cascade` is how the scope closed.
    #[error("feed read failed after {lines} lines: {source}")]
    FeedRead {
        lines: usize,
        #[source]
        source: FeedError,
        cascade: ScopeExit,
    },
    #[error("feed is empty (no header line)")]
    EmptyFeed,
    #[error("invalid supplier profile: {0}")]
    InvalidProfile(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
