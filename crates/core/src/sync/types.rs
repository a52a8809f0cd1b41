//! Types for the sync coordinator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheError;
use crate::library::LibraryError;
use crate::merge::CanonicalItem;
use crate::source::SourceError;

/// One emission of a cache-then-refresh cycle.
///
/// The first emission of every subscription is provisional (served from
/// whatever was cached or persisted); consumers must be prepared for the
/// refreshed emission to change it.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub value: T,
    pub provisional: bool,
}

/// A merged shelf aggregated across sources (recently added, a collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hub {
    /// Hub key, shared across the sources that expose it.
    pub key: String,
    pub title: String,
    pub items: Vec<CanonicalItem>,
}

/// Errors surfaced by single-item coordinator operations.
///
/// Fan-out operations never return these: a failing source is logged and
/// contributes an empty result instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("library error: {0}")]
    Library(#[from] LibraryError),

    #[error("unknown source: {0}")]
    UnknownSource(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_carries_provisional_flag() {
        let snapshot = Snapshot {
            value: vec![1, 2, 3],
            provisional: true,
        };
        assert!(snapshot.provisional);
        assert_eq!(snapshot.value.len(), 3);
    }

    #[test]
    fn test_sync_error_from_source_error() {
        let err: SyncError = SourceError::NotAuthenticated.into();
        assert!(matches!(err, SyncError::Source(SourceError::NotAuthenticated)));
    }
}
