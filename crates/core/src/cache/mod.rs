//! TTL-keyed response cache.
//!
//! Caches serialized payloads from source endpoints under
//! `"<source_id>:<logical_path>"` keys. Expired entries are not deleted on
//! read: they remain available as a degraded-mode fallback when the source
//! itself cannot be reached.

mod sqlite;

pub use sqlite::SqliteResponseCache;

use thiserror::Error;

/// On-deck changes quickly; hubs and per-item metadata less so.
pub const ON_DECK_TTL_SECS: i64 = 1800;
pub const HUBS_TTL_SECS: i64 = 3600;
pub const METADATA_TTL_SECS: i64 = 3600;

/// Cache key builders. Keys are `"<source_id>:<logical_path>"`.
pub mod keys {
    pub fn on_deck(source_id: &str) -> String {
        format!("{}:/library/ondeck", source_id)
    }

    pub fn hubs(source_id: &str) -> String {
        format!("{}:/hubs", source_id)
    }

    pub fn metadata(source_id: &str, item_id: &str) -> String {
        format!("{}:/library/metadata/{}", source_id, item_id)
    }
}

/// Errors for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for response cache storage.
///
/// Writes are last-write-wins per key; a newer `put` supersedes the old
/// entry rather than mutating it.
pub trait ResponseCache: Send + Sync {
    /// Payload for `key` if present and within its TTL.
    fn get_fresh(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Payload for `key` regardless of TTL. Degraded-mode read used when
    /// the source is unreachable.
    fn get_any(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a payload with the given TTL, replacing any previous entry.
    fn put(&self, key: &str, payload: &str, ttl_secs: i64) -> Result<(), CacheError>;

    /// Drop an entry whose correctness a local mutation just invalidated.
    fn evict(&self, key: &str) -> Result<(), CacheError>;

    /// Drop everything (e.g. on credential switch).
    fn clear(&self) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(keys::on_deck("srv123"), "srv123:/library/ondeck");
        assert_eq!(keys::hubs("abcd1234"), "abcd1234:/hubs");
        assert_eq!(
            keys::metadata("abcd1234", "5921"),
            "abcd1234:/library/metadata/5921"
        );
    }
}
