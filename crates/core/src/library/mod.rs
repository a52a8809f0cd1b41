//! Local catalog mirror and virtual library query engine.
//!
//! The catalog store is the durable, queryable mirror of every source's
//! records. It is the single source of truth for building views: dynamic
//! filter/sort/search queries are answered here without contacting any
//! source, in single-source mode (one source, source-defined page order) or
//! unified mode (all sources, one row per deduplicated group).

mod pager;
mod sqlite;
mod types;

pub use pager::LibraryPager;
pub use sqlite::SqliteLibraryStore;
pub use types::*;

/// An optimistic local mutation of an item's watch state, applied before
/// the matching action is replayed to its source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchStateUpdate {
    Watched,
    Unwatched,
    Progress { view_offset_ms: i64 },
}

/// Trait for catalog store backends.
pub trait LibraryStore: Send + Sync {
    /// Idempotently upsert per-source items, keyed by `(source_id, item_id)`.
    ///
    /// Returns the number of newly inserted rows (not updates). A `None`
    /// incoming `page_offset` preserves the stored one, so hub and on-deck
    /// ingests never disturb section paging order.
    fn upsert(&self, items: &[SourceItem]) -> Result<u32, LibraryError>;

    /// Get one item.
    fn get(&self, source_id: &str, item_id: &str) -> Result<Option<SourceItem>, LibraryError>;

    /// Fetch several items by `(source_id, item_id)`; absent pairs are
    /// skipped. Used to reconstruct full refs from a unified row.
    fn get_many(&self, refs: &[(String, String)]) -> Result<Vec<SourceItem>, LibraryError>;

    /// Every locally-known item for one source.
    fn all_for_source(&self, source_id: &str) -> Result<Vec<SourceItem>, LibraryError>;

    /// Single-source paged query; `query.scope` must name a source.
    fn query(&self, query: &LibraryQuery) -> Result<Vec<SourceItem>, LibraryError>;

    /// Unified paged query: one row per unification-key group across all
    /// sources, with aggregated columns.
    fn query_unified(&self, query: &LibraryQuery) -> Result<Vec<UnifiedRow>, LibraryError>;

    /// Rows/groups sorting strictly before `letter` under the same filters,
    /// for jump-to-letter navigation. Shares its WHERE/GROUP BY logic with
    /// the paged queries.
    fn index_of_first(&self, letter: char, query: &LibraryQuery) -> Result<i64, LibraryError>;

    /// Total rows (single-source) or groups (unified) matching the filters.
    fn count(&self, query: &LibraryQuery) -> Result<i64, LibraryError>;

    /// Apply an optimistic watch-state mutation to the local mirror.
    fn set_watch_state(
        &self,
        source_id: &str,
        item_id: &str,
        update: WatchStateUpdate,
    ) -> Result<(), LibraryError>;

    /// Locally stored row count for one source section (drives the
    /// remote-fetch-on-demand pager).
    fn section_row_count(&self, source_id: &str, section: &str) -> Result<i64, LibraryError>;

    /// Drop all items of one source.
    fn remove_source(&self, source_id: &str) -> Result<(), LibraryError>;

    /// Drop everything (e.g. credential switch).
    fn clear(&self) -> Result<(), LibraryError>;
}
