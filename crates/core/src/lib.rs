//! Medley core: cross-source reconciliation and synchronization engine.
//!
//! Builds one consistent, offline-tolerant virtual library on top of N
//! independent media sources: per-source catalog fragments are fetched and
//! cached, same-title records are merged into canonical items, the merged
//! data is queryable without touching any source, and user mutations are
//! queued durably and replayed when sources come back.

pub mod actions;
pub mod cache;
pub mod config;
pub mod engine;
pub mod library;
pub mod merge;
pub mod metrics;
pub mod source;
pub mod sync;
pub mod testing;

pub use actions::{ActionKind, ActionQueue, PendingAction, SqliteActionStore};
pub use cache::{ResponseCache, SqliteResponseCache};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use engine::{Engine, EngineError};
pub use library::{
    LibraryPager, LibraryQuery, LibraryStore, ServerScope, SortField, SourceItem,
    SqliteLibraryStore, UnifiedRow,
};
pub use merge::{merge, prefer_source, unification_key, CanonicalItem, SourceRef};
pub use source::{
    HttpSourceClient, MediaKind, RawMediaRecord, SourceClient, SourceDescriptor, SourceError,
    SourceHandle, SourceProvider, SourceRegistry,
};
pub use sync::{Hub, Snapshot, SyncCoordinator, SyncError};
