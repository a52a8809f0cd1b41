//! Engine wiring.
//!
//! Opens the durable stores and assembles the coordinator and action queue
//! from a configuration. All three stores share one SQLite database file,
//! each owning its own connection and tables.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::actions::{ActionError, ActionQueue, PendingActionStore, SqliteActionStore};
use crate::cache::{CacheError, ResponseCache, SqliteResponseCache};
use crate::config::Config;
use crate::library::{LibraryError, LibraryPager, LibraryStore, SortField, SqliteLibraryStore};
use crate::source::{SourceHandle, SourceProvider, SourceRegistry};
use crate::sync::SyncCoordinator;

/// Errors while opening the engine's stores.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cache store error: {0}")]
    Cache(#[from] CacheError),

    #[error("library store error: {0}")]
    Library(#[from] LibraryError),

    #[error("action store error: {0}")]
    Actions(#[from] ActionError),
}

/// The assembled reconciliation engine.
pub struct Engine {
    config: Config,
    pub registry: Arc<SourceRegistry>,
    pub cache: Arc<SqliteResponseCache>,
    pub library: Arc<SqliteLibraryStore>,
    pub coordinator: Arc<SyncCoordinator>,
    pub actions: Arc<ActionQueue>,
}

impl Engine {
    /// Open the stores at the configured database path and wire everything
    /// together. Source discovery stays behind the given provider.
    pub fn open(config: Config, provider: Arc<dyn SourceProvider>) -> Result<Self, EngineError> {
        let registry = Arc::new(SourceRegistry::new(provider));
        let cache = Arc::new(SqliteResponseCache::new(&config.database.path)?);
        let library = Arc::new(SqliteLibraryStore::new(&config.database.path)?);
        let action_store = Arc::new(SqliteActionStore::new(&config.database.path)?);

        let coordinator = Arc::new(
            SyncCoordinator::new(
                Arc::clone(&registry),
                cache.clone() as Arc<dyn ResponseCache>,
                library.clone() as Arc<dyn LibraryStore>,
            )
            .with_search_timeout(Duration::from_secs(config.sync.search_timeout_secs))
            .with_cache_ttls(
                config.cache.on_deck_ttl_secs,
                config.cache.hubs_ttl_secs,
                config.cache.metadata_ttl_secs,
            ),
        );

        let actions = Arc::new(
            ActionQueue::new(
                action_store as Arc<dyn PendingActionStore>,
                library.clone() as Arc<dyn LibraryStore>,
                cache.clone() as Arc<dyn ResponseCache>,
                Arc::clone(&registry),
            )
            .with_retry_ceiling(config.sync.retry_ceiling)
            .with_reconcile_min_interval(Duration::from_secs(
                config.sync.reconcile_min_interval_secs,
            )),
        );

        Ok(Self {
            config,
            registry,
            cache,
            library,
            coordinator,
            actions,
        })
    }

    /// Source whose physical copy the user prefers for playback, if set.
    pub fn preferred_source(&self) -> Option<&str> {
        self.config.library.preferred_source.as_deref()
    }

    /// A remote-fetch-on-demand pager over one source section, using the
    /// configured remote page size.
    pub fn section_pager(
        &self,
        source: SourceHandle,
        section: impl Into<String>,
        sort: SortField,
        descending: bool,
    ) -> LibraryPager {
        LibraryPager::new(
            source,
            section,
            sort,
            descending,
            self.config.library.page_size,
            self.library.clone() as Arc<dyn LibraryStore>,
        )
    }
}
