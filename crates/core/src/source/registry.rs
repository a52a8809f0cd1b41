//! Cached registry of known sources.
//!
//! Discovery (account lookup, connection testing) is an external
//! collaborator behind `SourceProvider`. The registry caches its result so
//! callers can read the latest known source list without re-querying on
//! every call, with an explicit `invalidate` and a `force_refresh` escape
//! hatch instead of ambient global state.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{SourceClient, SourceDescriptor, SourceError};

/// A discovered source: its descriptor plus a ready-to-use client.
#[derive(Clone)]
pub struct SourceHandle {
    pub descriptor: SourceDescriptor,
    pub client: Arc<dyn SourceClient>,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// External collaborator that resolves the currently reachable sources.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn discover(&self) -> Result<Vec<SourceHandle>, SourceError>;
}

/// In-memory cache over a `SourceProvider`.
pub struct SourceRegistry {
    provider: Arc<dyn SourceProvider>,
    cached: RwLock<Option<Vec<SourceHandle>>>,
}

impl SourceRegistry {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            provider,
            cached: RwLock::new(None),
        }
    }

    /// Latest known source list.
    ///
    /// Serves from cache unless empty or `force_refresh`. A failed discovery
    /// never errors out: the last known list (possibly empty) is returned so
    /// callers can fall back to the persisted catalog.
    pub async fn sources(&self, force_refresh: bool) -> Vec<SourceHandle> {
        if !force_refresh {
            if let Some(ref cached) = *self.cached.read().await {
                return cached.clone();
            }
        }

        match self.provider.discover().await {
            Ok(handles) => {
                debug!(count = handles.len(), "Source discovery complete");
                *self.cached.write().await = Some(handles.clone());
                handles
            }
            Err(e) => {
                warn!(error = %e, "Source discovery failed, serving last known list");
                self.cached.read().await.clone().unwrap_or_default()
            }
        }
    }

    /// Drop the cached list; the next `sources` call re-discovers.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

/// Ids of owned sources within a handle list. Resolved once per fan-out and
/// passed into the deduplicator.
pub fn owned_ids(sources: &[SourceHandle]) -> HashSet<String> {
    sources
        .iter()
        .filter(|h| h.descriptor.owned)
        .map(|h| h.descriptor.id.clone())
        .collect()
}
