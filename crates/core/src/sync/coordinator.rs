//! Sync coordinator implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::Stream;
use tracing::{debug, warn};

use crate::cache::{keys, ResponseCache, HUBS_TTL_SECS, METADATA_TTL_SECS, ON_DECK_TTL_SECS};
use crate::library::{LibraryStore, SourceItem, UnifiedRow};
use crate::merge::{merge, prefer_source, CanonicalItem};
use crate::metrics;
use crate::source::{
    owned_ids, RawHub, RawMediaRecord, SourceDescriptor, SourceHandle, SourceRegistry,
};

use super::{Hub, Snapshot, SyncError};

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

enum Stage {
    Cached,
    Refresh,
    Done,
}

/// Orchestrates cache-first emission and per-source refresh for the logical
/// collections, federated search, and single-item reads.
pub struct SyncCoordinator {
    registry: Arc<SourceRegistry>,
    cache: Arc<dyn ResponseCache>,
    library: Arc<dyn LibraryStore>,
    search_timeout: Duration,
    on_deck_ttl_secs: i64,
    hubs_ttl_secs: i64,
    metadata_ttl_secs: i64,
}

impl SyncCoordinator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        cache: Arc<dyn ResponseCache>,
        library: Arc<dyn LibraryStore>,
    ) -> Self {
        Self {
            registry,
            cache,
            library,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            on_deck_ttl_secs: ON_DECK_TTL_SECS,
            hubs_ttl_secs: HUBS_TTL_SECS,
            metadata_ttl_secs: METADATA_TTL_SECS,
        }
    }

    /// Override the per-source federated search timeout.
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Override the per-endpoint cache TTLs.
    pub fn with_cache_ttls(mut self, on_deck: i64, hubs: i64, metadata: i64) -> Self {
        self.on_deck_ttl_secs = on_deck;
        self.hubs_ttl_secs = hubs;
        self.metadata_ttl_secs = metadata;
        self
    }

    /// On-deck snapshots: the cached merged view first, then the refreshed
    /// one. Every subscription re-runs the full cycle; dropping the stream
    /// cancels in-flight fetches (completed store writes stay persisted).
    pub fn observe_on_deck(&self) -> impl Stream<Item = Snapshot<Vec<CanonicalItem>>> + '_ {
        futures::stream::unfold(Stage::Cached, move |stage| async move {
            match stage {
                Stage::Cached => Some((
                    Snapshot {
                        value: self.cached_on_deck().await,
                        provisional: true,
                    },
                    Stage::Refresh,
                )),
                Stage::Refresh => Some((
                    Snapshot {
                        value: self.refresh_on_deck().await,
                        provisional: false,
                    },
                    Stage::Done,
                )),
                Stage::Done => None,
            }
        })
    }

    /// Hub snapshots, same cache-then-refresh protocol as on-deck.
    pub fn observe_hubs(&self) -> impl Stream<Item = Snapshot<Vec<Hub>>> + '_ {
        futures::stream::unfold(Stage::Cached, move |stage| async move {
            match stage {
                Stage::Cached => Some((
                    Snapshot {
                        value: self.cached_hubs().await,
                        provisional: true,
                    },
                    Stage::Refresh,
                )),
                Stage::Refresh => Some((
                    Snapshot {
                        value: self.refresh_hubs().await,
                        provisional: false,
                    },
                    Stage::Done,
                )),
                Stage::Done => None,
            }
        })
    }

    /// Federated free-text search with a hard per-source timeout: a slow or
    /// unreachable source contributes nothing instead of stalling the call.
    pub async fn search(&self, text: &str) -> Vec<CanonicalItem> {
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let futures: Vec<_> = sources
            .iter()
            .map(|handle| async move {
                match tokio::time::timeout(self.search_timeout, handle.client.search(text)).await {
                    Ok(Ok(records)) => to_items(records, &handle.descriptor),
                    Ok(Err(e)) => {
                        warn!(source = %handle.descriptor.id, error = %e, "Search failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(source = %handle.descriptor.id, "Search timed out");
                        Vec::new()
                    }
                }
            })
            .collect();

        let all: Vec<SourceItem> = futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        let mut results = merge(all, &owned);
        results.sort_by(|a, b| a.title.cmp(&b.title));
        results
    }

    /// Single-item metadata, cache-first.
    ///
    /// Degrades through the stale cache and the catalog store before
    /// surfacing the source's typed error, so callers can decide fallback
    /// behavior (e.g. try an alternate ref of the same canonical item).
    pub async fn get_item(&self, source_id: &str, item_id: &str) -> Result<SourceItem, SyncError> {
        let sources = self.registry.sources(false).await;
        let handle = sources.iter().find(|h| h.descriptor.id == source_id);

        let handle = match handle {
            Some(handle) => handle,
            None => {
                // Source vanished from discovery; the mirror may still know
                // the item.
                return match self.library.get(source_id, item_id)? {
                    Some(item) => Ok(item),
                    None => Err(SyncError::UnknownSource(source_id.to_string())),
                };
            }
        };

        let key = keys::metadata(source_id, item_id);
        if let Some(payload) = self.cache.get_fresh(&key)? {
            if let Some(record) = decode_record(&payload) {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                let item = SourceItem::from_record(record, &handle.descriptor, None, None);
                self.library.upsert(std::slice::from_ref(&item))?;
                return Ok(item);
            }
            metrics::CACHE_LOOKUPS.with_label_values(&["corrupt"]).inc();
        } else {
            metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        }

        match handle.client.get_item(item_id).await {
            Ok(record) => {
                if let Ok(payload) = serde_json::to_string(&record) {
                    self.cache.put(&key, &payload, self.metadata_ttl_secs)?;
                }
                let item = SourceItem::from_record(record, &handle.descriptor, None, None);
                self.library.upsert(std::slice::from_ref(&item))?;
                Ok(item)
            }
            Err(e) => {
                warn!(source = %source_id, item = %item_id, error = %e, "Item fetch failed");
                if let Some(payload) = self.cache.get_any(&key)? {
                    if let Some(record) = decode_record(&payload) {
                        metrics::CACHE_LOOKUPS.with_label_values(&["stale_hit"]).inc();
                        return Ok(SourceItem::from_record(record, &handle.descriptor, None, None));
                    }
                }
                if let Some(item) = self.library.get(source_id, item_id)? {
                    return Ok(item);
                }
                Err(e.into())
            }
        }
    }

    /// Rebuild the full canonical item behind a unified query row, with the
    /// user's preferred source (if any) reordered to the front of the refs.
    pub async fn resolve_unified(
        &self,
        row: &UnifiedRow,
        preferred_source: Option<&str>,
    ) -> Result<Option<CanonicalItem>, SyncError> {
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let items = self.library.get_many(&row.ref_pairs())?;
        let mut merged = merge(items, &owned);
        let mut item = match merged.pop() {
            Some(item) => item,
            None => return Ok(None),
        };
        if let Some(preferred) = preferred_source {
            prefer_source(&mut item, preferred);
        }
        Ok(Some(item))
    }

    // ------------------------------------------------------------------
    // On-deck
    // ------------------------------------------------------------------

    async fn cached_on_deck(&self) -> Vec<CanonicalItem> {
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let mut all = Vec::new();
        for handle in &sources {
            let key = keys::on_deck(&handle.descriptor.id);
            match self.cache.get_any(&key) {
                Ok(Some(payload)) => {
                    if let Some(records) = decode_records(&payload) {
                        all.extend(to_items(records, &handle.descriptor));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(source = %handle.descriptor.id, error = %e, "Cache read failed"),
            }
        }

        sort_by_recency(merge(all, &owned))
    }

    async fn refresh_on_deck(&self) -> Vec<CanonicalItem> {
        let start = Instant::now();
        // Reachable sources and their ownership are resolved once per
        // fan-out, not per item.
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let futures: Vec<_> = sources
            .iter()
            .map(|handle| async move {
                match self.fetch_on_deck(handle).await {
                    Ok(items) => items,
                    Err(e) => {
                        // Source-local failure; the rest of the fan-out is
                        // unaffected.
                        warn!(source = %handle.descriptor.id, error = %e, "On-deck refresh failed");
                        metrics::SOURCE_FETCHES
                            .with_label_values(&["ondeck", "failed"])
                            .inc();
                        Vec::new()
                    }
                }
            })
            .collect();

        let all: Vec<SourceItem> = futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        metrics::SYNC_CYCLE_DURATION
            .with_label_values(&["ondeck"])
            .observe(start.elapsed().as_secs_f64());

        sort_by_recency(merge(all, &owned))
    }

    async fn fetch_on_deck(&self, handle: &SourceHandle) -> Result<Vec<SourceItem>, SyncError> {
        let key = keys::on_deck(&handle.descriptor.id);

        if let Some(payload) = self.cache.get_fresh(&key)? {
            if let Some(records) = decode_records(&payload) {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                let items = to_items(records, &handle.descriptor);
                self.library.upsert(&items)?;
                return Ok(items);
            }
            metrics::CACHE_LOOKUPS.with_label_values(&["corrupt"]).inc();
        } else {
            metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        }

        match handle.client.on_deck().await {
            Ok(records) => {
                if let Ok(payload) = serde_json::to_string(&records) {
                    self.cache.put(&key, &payload, self.on_deck_ttl_secs)?;
                }
                let items = to_items(records, &handle.descriptor);
                self.library.upsert(&items)?;
                metrics::SOURCE_FETCHES
                    .with_label_values(&["ondeck", "ok"])
                    .inc();
                Ok(items)
            }
            Err(e) => {
                warn!(source = %handle.descriptor.id, error = %e, "On-deck fetch failed");
                // Degrade to the stale cache entry if one survives.
                if let Some(payload) = self.cache.get_any(&key)? {
                    if let Some(records) = decode_records(&payload) {
                        metrics::SOURCE_FETCHES
                            .with_label_values(&["ondeck", "degraded"])
                            .inc();
                        return Ok(to_items(records, &handle.descriptor));
                    }
                }
                metrics::SOURCE_FETCHES
                    .with_label_values(&["ondeck", "failed"])
                    .inc();
                Ok(Vec::new())
            }
        }
    }

    // ------------------------------------------------------------------
    // Hubs
    // ------------------------------------------------------------------

    async fn cached_hubs(&self) -> Vec<Hub> {
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let mut per_source = Vec::new();
        for handle in &sources {
            let key = keys::hubs(&handle.descriptor.id);
            match self.cache.get_any(&key) {
                Ok(Some(payload)) => {
                    if let Some(hubs) = decode_hubs(&payload) {
                        per_source.push((handle.descriptor.clone(), hubs));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(source = %handle.descriptor.id, error = %e, "Cache read failed"),
            }
        }

        aggregate_hubs(per_source, &owned)
    }

    async fn refresh_hubs(&self) -> Vec<Hub> {
        let start = Instant::now();
        let sources = self.registry.sources(false).await;
        let owned = owned_ids(&sources);

        let futures: Vec<_> = sources
            .iter()
            .map(|handle| async move {
                match self.fetch_hubs(handle).await {
                    Ok(hubs) => Some((handle.descriptor.clone(), hubs)),
                    Err(e) => {
                        warn!(source = %handle.descriptor.id, error = %e, "Hub refresh failed");
                        metrics::SOURCE_FETCHES
                            .with_label_values(&["hubs", "failed"])
                            .inc();
                        None
                    }
                }
            })
            .collect();

        let per_source: Vec<(SourceDescriptor, Vec<RawHub>)> =
            futures::future::join_all(futures)
                .await
                .into_iter()
                .flatten()
                .collect();

        metrics::SYNC_CYCLE_DURATION
            .with_label_values(&["hubs"])
            .observe(start.elapsed().as_secs_f64());

        aggregate_hubs(per_source, &owned)
    }

    async fn fetch_hubs(&self, handle: &SourceHandle) -> Result<Vec<RawHub>, SyncError> {
        let key = keys::hubs(&handle.descriptor.id);

        if let Some(payload) = self.cache.get_fresh(&key)? {
            if let Some(hubs) = decode_hubs(&payload) {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                self.persist_hub_items(&hubs, &handle.descriptor)?;
                return Ok(hubs);
            }
            metrics::CACHE_LOOKUPS.with_label_values(&["corrupt"]).inc();
        } else {
            metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        }

        match handle.client.hubs().await {
            Ok(hubs) => {
                if let Ok(payload) = serde_json::to_string(&hubs) {
                    self.cache.put(&key, &payload, self.hubs_ttl_secs)?;
                }
                self.persist_hub_items(&hubs, &handle.descriptor)?;
                metrics::SOURCE_FETCHES
                    .with_label_values(&["hubs", "ok"])
                    .inc();
                Ok(hubs)
            }
            Err(e) => {
                warn!(source = %handle.descriptor.id, error = %e, "Hub fetch failed");
                if let Some(payload) = self.cache.get_any(&key)? {
                    if let Some(hubs) = decode_hubs(&payload) {
                        metrics::SOURCE_FETCHES
                            .with_label_values(&["hubs", "degraded"])
                            .inc();
                        return Ok(hubs);
                    }
                }
                metrics::SOURCE_FETCHES
                    .with_label_values(&["hubs", "failed"])
                    .inc();
                Ok(Vec::new())
            }
        }
    }

    fn persist_hub_items(
        &self,
        hubs: &[RawHub],
        descriptor: &SourceDescriptor,
    ) -> Result<(), SyncError> {
        for hub in hubs {
            let items = to_items(hub.items.clone(), descriptor);
            self.library.upsert(&items)?;
        }
        Ok(())
    }
}

fn to_items(records: Vec<RawMediaRecord>, descriptor: &SourceDescriptor) -> Vec<SourceItem> {
    records
        .into_iter()
        .map(|record| SourceItem::from_record(record, descriptor, None, None))
        .collect()
}

fn sort_by_recency(mut items: Vec<CanonicalItem>) -> Vec<CanonicalItem> {
    items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    items
}

/// Group hubs by key across sources and merge each hub's items. Hubs and
/// their items come out in alphabetical order.
fn aggregate_hubs(
    per_source: Vec<(SourceDescriptor, Vec<RawHub>)>,
    owned: &std::collections::HashSet<String>,
) -> Vec<Hub> {
    let mut grouped: HashMap<String, (String, Vec<SourceItem>)> = HashMap::new();

    for (descriptor, hubs) in per_source {
        for hub in hubs {
            let entry = grouped
                .entry(hub.key.clone())
                .or_insert_with(|| (hub.title.clone(), Vec::new()));
            entry.1.extend(to_items(hub.items, &descriptor));
        }
    }

    let mut result: Vec<Hub> = grouped
        .into_iter()
        .map(|(key, (title, items))| {
            let mut merged = merge(items, owned);
            merged.sort_by(|a, b| a.title.cmp(&b.title));
            Hub {
                key,
                title,
                items: merged,
            }
        })
        .collect();

    result.sort_by(|a, b| a.title.cmp(&b.title));
    debug!(hubs = result.len(), "Aggregated hubs");
    result
}

fn decode_records(payload: &str) -> Option<Vec<RawMediaRecord>> {
    match serde_json::from_str(payload) {
        Ok(records) => Some(records),
        Err(e) => {
            // Corrupt cache payloads degrade to a miss, never a hard failure.
            warn!(error = %e, "Corrupt cached records payload");
            None
        }
    }
}

fn decode_record(payload: &str) -> Option<RawMediaRecord> {
    match serde_json::from_str(payload) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Corrupt cached record payload");
            None
        }
    }
}

fn decode_hubs(payload: &str) -> Option<Vec<RawHub>> {
    match serde_json::from_str(payload) {
        Ok(hubs) => Some(hubs),
        Err(e) => {
            warn!(error = %e, "Corrupt cached hubs payload");
            None
        }
    }
}
