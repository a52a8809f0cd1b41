//! Enqueue, optimistic apply, replay and reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::cache::{keys, ResponseCache, METADATA_TTL_SECS};
use crate::library::{LibraryError, LibraryStore, SourceItem, WatchStateUpdate};
use crate::metrics;
use crate::source::{RawMediaRecord, SourceDescriptor, SourceError, SourceHandle, SourceRegistry};

use super::{
    ActionError, ActionKind, EnqueueAction, PendingAction, PendingActionStore, RETRY_CEILING,
};

const RECONCILE_MIN_INTERVAL: Duration = Duration::from_secs(120);

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: u32,
    pub failed: u32,
    pub dropped: u32,
}

/// The offline action queue.
///
/// Mutations go into the durable store first and are applied optimistically
/// to the catalog mirror; replay happens when a caller drains the queue
/// (there is no timer in here, the caller controls when drains run).
pub struct ActionQueue {
    store: Arc<dyn PendingActionStore>,
    library: Arc<dyn LibraryStore>,
    cache: Arc<dyn ResponseCache>,
    registry: Arc<SourceRegistry>,
    retry_ceiling: u32,
    reconcile_min_interval: Duration,
    last_pull: Mutex<Option<Instant>>,
}

impl ActionQueue {
    pub fn new(
        store: Arc<dyn PendingActionStore>,
        library: Arc<dyn LibraryStore>,
        cache: Arc<dyn ResponseCache>,
        registry: Arc<SourceRegistry>,
    ) -> Self {
        Self {
            store,
            library,
            cache,
            registry,
            retry_ceiling: RETRY_CEILING,
            reconcile_min_interval: RECONCILE_MIN_INTERVAL,
            last_pull: Mutex::new(None),
        }
    }

    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    pub fn with_reconcile_min_interval(mut self, interval: Duration) -> Self {
        self.reconcile_min_interval = interval;
        self
    }

    /// Queue a playback position report.
    pub fn record_progress(
        &self,
        source_id: &str,
        item_id: &str,
        view_offset_ms: i64,
        duration_ms: i64,
    ) -> Result<PendingAction, ActionError> {
        let action = self.store.enqueue(EnqueueAction::progress(
            source_id,
            item_id,
            view_offset_ms,
            duration_ms,
        ))?;
        metrics::ACTIONS_ENQUEUED
            .with_label_values(&["progress"])
            .inc();
        self.apply_locally(
            source_id,
            item_id,
            WatchStateUpdate::Progress { view_offset_ms },
        )?;
        Ok(action)
    }

    /// Queue a watched assertion.
    pub fn mark_watched(&self, source_id: &str, item_id: &str) -> Result<PendingAction, ActionError> {
        let action = self.store.enqueue(EnqueueAction::watched(source_id, item_id))?;
        metrics::ACTIONS_ENQUEUED
            .with_label_values(&["watched"])
            .inc();
        self.apply_locally(source_id, item_id, WatchStateUpdate::Watched)?;
        Ok(action)
    }

    /// Queue an unwatched assertion.
    pub fn mark_unwatched(
        &self,
        source_id: &str,
        item_id: &str,
    ) -> Result<PendingAction, ActionError> {
        let action = self
            .store
            .enqueue(EnqueueAction::unwatched(source_id, item_id))?;
        metrics::ACTIONS_ENQUEUED
            .with_label_values(&["unwatched"])
            .inc();
        self.apply_locally(source_id, item_id, WatchStateUpdate::Unwatched)?;
        Ok(action)
    }

    /// What the queue believes the watched state is, from the latest
    /// pending action for the item. `None` when nothing is pending (the
    /// mirror's persisted state stands).
    pub fn effective_watched(
        &self,
        source_id: &str,
        item_id: &str,
    ) -> Result<Option<bool>, ActionError> {
        let key = PendingAction::global_key_for(source_id, item_id);
        Ok(self
            .store
            .latest_for_key(&key)?
            .and_then(|action| action.effective_watched()))
    }

    /// Replay pending actions against their sources.
    ///
    /// Actions for sources that vanished from discovery are dropped.
    /// Failures bump the attempt count; an action reaching the ceiling is
    /// dropped for good. Fatal errors (bad credential) leave the source's
    /// queue untouched and are only logged.
    pub async fn sync_pending(&self) -> Result<ReplayReport, ActionError> {
        let mut report = ReplayReport::default();
        let actions = self.store.list_pending()?;
        if actions.is_empty() {
            return Ok(report);
        }

        let sources = self.registry.sources(false).await;
        let handles: HashMap<&str, &SourceHandle> = sources
            .iter()
            .map(|h| (h.descriptor.id.as_str(), h))
            .collect();

        // Group by source, preserving queue order within each group.
        let mut order: Vec<String> = Vec::new();
        let mut by_source: HashMap<String, Vec<PendingAction>> = HashMap::new();
        for action in actions {
            if !by_source.contains_key(&action.source_id) {
                order.push(action.source_id.clone());
            }
            by_source.entry(action.source_id.clone()).or_default().push(action);
        }

        for source_id in order {
            let actions = by_source.remove(&source_id).unwrap_or_default();
            let Some(handle) = handles.get(source_id.as_str()) else {
                let dropped = self.store.delete_for_source(&source_id)?;
                warn!(
                    source = %source_id,
                    dropped = dropped,
                    "Source no longer present, dropping its queued actions"
                );
                metrics::ACTIONS_DROPPED.inc_by(dropped as u64);
                report.dropped += dropped;
                continue;
            };

            for action in actions {
                match self.replay_action(handle, &action).await {
                    Ok(()) => {
                        self.store.delete(&action.id)?;
                        self.cache
                            .evict(&keys::metadata(&action.source_id, &action.item_id))
                            .map_err(|e| ActionError::Database(e.to_string()))?;
                        metrics::ACTIONS_REPLAYED.with_label_values(&["ok"]).inc();
                        report.replayed += 1;
                    }
                    Err(e) if e.is_fatal() => {
                        // Not a retry case: surface immediately and leave the
                        // rest of this source's queue for a later drain.
                        error!(source = %source_id, error = %e, "Fatal replay error");
                        break;
                    }
                    Err(e) => {
                        debug!(
                            source = %source_id,
                            item = %action.item_id,
                            error = %e,
                            "Replay failed"
                        );
                        let updated = self.store.record_failure(&action.id, &e.to_string())?;
                        metrics::ACTIONS_REPLAYED.with_label_values(&["failed"]).inc();
                        report.failed += 1;

                        if updated.attempt_count >= self.retry_ceiling {
                            warn!(
                                item = %action.item_id,
                                attempts = updated.attempt_count,
                                "Dropping action at retry ceiling"
                            );
                            self.store.delete(&action.id)?;
                            metrics::ACTIONS_DROPPED.inc();
                            report.dropped += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Bidirectional reconciliation: push pending actions, then pull fresh
    /// state for locally-known items.
    ///
    /// The push always runs first so local intent is never overwritten by a
    /// stale pull racing a still-pending push; items that still have queued
    /// actions after the push are skipped by the pull for the same reason.
    /// The pull is throttled to once per interval unless `force`.
    pub async fn reconcile(&self, force: bool) -> Result<ReplayReport, ActionError> {
        let report = self.sync_pending().await?;

        {
            let mut last_pull = self.last_pull.lock().await;
            if !force {
                if let Some(last) = *last_pull {
                    if last.elapsed() < self.reconcile_min_interval {
                        debug!("Reconciliation pull throttled");
                        return Ok(report);
                    }
                }
            }
            *last_pull = Some(Instant::now());
        }

        metrics::RECONCILE_PULLS.inc();

        let still_pending: HashSet<String> = self
            .store
            .list_pending()?
            .into_iter()
            .map(|a| a.global_key)
            .collect();

        let sources = self.registry.sources(false).await;
        for handle in &sources {
            if let Err(e) = self.pull_source(handle, &still_pending).await {
                warn!(source = %handle.descriptor.id, error = %e, "Reconciliation pull failed");
            }
        }

        Ok(report)
    }

    fn apply_locally(
        &self,
        source_id: &str,
        item_id: &str,
        update: WatchStateUpdate,
    ) -> Result<(), ActionError> {
        match self.library.set_watch_state(source_id, item_id, update) {
            Ok(()) => {}
            Err(LibraryError::NotFound(_)) => {
                // The item isn't mirrored locally yet; the queued action is
                // still the source of truth for replay.
                debug!(source = %source_id, item = %item_id, "Optimistic apply on unknown item");
            }
            Err(e) => return Err(ActionError::Database(e.to_string())),
        }
        self.cache
            .evict(&keys::metadata(source_id, item_id))
            .map_err(|e| ActionError::Database(e.to_string()))?;
        Ok(())
    }

    async fn replay_action(
        &self,
        handle: &SourceHandle,
        action: &PendingAction,
    ) -> Result<(), SourceError> {
        match action.kind {
            ActionKind::Watched => handle.client.mark_watched(&action.item_id).await,
            ActionKind::Unwatched => handle.client.mark_unwatched(&action.item_id).await,
            ActionKind::Progress => {
                let offset = action.view_offset_ms.unwrap_or(0);
                let duration = action.duration_ms.unwrap_or(0);
                handle
                    .client
                    .update_progress(&action.item_id, offset, duration)
                    .await?;
                if action.should_mark_watched == Some(true) {
                    handle.client.mark_watched(&action.item_id).await?;
                }
                Ok(())
            }
        }
    }

    async fn pull_source(
        &self,
        handle: &SourceHandle,
        still_pending: &HashSet<String>,
    ) -> Result<(), ActionError> {
        let items = self
            .library
            .all_for_source(&handle.descriptor.id)
            .map_err(|e| ActionError::Database(e.to_string()))?;

        let mut shows: Vec<String> = Vec::new();
        let mut singles: Vec<SourceItem> = Vec::new();
        for item in items {
            let key = PendingAction::global_key_for(&item.source_id, &item.item_id);
            if still_pending.contains(&key) {
                continue;
            }
            match item.grandparent_id {
                // Episodes are pulled once per show, not one by one.
                Some(ref show_id) => {
                    if !shows.contains(show_id) {
                        shows.push(show_id.clone());
                    }
                }
                None => singles.push(item),
            }
        }

        for show_id in shows {
            match handle.client.children(&show_id).await {
                Ok(records) => self.persist_pulled(records, &handle.descriptor)?,
                Err(e) => {
                    warn!(source = %handle.descriptor.id, show = %show_id, error = %e, "Episode pull failed")
                }
            }
        }

        for item in singles {
            match handle.client.get_item(&item.item_id).await {
                Ok(record) => {
                    let key = keys::metadata(&handle.descriptor.id, &record.item_id);
                    if let Ok(payload) = serde_json::to_string(&record) {
                        self.cache
                            .put(&key, &payload, METADATA_TTL_SECS)
                            .map_err(|e| ActionError::Database(e.to_string()))?;
                    }
                    self.persist_pulled(vec![record], &handle.descriptor)?;
                }
                Err(SourceError::NotFound(_)) => {
                    debug!(source = %handle.descriptor.id, item = %item.item_id, "Item gone on source");
                }
                Err(e) => {
                    warn!(source = %handle.descriptor.id, item = %item.item_id, error = %e, "Item pull failed")
                }
            }
        }

        Ok(())
    }

    fn persist_pulled(
        &self,
        records: Vec<RawMediaRecord>,
        descriptor: &SourceDescriptor,
    ) -> Result<(), ActionError> {
        let items: Vec<SourceItem> = records
            .into_iter()
            .map(|record| SourceItem::from_record(record, descriptor, None, None))
            .collect();
        self.library
            .upsert(&items)
            .map_err(|e| ActionError::Database(e.to_string()))?;
        Ok(())
    }
}
