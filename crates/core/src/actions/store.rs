//! Pending-action storage trait.

use super::{ActionError, ActionKind, PendingAction};

/// Request to enqueue a new action.
#[derive(Debug, Clone)]
pub struct EnqueueAction {
    pub source_id: String,
    pub item_id: String,
    pub kind: ActionKind,
    /// Required for progress actions.
    pub view_offset_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl EnqueueAction {
    pub fn progress(
        source_id: impl Into<String>,
        item_id: impl Into<String>,
        view_offset_ms: i64,
        duration_ms: i64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            item_id: item_id.into(),
            kind: ActionKind::Progress,
            view_offset_ms: Some(view_offset_ms),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn watched(source_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            item_id: item_id.into(),
            kind: ActionKind::Watched,
            view_offset_ms: None,
            duration_ms: None,
        }
    }

    pub fn unwatched(source_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            item_id: item_id.into(),
            kind: ActionKind::Unwatched,
            view_offset_ms: None,
            duration_ms: None,
        }
    }
}

/// Trait for pending-action storage backends.
pub trait PendingActionStore: Send + Sync {
    /// Enqueue a new action. `should_mark_watched` is precomputed here for
    /// progress actions.
    fn enqueue(&self, request: EnqueueAction) -> Result<PendingAction, ActionError>;

    /// All pending actions in enqueue order.
    fn list_pending(&self) -> Result<Vec<PendingAction>, ActionError>;

    /// The most recent action for a global key, if any. Later actions for
    /// the same key logically supersede earlier ones.
    fn latest_for_key(&self, global_key: &str) -> Result<Option<PendingAction>, ActionError>;

    /// Record a failed replay: bumps `attempt_count`, stores the error.
    fn record_failure(&self, id: &str, error: &str) -> Result<PendingAction, ActionError>;

    /// Remove an action (successful replay, or dropped at the ceiling).
    fn delete(&self, id: &str) -> Result<(), ActionError>;

    /// Remove every action queued against one source. Returns how many.
    fn delete_for_source(&self, source_id: &str) -> Result<u32, ActionError>;

    /// Number of queued actions.
    fn count(&self) -> Result<i64, ActionError>;

    /// Drop the whole queue (e.g. credential switch).
    fn clear(&self) -> Result<(), ActionError>;
}
