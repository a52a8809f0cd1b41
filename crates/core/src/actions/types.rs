//! Core pending-action data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Replay attempts before an action is dropped for good.
pub const RETRY_CEILING: u32 = 5;

/// Fraction of the duration past which a progress report implies watched.
pub const WATCHED_THRESHOLD: f64 = 0.9;

/// Kind of queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Progress,
    Watched,
    Unwatched,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Progress => "progress",
            ActionKind::Watched => "watched",
            ActionKind::Unwatched => "unwatched",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(ActionKind::Progress),
            "watched" => Some(ActionKind::Watched),
            "unwatched" => Some(ActionKind::Unwatched),
            _ => None,
        }
    }
}

/// A queued state mutation awaiting replay to its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub source_id: String,
    pub item_id: String,
    /// `<source_id>:<item_id>`; the latest action per key is authoritative
    /// for the locally believed watched state.
    pub global_key: String,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_offset_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Precomputed at enqueue time for progress actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_mark_watched: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingAction {
    pub fn global_key_for(source_id: &str, item_id: &str) -> String {
        format!("{}:{}", source_id, item_id)
    }

    /// What this action asserts the watched state to be: explicit watched
    /// and unwatched actions are direct assertions, progress falls back to
    /// its precomputed flag.
    pub fn effective_watched(&self) -> Option<bool> {
        match self.kind {
            ActionKind::Watched => Some(true),
            ActionKind::Unwatched => Some(false),
            ActionKind::Progress => self.should_mark_watched,
        }
    }
}

/// `view_offset / duration > 0.9`, strictly. Exactly 90% does not count.
pub fn compute_should_mark_watched(view_offset_ms: i64, duration_ms: i64) -> bool {
    if duration_ms <= 0 {
        return false;
    }
    view_offset_ms as f64 / duration_ms as f64 > WATCHED_THRESHOLD
}

/// Errors for pending-action operations.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Action not found: {0}")]
    NotFound(String),
}
