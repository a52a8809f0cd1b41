//! Durable offline action queue.
//!
//! User mutations of playback/watch state are queued locally, applied
//! optimistically to the catalog mirror, and replayed against their source
//! when it is reachable. Replays retry with a bounded ceiling; actions that
//! keep failing are dropped, an accepted data-loss tradeoff that bounds the
//! queue.

mod queue;
mod sqlite;
mod store;
mod types;

pub use queue::{ActionQueue, ReplayReport};
pub use sqlite::SqliteActionStore;
pub use store::{EnqueueAction, PendingActionStore};
pub use types::{
    compute_should_mark_watched, ActionError, ActionKind, PendingAction, RETRY_CEILING,
    WATCHED_THRESHOLD,
};
