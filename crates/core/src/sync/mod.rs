//! Sync coordination: cache-first views with per-source refresh fan-out.
//!
//! For each logical collection (on-deck, hubs) the coordinator emits the
//! cached/persisted merged view immediately, then fans out one fetch per
//! known source and emits the refreshed merged view once all per-source
//! tasks settle. A failing source contributes nothing; it never fails the
//! cycle.

mod coordinator;
mod types;

pub use coordinator::SyncCoordinator;
pub use types::{Hub, Snapshot, SyncError};
