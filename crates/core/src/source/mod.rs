//! Media source abstraction.
//!
//! A source is an independent remote media server contributing records to
//! the unified catalog. This module provides the `SourceClient` trait, an
//! HTTP implementation, and the `SourceRegistry` that caches the resolved
//! source list (connection discovery itself is an external collaborator).

mod http;
mod registry;
mod types;

pub use http::HttpSourceClient;
pub use registry::{owned_ids, SourceHandle, SourceProvider, SourceRegistry};
pub use types::*;
