//! Mock source provider for testing the registry.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::source::{SourceError, SourceHandle, SourceProvider};

/// Mock implementation of the `SourceProvider` trait.
pub struct MockSourceProvider {
    handles: Mutex<Vec<SourceHandle>>,
    next_error: Mutex<Option<SourceError>>,
    discover_count: Mutex<usize>,
}

impl Default for MockSourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSourceProvider {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            discover_count: Mutex::new(0),
        }
    }

    pub fn with_handles(handles: Vec<SourceHandle>) -> Self {
        let provider = Self::new();
        *provider.handles.lock().unwrap() = handles;
        provider
    }

    pub fn set_handles(&self, handles: Vec<SourceHandle>) {
        *self.handles.lock().unwrap() = handles;
    }

    /// Fail the next discovery with the given error.
    pub fn set_next_error(&self, error: SourceError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// How many times discovery ran.
    pub fn discover_count(&self) -> usize {
        *self.discover_count.lock().unwrap()
    }
}

#[async_trait]
impl SourceProvider for MockSourceProvider {
    async fn discover(&self) -> Result<Vec<SourceHandle>, SourceError> {
        *self.discover_count.lock().unwrap() += 1;

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.handles.lock().unwrap().clone())
    }
}
