//! Mock source client for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::source::{RawHub, RawMediaRecord, SourceClient, SourceError};

/// A recorded client call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    OnDeck,
    Hubs,
    Section {
        section: String,
        offset: u32,
        limit: u32,
        sort: String,
    },
    GetItem(String),
    Children(String),
    Search(String),
    MarkWatched(String),
    MarkUnwatched(String),
    UpdateProgress {
        item_id: String,
        view_offset_ms: i64,
        duration_ms: i64,
    },
}

/// Mock implementation of the `SourceClient` trait.
///
/// Provides controllable behavior for testing:
/// - configurable on-deck, hub, section and item payloads
/// - recorded calls for assertions
/// - one-shot and persistent failure injection
/// - an optional artificial delay to exercise timeouts
pub struct MockSourceClient {
    source_id: String,
    on_deck: Mutex<Vec<RawMediaRecord>>,
    hubs: Mutex<Vec<RawHub>>,
    sections: Mutex<HashMap<String, Vec<RawMediaRecord>>>,
    items: Mutex<Vec<RawMediaRecord>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// If set, the next call fails with this error (consumed).
    next_error: Mutex<Option<SourceError>>,
    /// If set, every call fails as unreachable with this message.
    fail_all: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for MockSourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSourceClient")
            .field("source_id", &self.source_id)
            .finish()
    }
}

impl MockSourceClient {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            on_deck: Mutex::new(Vec::new()),
            hubs: Mutex::new(Vec::new()),
            sections: Mutex::new(HashMap::new()),
            items: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            fail_all: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    pub fn set_on_deck(&self, records: Vec<RawMediaRecord>) {
        *self.on_deck.lock().unwrap() = records;
    }

    pub fn set_hubs(&self, hubs: Vec<RawHub>) {
        *self.hubs.lock().unwrap() = hubs;
    }

    pub fn set_section_items(&self, section: &str, records: Vec<RawMediaRecord>) {
        self.sections
            .lock()
            .unwrap()
            .insert(section.to_string(), records);
    }

    /// Items served by `get_item`, `children` and `search`.
    pub fn set_items(&self, records: Vec<RawMediaRecord>) {
        *self.items.lock().unwrap() = records;
    }

    /// Fail the next call with the given error.
    pub fn set_next_error(&self, error: SourceError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Fail every call as unreachable until cleared with `set_reachable`.
    pub fn set_unreachable(&self, message: &str) {
        *self.fail_all.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_reachable(&self) {
        *self.fail_all.lock().unwrap() = None;
    }

    /// Delay every call, for timeout tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_recorded(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn before_call(&self, call: RecordedCall) -> Result<(), SourceError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(call);

        if let Some(message) = self.fail_all.lock().unwrap().clone() {
            return Err(SourceError::Unreachable(message));
        }
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn on_deck(&self) -> Result<Vec<RawMediaRecord>, SourceError> {
        self.before_call(RecordedCall::OnDeck).await?;
        Ok(self.on_deck.lock().unwrap().clone())
    }

    async fn hubs(&self) -> Result<Vec<RawHub>, SourceError> {
        self.before_call(RecordedCall::Hubs).await?;
        Ok(self.hubs.lock().unwrap().clone())
    }

    async fn library_section(
        &self,
        section: &str,
        offset: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Vec<RawMediaRecord>, SourceError> {
        self.before_call(RecordedCall::Section {
            section: section.to_string(),
            offset,
            limit,
            sort: sort.to_string(),
        })
        .await?;

        let sections = self.sections.lock().unwrap();
        let records = sections.get(section).cloned().unwrap_or_default();
        Ok(records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_item(&self, item_id: &str) -> Result<RawMediaRecord, SourceError> {
        self.before_call(RecordedCall::GetItem(item_id.to_string()))
            .await?;

        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.item_id == item_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(item_id.to_string()))
    }

    async fn children(&self, parent_id: &str) -> Result<Vec<RawMediaRecord>, SourceError> {
        self.before_call(RecordedCall::Children(parent_id.to_string()))
            .await?;

        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.parent_id.as_deref() == Some(parent_id)
                    || r.grandparent_id.as_deref() == Some(parent_id)
            })
            .cloned()
            .collect())
    }

    async fn search(&self, text: &str) -> Result<Vec<RawMediaRecord>, SourceError> {
        self.before_call(RecordedCall::Search(text.to_string()))
            .await?;

        let text_lower = text.to_lowercase();
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.title.to_lowercase().contains(&text_lower))
            .cloned()
            .collect())
    }

    async fn mark_watched(&self, item_id: &str) -> Result<(), SourceError> {
        self.before_call(RecordedCall::MarkWatched(item_id.to_string()))
            .await
    }

    async fn mark_unwatched(&self, item_id: &str) -> Result<(), SourceError> {
        self.before_call(RecordedCall::MarkUnwatched(item_id.to_string()))
            .await
    }

    async fn update_progress(
        &self,
        item_id: &str,
        view_offset_ms: i64,
        duration_ms: i64,
    ) -> Result<(), SourceError> {
        self.before_call(RecordedCall::UpdateProgress {
            item_id: item_id.to_string(),
            view_offset_ms,
            duration_ms,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_on_deck_and_recording() {
        let client = MockSourceClient::new("srv-a");
        client.set_on_deck(vec![fixtures::movie_record("1", "Inception")]);

        let records = client.on_deck().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(client.recorded_calls(), vec![RecordedCall::OnDeck]);
    }

    #[tokio::test]
    async fn test_section_paging() {
        let client = MockSourceClient::new("srv-a");
        client.set_section_items(
            "2",
            (0..5)
                .map(|i| fixtures::movie_record(&i.to_string(), &format!("Movie {}", i)))
                .collect(),
        );

        let page = client.library_section("2", 2, 2, "added_at:desc").await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].item_id, "2");
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let client = MockSourceClient::new("srv-a");
        client.set_next_error(SourceError::Unreachable("down".into()));

        assert!(client.on_deck().await.is_err());
        assert!(client.on_deck().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_persists_until_cleared() {
        let client = MockSourceClient::new("srv-a");
        client.set_unreachable("cable pulled");

        assert!(client.on_deck().await.is_err());
        assert!(client.hubs().await.is_err());

        client.set_reachable();
        assert!(client.on_deck().await.is_ok());
    }

    #[tokio::test]
    async fn test_get_item_not_found() {
        let client = MockSourceClient::new("srv-a");
        let result = client.get_item("absent").await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_children_matches_parent_and_grandparent() {
        let client = MockSourceClient::new("srv-a");
        client.set_items(vec![
            fixtures::episode_record("e1", "Pilot", "season-1", "show-1"),
            fixtures::episode_record("e2", "Part Two", "season-1", "show-1"),
            fixtures::movie_record("m1", "Unrelated"),
        ]);

        assert_eq!(client.children("show-1").await.unwrap().len(), 2);
        assert_eq!(client.children("season-1").await.unwrap().len(), 2);
        assert!(client.children("show-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_by_title() {
        let client = MockSourceClient::new("srv-a");
        client.set_items(vec![
            fixtures::movie_record("1", "Inception"),
            fixtures::movie_record("2", "Tenet"),
        ]);

        let results = client.search("incep").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Inception");
    }
}
