//! Remote-fetch-on-demand paging for single-source library sections.
//!
//! The local window over a section is served from the catalog store; when a
//! requested page runs past what is stored, the pager fetches further pages
//! from the source (which applies the requested sort), appends them with
//! stable page offsets, and answers from the store again. A remote failure
//! degrades to whatever is stored locally instead of failing the page.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{LibraryError, LibraryQuery, LibraryStore, SortField, SourceItem};
use crate::source::SourceHandle;

struct PagerState {
    next_remote_offset: i64,
    exhausted: bool,
}

/// Mediator between the catalog store window and one source section.
pub struct LibraryPager {
    source: SourceHandle,
    section: String,
    sort: SortField,
    descending: bool,
    page_size: u32,
    store: Arc<dyn LibraryStore>,
    state: Mutex<PagerState>,
}

impl LibraryPager {
    pub fn new(
        source: SourceHandle,
        section: impl Into<String>,
        sort: SortField,
        descending: bool,
        page_size: u32,
        store: Arc<dyn LibraryStore>,
    ) -> Self {
        Self {
            source,
            section: section.into(),
            sort,
            descending,
            page_size,
            store,
            state: Mutex::new(PagerState {
                next_remote_offset: 0,
                exhausted: false,
            }),
        }
    }

    /// One page of the section in source-defined order, fetching further
    /// remote pages first if the local window is too short.
    pub async fn page(&self, offset: i64, limit: i64) -> Result<Vec<SourceItem>, LibraryError> {
        let needed = offset + limit;
        let mut state = self.state.lock().await;

        // A fresh pager starts after whatever previous sessions persisted.
        if state.next_remote_offset == 0 {
            state.next_remote_offset = self
                .store
                .section_row_count(&self.source.descriptor.id, &self.section)?;
        }

        while !state.exhausted
            && self
                .store
                .section_row_count(&self.source.descriptor.id, &self.section)?
                < needed
        {
            let remote_offset = state.next_remote_offset;
            let sort_param = self.sort.as_remote_param(self.descending);

            let records = match self
                .source
                .client
                .library_section(
                    &self.section,
                    remote_offset as u32,
                    self.page_size,
                    &sort_param,
                )
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        source = %self.source.descriptor.id,
                        section = %self.section,
                        error = %e,
                        "Remote page fetch failed, serving local window"
                    );
                    break;
                }
            };

            let fetched = records.len();
            let items: Vec<SourceItem> = records
                .into_iter()
                .enumerate()
                .map(|(idx, record)| {
                    SourceItem::from_record(
                        record,
                        &self.source.descriptor,
                        Some(&self.section),
                        Some(remote_offset + idx as i64),
                    )
                })
                .collect();
            self.store.upsert(&items)?;
            state.next_remote_offset += fetched as i64;

            debug!(
                source = %self.source.descriptor.id,
                section = %self.section,
                offset = remote_offset,
                fetched = fetched,
                "Appended remote page"
            );

            if fetched < self.page_size as usize {
                state.exhausted = true;
            }
        }
        drop(state);

        let query = LibraryQuery::for_source(self.source.descriptor.id.clone())
            .with_section(self.section.clone())
            .with_page(offset, limit);
        self.store.query(&query)
    }
}
