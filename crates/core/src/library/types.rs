//! Types for the local catalog mirror and the virtual library queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merge::unification_key;
use crate::source::{MediaKind, RawMediaRecord, SourceDescriptor, SourceItemAttributes};

/// A per-source catalog record as persisted, pre-deduplication.
///
/// Rows are partitioned by source: concurrent fan-out tasks upsert disjoint
/// `(source_id, item_id)` keys, so interleaved writes are safe without
/// cross-row locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub source_id: String,
    pub item_id: String,
    /// Grouping key, computed at ingest (imdb > tmdb > title+year).
    pub unification_key: String,
    /// Library section this item was paged from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub kind: MediaKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_offset_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub watched: bool,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_url: Option<String>,
    #[serde(default)]
    pub attributes: SourceItemAttributes,
    /// Display name of the contributing source.
    pub source_name: String,
    /// Ownership flag of the contributing source, resolved at ingest.
    pub source_owned: bool,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Position within the source-defined section order. `None` for items
    /// ingested outside a paged section scan (on-deck, hubs, search).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_offset: Option<i64>,
}

impl SourceItem {
    /// Build a persistable item from a raw record and its source.
    pub fn from_record(
        record: RawMediaRecord,
        descriptor: &SourceDescriptor,
        section_id: Option<&str>,
        page_offset: Option<i64>,
    ) -> Self {
        let key = unification_key(
            record.imdb_id.as_deref(),
            record.tmdb_id.as_deref(),
            &record.title,
            record.year,
        );
        Self {
            source_id: descriptor.id.clone(),
            item_id: record.item_id,
            unification_key: key,
            section_id: section_id.map(|s| s.to_string()),
            kind: record.kind,
            title: record.title,
            year: record.year,
            imdb_id: record.imdb_id,
            tmdb_id: record.tmdb_id,
            rating: record.rating,
            audience_rating: record.audience_rating,
            genres: record.genres,
            view_offset_ms: record.view_offset_ms,
            duration_ms: record.duration_ms,
            watched: record.watched,
            view_count: record.view_count,
            parent_id: record.parent_id,
            grandparent_id: record.grandparent_id,
            thumb_url: record.thumb_url,
            art_url: record.art_url,
            attributes: record.attributes,
            source_name: descriptor.name.clone(),
            source_owned: descriptor.owned,
            added_at: record.added_at,
            updated_at: record.updated_at,
            page_offset,
        }
    }
}

/// Which sources a query runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerScope {
    /// All sources, grouped by unification key (one row per group).
    All,
    /// A single source's items, in source-defined page order.
    Source(String),
}

/// Whitelisted sort columns.
///
/// The column name is always resolved from this enum, never from a caller
/// string, so the sort can't smuggle SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    AddedAt,
    Title,
    Year,
    Rating,
}

impl SortField {
    /// Aggregated column used in unified (grouped) mode.
    pub(crate) fn unified_column(&self) -> &'static str {
        match self {
            SortField::AddedAt => "max_added_at",
            SortField::Title => "sort_title",
            SortField::Year => "year",
            SortField::Rating => "avg_rating",
        }
    }

    /// Sort parameter forwarded to the remote source when paging a section.
    pub fn as_remote_param(&self, descending: bool) -> String {
        let field = match self {
            SortField::AddedAt => "added_at",
            SortField::Title => "title",
            SortField::Year => "year",
            SortField::Rating => "rating",
        };
        format!("{}:{}", field, if descending { "desc" } else { "asc" })
    }
}

/// Parameters of a virtual library query.
///
/// Filters are AND-composed and each independently optional; every value is
/// bound as a parameter when the query is built.
#[derive(Debug, Clone)]
pub struct LibraryQuery {
    pub scope: ServerScope,
    /// Restrict to one library section.
    pub section: Option<String>,
    pub kind: Option<MediaKind>,
    /// Genre match: OR of substring tests over these keywords (a UI genre
    /// label expands to several synonyms).
    pub genre_keywords: Vec<String>,
    /// Sources the user has hidden (unified mode).
    pub excluded_source_ids: Vec<String>,
    /// Restrict unified results to one source.
    pub server_filter: Option<String>,
    /// Free-text substring match on title.
    pub search_text: Option<String>,
    pub sort: SortField,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for LibraryQuery {
    fn default() -> Self {
        Self::unified()
    }
}

impl LibraryQuery {
    /// Query across all sources, newest first.
    pub fn unified() -> Self {
        Self {
            scope: ServerScope::All,
            section: None,
            kind: None,
            genre_keywords: Vec::new(),
            excluded_source_ids: Vec::new(),
            server_filter: None,
            search_text: None,
            sort: SortField::AddedAt,
            descending: true,
            limit: 100,
            offset: 0,
        }
    }

    /// Query a single source.
    pub fn for_source(source_id: impl Into<String>) -> Self {
        Self {
            scope: ServerScope::Source(source_id.into()),
            ..Self::unified()
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_genre_keywords(mut self, keywords: Vec<String>) -> Self {
        self.genre_keywords = keywords;
        self
    }

    pub fn with_excluded_sources(mut self, source_ids: Vec<String>) -> Self {
        self.excluded_source_ids = source_ids;
        self
    }

    pub fn with_server_filter(mut self, source_id: impl Into<String>) -> Self {
        self.server_filter = Some(source_id.into());
        self
    }

    pub fn with_search_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn with_sort(mut self, sort: SortField, descending: bool) -> Self {
        self.sort = sort;
        self.descending = descending;
        self
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One row of a unified (grouped) query.
///
/// Display fields are cosmetic here, taken from an arbitrary group member;
/// the authoritative per-field selection happens in the deduplicator when
/// the full refs are reconstructed for presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedRow {
    pub unification_key: String,
    pub title: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Newest added-at across the group.
    pub added_at: DateTime<Utc>,
    /// Mean of non-null per-source ratings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_rating: Option<f64>,
    /// Contributing sources; same order and length as `item_ids`.
    pub source_ids: Vec<String>,
    pub item_ids: Vec<String>,
    /// Alternative artwork across the group, null-filtered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumb_urls: Vec<String>,
}

impl UnifiedRow {
    /// `(source_id, item_id)` pairs for reconstructing the full refs.
    pub fn ref_pairs(&self) -> Vec<(String, String)> {
        self.source_ids
            .iter()
            .cloned()
            .zip(self.item_ids.iter().cloned())
            .collect()
    }
}

/// Errors for catalog store operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
