//! Canonical (deduplicated) item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::library::SourceItem;
use crate::source::{MediaKind, SourceItemAttributes};

/// A deduplicated, display-ready media record merged across sources.
///
/// Primary fields (title, artwork, progress) come from the prioritized
/// member of the group; ratings are averaged over all members. `refs` holds
/// one entry per contributing source and is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Grouping key this item was merged under.
    pub unification_key: String,
    /// Item id on the primary source.
    pub item_id: String,
    /// Source id the primary fields were taken from.
    pub source_id: String,
    pub kind: MediaKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<String>,
    /// Critic rating, mean of non-null per-source values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Audience rating, mean of non-null per-source values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    /// Playback position from the primary source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_offset_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub watched: bool,
    /// Season id for episodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Show id for episodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_url: Option<String>,
    /// Newest added-at across the group.
    pub added_at: DateTime<Utc>,
    /// Updated-at of the primary member.
    pub updated_at: DateTime<Utc>,
    /// One entry per contributing source; the first is the primary.
    pub refs: Vec<SourceRef>,
}

/// A pointer from a canonical item back to one source's physical copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    /// Display name of the source.
    pub source_name: String,
    /// Whether the source is owned by this account (vs. shared with it).
    pub owned: bool,
    /// Item id within that source.
    pub item_id: String,
    /// Technical attributes of this physical copy.
    pub attributes: SourceItemAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRef {
    pub(crate) fn from_item(item: &SourceItem) -> Self {
        Self {
            source_id: item.source_id.clone(),
            source_name: item.source_name.clone(),
            owned: item.source_owned,
            item_id: item.item_id.clone(),
            attributes: item.attributes.clone(),
            thumb_url: item.thumb_url.clone(),
            art_url: item.art_url.clone(),
            updated_at: item.updated_at,
        }
    }
}
