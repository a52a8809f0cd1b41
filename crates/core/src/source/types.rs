//! Types for talking to media sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Show,
    Season,
    Episode,
    Clip,
    Other,
}

impl MediaKind {
    /// Stable string form used in storage and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
            MediaKind::Clip => "clip",
            MediaKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "movie" => MediaKind::Movie,
            "show" => MediaKind::Show,
            "season" => MediaKind::Season,
            "episode" => MediaKind::Episode,
            "clip" => MediaKind::Clip,
            _ => MediaKind::Other,
        }
    }
}

/// A source known to the client.
///
/// Discovery (address resolution, credential exchange) happens outside the
/// engine; by the time a descriptor exists its `base_url` is reachable in
/// principle and `token` is a valid credential for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable source id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owned by this account (vs. shared with it). Primary dedup tie-break.
    pub owned: bool,
    /// Resolved base address, e.g. "http://192.168.1.10:32400".
    pub base_url: String,
    /// Access credential for this source.
    pub token: String,
}

/// Technical attributes of one physical copy of a title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceItemAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub hdr: bool,
    /// Audio languages available on this copy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// A raw catalog record as returned by one source, before persistence and
/// deduplication. Artwork URLs are already absolute (the client resolves
/// them against its base address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMediaRecord {
    /// Item id within the source.
    pub item_id: String,
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
    /// Playback position if partially watched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_offset_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub watched: bool,
    #[serde(default)]
    pub view_count: u32,
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
    #[serde(default)]
    pub attributes: SourceItemAttributes,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named shelf of records (e.g. "Recently Added", a collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHub {
    /// Hub key within the source, e.g. "home.movies.recent".
    pub key: String,
    pub title: String,
    pub items: Vec<RawMediaRecord>,
}

/// Errors from talking to a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No resolvable address or the connection failed outright.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// Credential rejected by the source.
    #[error("not authenticated against source")]
    NotAuthenticated,

    /// Item absent on this source.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reachable source answered with a non-2xx status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Payload failed to deserialize.
    #[error("corrupt payload: {0}")]
    Corrupt(String),
}

impl SourceError {
    /// Fatal errors are surfaced immediately and never enter the retry
    /// machinery; everything else is worth retrying later.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::NotAuthenticated)
    }
}

/// Typed request surface of one media source.
///
/// Every call is a suspension point; implementations must be safe to share
/// across concurrent fan-out tasks.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Id of the source this client talks to.
    fn source_id(&self) -> &str;

    /// Items the user is in the middle of watching.
    async fn on_deck(&self) -> Result<Vec<RawMediaRecord>, SourceError>;

    /// Promoted shelves (recently added, collections, ...).
    async fn hubs(&self) -> Result<Vec<RawHub>, SourceError>;

    /// One page of a library section, in the order the source defines for
    /// the given sort parameter.
    async fn library_section(
        &self,
        section: &str,
        offset: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Vec<RawMediaRecord>, SourceError>;

    /// Full metadata for a single item.
    async fn get_item(&self, item_id: &str) -> Result<RawMediaRecord, SourceError>;

    /// All direct children of a container item (episodes of a show, ...).
    async fn children(&self, parent_id: &str) -> Result<Vec<RawMediaRecord>, SourceError>;

    /// Free-text search on this source.
    async fn search(&self, text: &str) -> Result<Vec<RawMediaRecord>, SourceError>;

    async fn mark_watched(&self, item_id: &str) -> Result<(), SourceError>;

    async fn mark_unwatched(&self, item_id: &str) -> Result<(), SourceError>;

    /// Report a playback position.
    async fn update_progress(
        &self,
        item_id: &str,
        view_offset_ms: i64,
        duration_ms: i64,
    ) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_round_trip() {
        for kind in [
            MediaKind::Movie,
            MediaKind::Show,
            MediaKind::Season,
            MediaKind::Episode,
            MediaKind::Clip,
            MediaKind::Other,
        ] {
            assert_eq!(MediaKind::from_str(kind.as_str()), kind);
        }
        assert_eq!(MediaKind::from_str("something-else"), MediaKind::Other);
    }

    #[test]
    fn test_media_kind_serialization() {
        assert_eq!(serde_json::to_string(&MediaKind::Movie).unwrap(), "\"movie\"");
        assert_eq!(
            serde_json::to_string(&MediaKind::Episode).unwrap(),
            "\"episode\""
        );
    }

    #[test]
    fn test_raw_record_serialization_skips_empty() {
        let record = RawMediaRecord {
            item_id: "5921".to_string(),
            kind: MediaKind::Movie,
            title: "Inception".to_string(),
            year: Some(2010),
            imdb_id: None,
            tmdb_id: None,
            rating: None,
            audience_rating: None,
            genres: vec![],
            view_offset_ms: None,
            duration_ms: None,
            watched: false,
            view_count: 0,
            parent_id: None,
            grandparent_id: None,
            thumb_url: None,
            art_url: None,
            attributes: SourceItemAttributes::default(),
            added_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("imdb_id"));
        assert!(!json.contains("genres"));

        let parsed: RawMediaRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.item_id, "5921");
        assert_eq!(parsed.kind, MediaKind::Movie);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(SourceError::NotAuthenticated.is_fatal());
        assert!(!SourceError::Unreachable("down".into()).is_fatal());
        assert!(!SourceError::NotFound("5921".into()).is_fatal());
    }
}
