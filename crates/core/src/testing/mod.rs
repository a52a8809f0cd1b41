//! Testing utilities and mock implementations.
//!
//! Mock implementations of the source-facing traits let the coordinator,
//! pager and action queue be tested end to end without a real media server.
//!
//! # Example
//!
//! ```rust,ignore
//! use medley_core::testing::{fixtures, MockSourceClient, MockSourceProvider};
//!
//! let client = MockSourceClient::new("srv-a");
//! client.set_on_deck(vec![fixtures::movie_record("1", "Inception")]);
//!
//! // Use behind Arc<dyn SourceClient> in a SourceHandle...
//! ```

mod mock_provider;
mod mock_source;

pub use mock_provider::MockSourceProvider;
pub use mock_source::{MockSourceClient, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::source::{MediaKind, RawMediaRecord, SourceDescriptor, SourceItemAttributes};

    /// Create a test source descriptor.
    pub fn source_descriptor(id: &str, owned: bool) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: format!("{} server", id),
            owned,
            base_url: format!("http://{}.local:32400", id),
            token: "test-token".to_string(),
        }
    }

    /// Create a test movie record with reasonable defaults.
    pub fn movie_record(item_id: &str, title: &str) -> RawMediaRecord {
        RawMediaRecord {
            item_id: item_id.to_string(),
            kind: MediaKind::Movie,
            title: title.to_string(),
            year: Some(2010),
            imdb_id: None,
            tmdb_id: None,
            rating: Some(7.5),
            audience_rating: None,
            genres: vec!["Drama".to_string()],
            view_offset_ms: None,
            duration_ms: Some(7_200_000),
            watched: false,
            view_count: 0,
            parent_id: None,
            grandparent_id: None,
            thumb_url: Some(format!("http://art.local/{}/thumb.jpg", item_id)),
            art_url: None,
            attributes: SourceItemAttributes {
                resolution: Some("1080".to_string()),
                video_codec: Some("h264".to_string()),
                audio_codec: Some("aac".to_string()),
                hdr: false,
                languages: vec!["en".to_string()],
                size_bytes: Some(4_000_000_000),
            },
            added_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    /// Create a test movie record carrying an imdb id.
    pub fn movie_record_with_imdb(item_id: &str, title: &str, imdb_id: &str) -> RawMediaRecord {
        let mut record = movie_record(item_id, title);
        record.imdb_id = Some(imdb_id.to_string());
        record
    }

    /// Create a test episode record under a show.
    pub fn episode_record(
        item_id: &str,
        title: &str,
        season_id: &str,
        show_id: &str,
    ) -> RawMediaRecord {
        let mut record = movie_record(item_id, title);
        record.kind = MediaKind::Episode;
        record.parent_id = Some(season_id.to_string());
        record.grandparent_id = Some(show_id.to_string());
        record.duration_ms = Some(2_700_000);
        record
    }
}
