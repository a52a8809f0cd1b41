//! HTTP implementation of `SourceClient`.
//!
//! Talks the JSON API exposed by a media source at its resolved base
//! address. Connection discovery is not handled here: the descriptor
//! already carries a reachable `base_url` and a credential.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{
    MediaKind, RawHub, RawMediaRecord, SourceClient, SourceDescriptor, SourceError,
    SourceItemAttributes,
};

const TOKEN_HEADER: &str = "X-Media-Token";

/// HTTP client for one media source.
pub struct HttpSourceClient {
    descriptor: SourceDescriptor,
    client: Client,
}

impl HttpSourceClient {
    /// Create a client for the given source with the default 30 s timeout.
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self::with_timeout(descriptor, Duration::from_secs(30))
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(descriptor: SourceDescriptor, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { descriptor, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.descriptor.base_url.trim_end_matches('/'), path)
    }

    async fn get_container(&self, path: &str) -> Result<ItemContainer, SourceError> {
        let url = self.url(path);
        debug!(source = %self.descriptor.id, path = path, "Fetching from source");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.descriptor.token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, path));
        }

        response
            .json::<ItemContainer>()
            .await
            .map_err(|e| SourceError::Corrupt(e.to_string()))
    }

    async fn post(&self, path: &str) -> Result<(), SourceError> {
        let url = self.url(path);
        debug!(source = %self.descriptor.id, path = path, "Posting to source");

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.descriptor.token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, path));
        }
        Ok(())
    }

    fn resolve_artwork(&self, path: Option<String>) -> Option<String> {
        path.map(|p| {
            if p.starts_with("http://") || p.starts_with("https://") {
                p
            } else {
                self.url(&p)
            }
        })
    }

    fn to_record(&self, item: WireItem) -> RawMediaRecord {
        RawMediaRecord {
            item_id: item.id,
            kind: MediaKind::from_str(&item.kind),
            title: item.title,
            year: item.year,
            imdb_id: item.imdb_id,
            tmdb_id: item.tmdb_id,
            rating: item.rating,
            audience_rating: item.audience_rating,
            genres: item.genres,
            view_offset_ms: item.view_offset_ms,
            duration_ms: item.duration_ms,
            watched: item.view_count.unwrap_or(0) > 0,
            view_count: item.view_count.unwrap_or(0),
            parent_id: item.parent_id,
            grandparent_id: item.grandparent_id,
            thumb_url: self.resolve_artwork(item.thumb),
            art_url: self.resolve_artwork(item.art),
            attributes: SourceItemAttributes {
                resolution: item.resolution,
                video_codec: item.video_codec,
                audio_codec: item.audio_codec,
                hdr: item.hdr.unwrap_or(false),
                languages: item.languages,
                size_bytes: item.size_bytes,
            },
            added_at: epoch_to_datetime(item.added_at),
            updated_at: epoch_to_datetime(item.updated_at),
        }
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    fn source_id(&self) -> &str {
        &self.descriptor.id
    }

    async fn on_deck(&self) -> Result<Vec<RawMediaRecord>, SourceError> {
        let container = self.get_container("/library/ondeck").await?;
        Ok(container.items.into_iter().map(|i| self.to_record(i)).collect())
    }

    async fn hubs(&self) -> Result<Vec<RawHub>, SourceError> {
        let url = self.url("/hubs");
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.descriptor.token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "/hubs"));
        }

        let container: HubContainer = response
            .json()
            .await
            .map_err(|e| SourceError::Corrupt(e.to_string()))?;

        Ok(container
            .hubs
            .into_iter()
            .map(|h| RawHub {
                key: h.key,
                title: h.title,
                items: h.items.into_iter().map(|i| self.to_record(i)).collect(),
            })
            .collect())
    }

    async fn library_section(
        &self,
        section: &str,
        offset: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Vec<RawMediaRecord>, SourceError> {
        let path = format!(
            "/library/sections/{}/all?offset={}&limit={}&sort={}",
            urlencoding::encode(section),
            offset,
            limit,
            urlencoding::encode(sort)
        );
        let container = self.get_container(&path).await?;
        Ok(container.items.into_iter().map(|i| self.to_record(i)).collect())
    }

    async fn get_item(&self, item_id: &str) -> Result<RawMediaRecord, SourceError> {
        let path = format!("/library/metadata/{}", urlencoding::encode(item_id));
        let container = self.get_container(&path).await?;
        container
            .items
            .into_iter()
            .next()
            .map(|i| self.to_record(i))
            .ok_or_else(|| SourceError::NotFound(item_id.to_string()))
    }

    async fn children(&self, parent_id: &str) -> Result<Vec<RawMediaRecord>, SourceError> {
        let path = format!("/library/metadata/{}/children", urlencoding::encode(parent_id));
        let container = self.get_container(&path).await?;
        Ok(container.items.into_iter().map(|i| self.to_record(i)).collect())
    }

    async fn search(&self, text: &str) -> Result<Vec<RawMediaRecord>, SourceError> {
        let path = format!("/search?query={}", urlencoding::encode(text));
        let container = self.get_container(&path).await?;
        Ok(container.items.into_iter().map(|i| self.to_record(i)).collect())
    }

    async fn mark_watched(&self, item_id: &str) -> Result<(), SourceError> {
        self.post(&format!(
            "/library/metadata/{}/watched",
            urlencoding::encode(item_id)
        ))
        .await
    }

    async fn mark_unwatched(&self, item_id: &str) -> Result<(), SourceError> {
        self.post(&format!(
            "/library/metadata/{}/unwatched",
            urlencoding::encode(item_id)
        ))
        .await
    }

    async fn update_progress(
        &self,
        item_id: &str,
        view_offset_ms: i64,
        duration_ms: i64,
    ) -> Result<(), SourceError> {
        self.post(&format!(
            "/library/metadata/{}/progress?offset={}&duration={}",
            urlencoding::encode(item_id),
            view_offset_ms,
            duration_ms
        ))
        .await
    }
}

fn map_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() || e.is_connect() {
        SourceError::Unreachable(e.to_string())
    } else if e.is_decode() {
        SourceError::Corrupt(e.to_string())
    } else {
        SourceError::Unreachable(e.to_string())
    }
}

fn map_status(status: StatusCode, path: &str) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::NotAuthenticated,
        StatusCode::NOT_FOUND => SourceError::NotFound(path.to_string()),
        _ => SourceError::Server {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
        },
    }
}

fn epoch_to_datetime(epoch_secs: Option<i64>) -> DateTime<Utc> {
    epoch_secs
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}

// Source API wire types.
#[derive(Debug, Deserialize)]
struct ItemContainer {
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct HubContainer {
    #[serde(default)]
    hubs: Vec<WireHub>,
}

#[derive(Debug, Deserialize)]
struct WireHub {
    key: String,
    title: String,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    title: String,
    year: Option<i32>,
    imdb_id: Option<String>,
    tmdb_id: Option<String>,
    rating: Option<f64>,
    audience_rating: Option<f64>,
    #[serde(default)]
    genres: Vec<String>,
    view_offset_ms: Option<i64>,
    duration_ms: Option<i64>,
    view_count: Option<u32>,
    parent_id: Option<String>,
    grandparent_id: Option<String>,
    thumb: Option<String>,
    art: Option<String>,
    resolution: Option<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    hdr: Option<bool>,
    #[serde(default)]
    languages: Vec<String>,
    size_bytes: Option<u64>,
    added_at: Option<i64>,
    updated_at: Option<i64>,
}
