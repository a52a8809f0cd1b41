use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("medley.db")
}

/// Response cache TTLs, per endpoint class
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// On-deck payloads (default: 30 minutes)
    #[serde(default = "default_on_deck_ttl")]
    pub on_deck_ttl_secs: i64,
    /// Hub payloads (default: 60 minutes)
    #[serde(default = "default_hubs_ttl")]
    pub hubs_ttl_secs: i64,
    /// Per-item metadata payloads (default: 60 minutes)
    #[serde(default = "default_metadata_ttl")]
    pub metadata_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            on_deck_ttl_secs: default_on_deck_ttl(),
            hubs_ttl_secs: default_hubs_ttl(),
            metadata_ttl_secs: default_metadata_ttl(),
        }
    }
}

fn default_on_deck_ttl() -> i64 {
    1800
}

fn default_hubs_ttl() -> i64 {
    3600
}

fn default_metadata_ttl() -> i64 {
    3600
}

/// Sync and replay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Hard per-source timeout for federated search (default: 5 s)
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// Replay attempts before a pending action is dropped (default: 5)
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// Minimum gap between reconciliation pulls (default: 120 s)
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_min_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            search_timeout_secs: default_search_timeout(),
            retry_ceiling: default_retry_ceiling(),
            reconcile_min_interval_secs: default_reconcile_interval(),
        }
    }
}

fn default_search_timeout() -> u64 {
    5
}

fn default_retry_ceiling() -> u32 {
    5
}

fn default_reconcile_interval() -> u64 {
    120
}

/// Virtual library configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Remote page size for section paging (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Source whose physical copy is preferred for playback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_source: Option<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            preferred_source: None,
        }
    }
}

fn default_page_size() -> u32 {
    50
}
