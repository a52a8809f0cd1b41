//! Deduplication of per-source catalog records into canonical items.
//!
//! Several sources can hold the same physical title. Records are grouped by a
//! unification key (imdb id, then tmdb id, then normalized title + year) and
//! merged into one `CanonicalItem` carrying a `SourceRef` per contributing
//! source, so a different physical copy can still be picked explicitly later.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::library::SourceItem;

mod types;

pub use types::{CanonicalItem, SourceRef};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());

/// Normalize a title for fallback grouping: lowercase, trim, strip everything
/// outside `[a-z0-9 ]`.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    NON_ALNUM.replace_all(&lowered, "").trim().to_string()
}

/// Compute the unification key for a record.
///
/// Strict priority: `imdb://<id>`, then `tmdb://<id>`, then
/// `<normalized title>_<year>`. Provider GUIDs are deliberately not used:
/// the same title scraped under different metadata agents gets different
/// GUIDs, and splitting on them is worse than the title+year fallback
/// occasionally merging two unidentified titles.
pub fn unification_key(
    imdb_id: Option<&str>,
    tmdb_id: Option<&str>,
    title: &str,
    year: Option<i32>,
) -> String {
    if let Some(imdb) = imdb_id.filter(|s| !s.is_empty()) {
        return format!("imdb://{}", imdb);
    }
    if let Some(tmdb) = tmdb_id.filter(|s| !s.is_empty()) {
        return format!("tmdb://{}", tmdb);
    }
    match year {
        Some(y) => format!("{}_{}", normalize_title(title), y),
        None => format!("{}_", normalize_title(title)),
    }
}

/// Merge per-source items into canonical items.
///
/// Items sharing a unification key collapse into one `CanonicalItem`:
/// - the primary record (title, artwork, progress) is the most recently
///   updated item from an owned source; shared sources only win when no
///   owned source contributes to the group,
/// - critic and audience ratings are the arithmetic mean of all non-null
///   member values, not just the primary's,
/// - every member becomes a `SourceRef` with its own technical attributes.
///
/// Group order preserves first appearance in the input, so equal inputs give
/// equal outputs regardless of which source answered first. No record is
/// ever dropped: a group of one still yields a canonical item, and records
/// with neither external ids nor a usable title still group under their
/// (possibly empty) fallback key.
pub fn merge(items: Vec<SourceItem>, owned_source_ids: &HashSet<String>) -> Vec<CanonicalItem> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<SourceItem>> = HashMap::new();

    for item in items {
        let key = item.unification_key.clone();
        match groups.get_mut(&key) {
            Some(group) => group.push(item),
            None => {
                order.push(key.clone());
                groups.insert(key, vec![item]);
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let group = groups.remove(&key).unwrap_or_default();
            merge_group(key, group, owned_source_ids)
        })
        .collect()
}

fn merge_group(
    key: String,
    mut group: Vec<SourceItem>,
    owned_source_ids: &HashSet<String>,
) -> CanonicalItem {
    // Owned sources outrank shared ones regardless of recency; among equally
    // owned items the most recently updated wins.
    let primary_idx = group
        .iter()
        .enumerate()
        .max_by_key(|(_, item)| {
            (
                owned_source_ids.contains(&item.source_id),
                item.updated_at,
            )
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let rating = mean(group.iter().filter_map(|i| i.rating));
    let audience_rating = mean(group.iter().filter_map(|i| i.audience_rating));
    let added_at = group.iter().map(|i| i.added_at).max();

    let primary = group.swap_remove(primary_idx);
    // One ref per distinct source; a source holding two copies under the
    // same key contributes only its first.
    let mut refs: Vec<SourceRef> = Vec::with_capacity(group.len() + 1);
    refs.push(SourceRef::from_item(&primary));
    for item in &group {
        if !refs.iter().any(|r| r.source_id == item.source_id) {
            refs.push(SourceRef::from_item(item));
        }
    }

    CanonicalItem {
        unification_key: key,
        item_id: primary.item_id.clone(),
        source_id: primary.source_id.clone(),
        kind: primary.kind,
        title: primary.title.clone(),
        year: primary.year,
        imdb_id: primary.imdb_id.clone(),
        tmdb_id: primary.tmdb_id.clone(),
        rating,
        audience_rating,
        genres: primary.genres.clone(),
        view_offset_ms: primary.view_offset_ms,
        duration_ms: primary.duration_ms,
        watched: primary.watched,
        parent_id: primary.parent_id.clone(),
        grandparent_id: primary.grandparent_id.clone(),
        thumb_url: primary.thumb_url.clone(),
        art_url: primary.art_url.clone(),
        added_at: added_at.unwrap_or(primary.added_at),
        updated_at: primary.updated_at,
        refs,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return None;
    }
    Some(collected.iter().sum::<f64>() / collected.len() as f64)
}

/// Reorder a canonical item's refs so the given source comes first.
///
/// No-op when the item has no ref for that source. Used to honor the user's
/// preferred playback source at presentation time.
pub fn prefer_source(item: &mut CanonicalItem, source_id: &str) {
    if let Some(pos) = item.refs.iter().position(|r| r.source_id == source_id) {
        if pos > 0 {
            let preferred = item.refs.remove(pos);
            item.refs.insert(0, preferred);
        }
    }
}
