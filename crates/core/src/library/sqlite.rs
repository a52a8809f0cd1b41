//! SQLite-backed catalog store and query engine implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{
    LibraryError, LibraryQuery, LibraryStore, ServerScope, SourceItem, UnifiedRow,
    WatchStateUpdate,
};
use crate::source::MediaKind;

const ITEM_COLUMNS: &str = "source_id, item_id, unification_key, section_id, kind, title, \
     sort_title, year, imdb_id, tmdb_id, rating, audience_rating, genres, view_offset_ms, \
     duration_ms, watched, view_count, parent_id, grandparent_id, thumb_url, art_url, \
     attributes, source_name, source_owned, added_at, updated_at, page_offset";

/// SQLite-backed catalog store.
pub struct SqliteLibraryStore {
    conn: Mutex<Connection>,
}

impl SqliteLibraryStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path).map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch(
            r#"
            -- One row per (source, item): the pre-deduplication mirror.
            CREATE TABLE IF NOT EXISTS library_items (
                source_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                unification_key TEXT NOT NULL,
                section_id TEXT,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                sort_title TEXT NOT NULL,
                year INTEGER,
                imdb_id TEXT,
                tmdb_id TEXT,
                rating REAL,
                audience_rating REAL,
                genres TEXT NOT NULL DEFAULT '',
                view_offset_ms INTEGER,
                duration_ms INTEGER,
                watched INTEGER NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                parent_id TEXT,
                grandparent_id TEXT,
                thumb_url TEXT,
                art_url TEXT,
                attributes TEXT NOT NULL DEFAULT '{}',
                source_name TEXT NOT NULL,
                source_owned INTEGER NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                page_offset INTEGER,
                PRIMARY KEY (source_id, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_library_items_unification
                ON library_items(unification_key);
            CREATE INDEX IF NOT EXISTS idx_library_items_sort_title
                ON library_items(sort_title);
            CREATE INDEX IF NOT EXISTS idx_library_items_section
                ON library_items(source_id, section_id, page_offset);
            "#,
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        Ok(())
    }

    /// Shared WHERE-clause builder: the paged queries, `count` and
    /// `index_of_first` all go through here so their filter logic can't
    /// drift apart. Every value is a bound parameter.
    fn build_filters(query: &LibraryQuery) -> (Vec<String>, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let ServerScope::Source(ref source_id) = query.scope {
            conditions.push("source_id = ?".to_string());
            params.push(Box::new(source_id.clone()));
        }

        if let Some(ref section) = query.section {
            conditions.push("section_id = ?".to_string());
            params.push(Box::new(section.clone()));
        }

        if let Some(kind) = query.kind {
            conditions.push("kind = ?".to_string());
            params.push(Box::new(kind.as_str().to_string()));
        }

        if !query.genre_keywords.is_empty() {
            let likes: Vec<&str> = query
                .genre_keywords
                .iter()
                .map(|_| "genres LIKE ?")
                .collect();
            conditions.push(format!("({})", likes.join(" OR ")));
            for keyword in &query.genre_keywords {
                params.push(Box::new(format!("%{}%", keyword)));
            }
        }

        if !query.excluded_source_ids.is_empty() {
            let placeholders: Vec<&str> =
                query.excluded_source_ids.iter().map(|_| "?").collect();
            conditions.push(format!("source_id NOT IN ({})", placeholders.join(", ")));
            for source_id in &query.excluded_source_ids {
                params.push(Box::new(source_id.clone()));
            }
        }

        if let Some(ref server) = query.server_filter {
            conditions.push("source_id = ?".to_string());
            params.push(Box::new(server.clone()));
        }

        if let Some(ref text) = query.search_text {
            conditions.push("title LIKE ?".to_string());
            params.push(Box::new(format!("%{}%", text)));
        }

        (conditions, params)
    }

    fn where_clause(conditions: &[String]) -> String {
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<SourceItem> {
        let kind: String = row.get(4)?;
        let genres: String = row.get(12)?;
        let attributes_json: String = row.get(21)?;
        let added_at_str: String = row.get(24)?;
        let updated_at_str: String = row.get(25)?;

        Ok(SourceItem {
            source_id: row.get(0)?,
            item_id: row.get(1)?,
            unification_key: row.get(2)?,
            section_id: row.get(3)?,
            kind: MediaKind::from_str(&kind),
            title: row.get(5)?,
            year: row.get(7)?,
            imdb_id: row.get(8)?,
            tmdb_id: row.get(9)?,
            rating: row.get(10)?,
            audience_rating: row.get(11)?,
            genres: split_joined(&genres),
            view_offset_ms: row.get(13)?,
            duration_ms: row.get(14)?,
            watched: row.get(15)?,
            view_count: row.get(16)?,
            parent_id: row.get(17)?,
            grandparent_id: row.get(18)?,
            thumb_url: row.get(19)?,
            art_url: row.get(20)?,
            attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
            source_name: row.get(22)?,
            source_owned: row.get(23)?,
            added_at: parse_timestamp(&added_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            page_offset: row.get(26)?,
        })
    }

    fn row_to_unified(row: &rusqlite::Row) -> rusqlite::Result<UnifiedRow> {
        let kind: String = row.get(2)?;
        let added_at_str: String = row.get(4)?;
        let source_ids: String = row.get(7)?;
        let item_ids: String = row.get(8)?;
        let thumb_urls: Option<String> = row.get(9)?;

        Ok(UnifiedRow {
            unification_key: row.get(0)?,
            title: row.get(1)?,
            kind: MediaKind::from_str(&kind),
            year: row.get(3)?,
            added_at: parse_timestamp(&added_at_str),
            rating: row.get(5)?,
            audience_rating: row.get(6)?,
            source_ids: split_joined(&source_ids),
            item_ids: split_joined(&item_ids),
            thumb_urls: thumb_urls.as_deref().map(split_joined).unwrap_or_default(),
        })
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn upsert(&self, items: &[SourceItem]) -> Result<u32, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut new_count = 0;

        for item in items {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM library_items WHERE source_id = ? AND item_id = ?",
                    params![&item.source_id, &item.item_id],
                    |_| Ok(true),
                )
                .unwrap_or(false);

            let attributes_json = serde_json::to_string(&item.attributes)
                .map_err(|e| LibraryError::Database(e.to_string()))?;
            let sort_title = item.title.trim().to_lowercase();
            let genres = item.genres.join("|");

            if exists {
                // page_offset / section_id survive ingests that don't carry
                // them (on-deck, hubs), so section paging order is stable.
                conn.execute(
                    "UPDATE library_items SET
                        unification_key = ?, section_id = COALESCE(?, section_id), kind = ?,
                        title = ?, sort_title = ?, year = ?, imdb_id = ?, tmdb_id = ?,
                        rating = ?, audience_rating = ?, genres = ?, view_offset_ms = ?,
                        duration_ms = ?, watched = ?, view_count = ?, parent_id = ?,
                        grandparent_id = ?, thumb_url = ?, art_url = ?, attributes = ?,
                        source_name = ?, source_owned = ?, added_at = ?, updated_at = ?,
                        page_offset = COALESCE(?, page_offset)
                     WHERE source_id = ? AND item_id = ?",
                    params![
                        &item.unification_key,
                        &item.section_id,
                        item.kind.as_str(),
                        &item.title,
                        &sort_title,
                        item.year,
                        &item.imdb_id,
                        &item.tmdb_id,
                        item.rating,
                        item.audience_rating,
                        &genres,
                        item.view_offset_ms,
                        item.duration_ms,
                        item.watched,
                        item.view_count,
                        &item.parent_id,
                        &item.grandparent_id,
                        &item.thumb_url,
                        &item.art_url,
                        &attributes_json,
                        &item.source_name,
                        item.source_owned,
                        item.added_at.to_rfc3339(),
                        item.updated_at.to_rfc3339(),
                        item.page_offset,
                        &item.source_id,
                        &item.item_id,
                    ],
                )
                .map_err(|e| LibraryError::Database(e.to_string()))?;
            } else {
                conn.execute(
                    &format!(
                        "INSERT INTO library_items ({}) VALUES \
                         (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        ITEM_COLUMNS
                    ),
                    params![
                        &item.source_id,
                        &item.item_id,
                        &item.unification_key,
                        &item.section_id,
                        item.kind.as_str(),
                        &item.title,
                        &sort_title,
                        item.year,
                        &item.imdb_id,
                        &item.tmdb_id,
                        item.rating,
                        item.audience_rating,
                        &genres,
                        item.view_offset_ms,
                        item.duration_ms,
                        item.watched,
                        item.view_count,
                        &item.parent_id,
                        &item.grandparent_id,
                        &item.thumb_url,
                        &item.art_url,
                        &attributes_json,
                        &item.source_name,
                        item.source_owned,
                        item.added_at.to_rfc3339(),
                        item.updated_at.to_rfc3339(),
                        item.page_offset,
                    ],
                )
                .map_err(|e| LibraryError::Database(e.to_string()))?;
                new_count += 1;
            }
        }

        Ok(new_count)
    }

    fn get(&self, source_id: &str, item_id: &str) -> Result<Option<SourceItem>, LibraryError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM library_items WHERE source_id = ? AND item_id = ?",
                ITEM_COLUMNS
            ),
            params![source_id, item_id],
            Self::row_to_item,
        );

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LibraryError::Database(e.to_string())),
        }
    }

    fn get_many(&self, refs: &[(String, String)]) -> Result<Vec<SourceItem>, LibraryError> {
        let mut items = Vec::with_capacity(refs.len());
        for (source_id, item_id) in refs {
            if let Some(item) = self.get(source_id, item_id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn all_for_source(&self, source_id: &str) -> Result<Vec<SourceItem>, LibraryError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM library_items WHERE source_id = ? ORDER BY item_id",
                ITEM_COLUMNS
            ))
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![source_id], Self::row_to_item)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| LibraryError::Database(e.to_string()))?);
        }
        Ok(items)
    }

    fn query(&self, query: &LibraryQuery) -> Result<Vec<SourceItem>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let (conditions, mut all_params) = Self::build_filters(query);

        // The page order is source-defined: pages were fetched under the
        // requested remote sort, so the stored offset already encodes it.
        let sql = format!(
            "SELECT {} FROM library_items {} \
             ORDER BY page_offset IS NULL, page_offset ASC, sort_title ASC \
             LIMIT ? OFFSET ?",
            ITEM_COLUMNS,
            Self::where_clause(&conditions)
        );

        all_params.push(Box::new(query.limit));
        all_params.push(Box::new(query.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_item)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| LibraryError::Database(e.to_string()))?);
        }
        Ok(items)
    }

    fn query_unified(&self, query: &LibraryQuery) -> Result<Vec<UnifiedRow>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let (conditions, mut all_params) = Self::build_filters(query);

        let direction = if query.descending { "DESC" } else { "ASC" };

        // Bare columns (title, kind, year, sort_title) come from an
        // arbitrary group member; they are display hints only. The
        // authoritative selection happens in the deduplicator.
        let sql = format!(
            "SELECT unification_key, title, kind, year, \
                    MAX(added_at) AS max_added_at, \
                    AVG(rating) AS avg_rating, \
                    AVG(audience_rating) AS avg_audience_rating, \
                    GROUP_CONCAT(source_id, '|') AS source_ids, \
                    GROUP_CONCAT(item_id, '|') AS item_ids, \
                    GROUP_CONCAT(thumb_url, '|') AS thumb_urls, \
                    sort_title \
             FROM library_items {} \
             GROUP BY unification_key \
             ORDER BY {} {}, sort_title ASC \
             LIMIT ? OFFSET ?",
            Self::where_clause(&conditions),
            query.sort.unified_column(),
            direction
        );

        all_params.push(Box::new(query.limit));
        all_params.push(Box::new(query.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_unified)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| LibraryError::Database(e.to_string()))?);
        }
        Ok(results)
    }

    fn index_of_first(&self, letter: char, query: &LibraryQuery) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let (conditions, mut all_params) = Self::build_filters(query);
        let letter_param = letter.to_lowercase().to_string();

        let sql = match query.scope {
            ServerScope::All => format!(
                "SELECT COUNT(*) FROM ( \
                     SELECT sort_title AS st FROM library_items {} \
                     GROUP BY unification_key \
                 ) WHERE st < ?",
                Self::where_clause(&conditions)
            ),
            ServerScope::Source(_) => {
                let mut with_letter = conditions;
                with_letter.push("sort_title < ?".to_string());
                format!(
                    "SELECT COUNT(*) FROM library_items {}",
                    Self::where_clause(&with_letter)
                )
            }
        };

        all_params.push(Box::new(letter_param));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn count(&self, query: &LibraryQuery) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let (conditions, all_params) = Self::build_filters(query);

        let aggregate = match query.scope {
            ServerScope::All => "COUNT(DISTINCT unification_key)",
            ServerScope::Source(_) => "COUNT(*)",
        };
        let sql = format!(
            "SELECT {} FROM library_items {}",
            aggregate,
            Self::where_clause(&conditions)
        );

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn set_watch_state(
        &self,
        source_id: &str,
        item_id: &str,
        update: WatchStateUpdate,
    ) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let rows_affected = match update {
            WatchStateUpdate::Watched => conn.execute(
                "UPDATE library_items SET watched = 1, view_count = view_count + 1, \
                 view_offset_ms = NULL, updated_at = ? WHERE source_id = ? AND item_id = ?",
                params![now, source_id, item_id],
            ),
            WatchStateUpdate::Unwatched => conn.execute(
                "UPDATE library_items SET watched = 0, view_count = 0, \
                 view_offset_ms = NULL, updated_at = ? WHERE source_id = ? AND item_id = ?",
                params![now, source_id, item_id],
            ),
            WatchStateUpdate::Progress { view_offset_ms } => conn.execute(
                "UPDATE library_items SET view_offset_ms = ?, updated_at = ? \
                 WHERE source_id = ? AND item_id = ?",
                params![view_offset_ms, now, source_id, item_id],
            ),
        }
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        if rows_affected == 0 {
            return Err(LibraryError::NotFound(format!("{}/{}", source_id, item_id)));
        }
        Ok(())
    }

    fn section_row_count(&self, source_id: &str, section: &str) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM library_items WHERE source_id = ? AND section_id = ?",
            params![source_id, section],
            |row| row.get(0),
        )
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn remove_source(&self, source_id: &str) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM library_items WHERE source_id = ?",
            params![source_id],
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM library_items", [])
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn split_joined(joined: &str) -> Vec<String> {
    joined
        .split('|')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SortField;
    use crate::merge::unification_key;
    use crate::source::SourceItemAttributes;
    use chrono::TimeZone;

    fn create_test_store() -> SqliteLibraryStore {
        SqliteLibraryStore::in_memory().unwrap()
    }

    fn test_item(source_id: &str, item_id: &str, title: &str) -> SourceItem {
        SourceItem {
            source_id: source_id.to_string(),
            item_id: item_id.to_string(),
            unification_key: unification_key(None, None, title, Some(2010)),
            section_id: None,
            kind: MediaKind::Movie,
            title: title.to_string(),
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
            source_name: source_id.to_string(),
            source_owned: false,
            added_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            page_offset: None,
        }
    }

    #[test]
    fn test_upsert_counts_new_rows() {
        let store = create_test_store();
        let new_count = store
            .upsert(&[
                test_item("srv-a", "1", "Inception"),
                test_item("srv-a", "2", "Dunkirk"),
            ])
            .unwrap();
        assert_eq!(new_count, 2);

        // Second upsert of the same keys updates, not inserts.
        let new_count = store.upsert(&[test_item("srv-a", "1", "Inception")]).unwrap();
        assert_eq!(new_count, 0);
    }

    #[test]
    fn test_upsert_preserves_page_offset_and_section() {
        let store = create_test_store();
        let mut paged = test_item("srv-a", "1", "Inception");
        paged.section_id = Some("2".to_string());
        paged.page_offset = Some(17);
        store.upsert(&[paged]).unwrap();

        // An on-deck ingest of the same item carries no paging info.
        store.upsert(&[test_item("srv-a", "1", "Inception")]).unwrap();

        let item = store.get("srv-a", "1").unwrap().unwrap();
        assert_eq!(item.page_offset, Some(17));
        assert_eq!(item.section_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_get_round_trips_fields() {
        let store = create_test_store();
        let mut item = test_item("srv-a", "1", "Inception");
        item.genres = vec!["Sci-Fi".to_string(), "Thriller".to_string()];
        item.attributes = SourceItemAttributes {
            resolution: Some("2160".to_string()),
            hdr: true,
            ..Default::default()
        };
        item.rating = Some(8.3);
        store.upsert(&[item]).unwrap();

        let fetched = store.get("srv-a", "1").unwrap().unwrap();
        assert_eq!(fetched.genres, vec!["Sci-Fi", "Thriller"]);
        assert_eq!(fetched.attributes.resolution.as_deref(), Some("2160"));
        assert!(fetched.attributes.hdr);
        assert_eq!(fetched.rating, Some(8.3));
    }

    #[test]
    fn test_get_missing_item() {
        let store = create_test_store();
        assert!(store.get("srv-a", "absent").unwrap().is_none());
    }

    #[test]
    fn test_get_many_skips_absent_pairs() {
        let store = create_test_store();
        store.upsert(&[test_item("srv-a", "1", "Inception")]).unwrap();

        let items = store
            .get_many(&[
                ("srv-a".to_string(), "1".to_string()),
                ("srv-b".to_string(), "9".to_string()),
            ])
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_id, "srv-a");
    }

    #[test]
    fn test_single_source_query_preserves_page_order() {
        let store = create_test_store();
        let mut first = test_item("srv-a", "10", "Zebra");
        first.section_id = Some("2".to_string());
        first.page_offset = Some(0);
        let mut second = test_item("srv-a", "11", "Aardvark");
        second.section_id = Some("2".to_string());
        second.page_offset = Some(1);
        store.upsert(&[second.clone(), first.clone()]).unwrap();

        let query = LibraryQuery::for_source("srv-a").with_section("2");
        let items = store.query(&query).unwrap();

        // Source-defined order, not alphabetic.
        assert_eq!(items[0].title, "Zebra");
        assert_eq!(items[1].title, "Aardvark");
    }

    #[test]
    fn test_kind_and_search_filters() {
        let store = create_test_store();
        let mut show = test_item("srv-a", "1", "Inception The Series");
        show.kind = MediaKind::Show;
        store
            .upsert(&[test_item("srv-a", "2", "Inception"), show])
            .unwrap();

        let query = LibraryQuery::for_source("srv-a")
            .with_kind(MediaKind::Movie)
            .with_search_text("incep");
        let items = store.query(&query).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, MediaKind::Movie);
    }

    #[test]
    fn test_search_text_with_quote_is_bound_safely() {
        let store = create_test_store();
        store
            .upsert(&[test_item("srv-a", "1", "The King's Speech")])
            .unwrap();

        let query = LibraryQuery::for_source("srv-a").with_search_text("King's");
        let items = store.query(&query).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_genre_keywords_are_or_composed() {
        let store = create_test_store();
        let mut a = test_item("srv-a", "1", "Inception");
        a.genres = vec!["Science Fiction".to_string()];
        let mut b = test_item("srv-a", "2", "Alien");
        b.genres = vec!["Sci-Fi".to_string()];
        let mut c = test_item("srv-a", "3", "Notting Hill");
        c.genres = vec!["Romance".to_string()];
        store.upsert(&[a, b, c]).unwrap();

        let query = LibraryQuery::for_source("srv-a")
            .with_genre_keywords(vec!["sci-fi".to_string(), "science fiction".to_string()]);
        let items = store.query(&query).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_unified_query_groups_across_sources() {
        let store = create_test_store();
        let mut a = test_item("srv-a", "1", "Inception");
        a.rating = Some(8.0);
        a.added_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        a.thumb_url = Some("http://a/thumb".to_string());
        let mut b = test_item("srv-b", "9", "Inception");
        b.rating = Some(6.0);
        b.added_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store
            .upsert(&[a, b, test_item("srv-a", "2", "Dunkirk")])
            .unwrap();

        let rows = store.query_unified(&LibraryQuery::unified()).unwrap();
        assert_eq!(rows.len(), 2);

        let inception = rows
            .iter()
            .find(|r| r.unification_key == "inception_2010")
            .unwrap();
        assert_eq!(inception.source_ids.len(), 2);
        assert_eq!(inception.item_ids.len(), 2);
        // added_at is the group max, ratings the mean of non-null values.
        assert_eq!(
            inception.added_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(inception.rating, Some(7.0));
        // Null thumbs are filtered from the pipe-joined list.
        assert_eq!(inception.thumb_urls, vec!["http://a/thumb"]);
    }

    #[test]
    fn test_unified_rating_mean_ignores_nulls() {
        let store = create_test_store();
        let mut a = test_item("srv-a", "1", "Inception");
        a.rating = Some(8.0);
        let b = test_item("srv-b", "9", "Inception"); // no rating
        store.upsert(&[a, b]).unwrap();

        let rows = store.query_unified(&LibraryQuery::unified()).unwrap();
        assert_eq!(rows[0].rating, Some(8.0));
    }

    #[test]
    fn test_unified_excluded_sources() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Inception"),
                test_item("srv-b", "9", "Tenet"),
            ])
            .unwrap();

        let query =
            LibraryQuery::unified().with_excluded_sources(vec!["srv-b".to_string()]);
        let rows = store.query_unified(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_ids, vec!["srv-a"]);
    }

    #[test]
    fn test_unified_server_filter() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Inception"),
                test_item("srv-b", "9", "Inception"),
                test_item("srv-b", "10", "Tenet"),
            ])
            .unwrap();

        let query = LibraryQuery::unified().with_server_filter("srv-b");
        let rows = store.query_unified(&query).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.source_ids, vec!["srv-b"]);
        }
    }

    #[test]
    fn test_unified_sort_by_title_ascending() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Zebra"),
                test_item("srv-a", "2", "Aardvark"),
                test_item("srv-a", "3", "Mango"),
            ])
            .unwrap();

        let query = LibraryQuery::unified().with_sort(SortField::Title, false);
        let rows = store.query_unified(&query).unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Aardvark", "Mango", "Zebra"]);
    }

    #[test]
    fn test_unified_default_sort_is_added_at_descending() {
        let store = create_test_store();
        let mut old = test_item("srv-a", "1", "Old");
        old.added_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut new = test_item("srv-a", "2", "New");
        new.added_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.upsert(&[old, new]).unwrap();

        let rows = store.query_unified(&LibraryQuery::unified()).unwrap();
        assert_eq!(rows[0].title, "New");
    }

    #[test]
    fn test_index_of_first_counts_unified_groups() {
        let store = create_test_store();
        // "Inception" exists on two sources: one group, not two rows.
        store
            .upsert(&[
                test_item("srv-a", "1", "Alien"),
                test_item("srv-a", "2", "Inception"),
                test_item("srv-b", "9", "Inception"),
                test_item("srv-a", "3", "Zodiac"),
            ])
            .unwrap();

        let query = LibraryQuery::unified().with_sort(SortField::Title, false);
        // Groups before 'z': alien, inception.
        assert_eq!(store.index_of_first('z', &query).unwrap(), 2);
        assert_eq!(store.index_of_first('b', &query).unwrap(), 1);
        assert_eq!(store.index_of_first('a', &query).unwrap(), 0);
    }

    #[test]
    fn test_index_of_first_single_source_counts_rows() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Alien"),
                test_item("srv-a", "2", "Inception"),
                test_item("srv-b", "9", "Inception"),
            ])
            .unwrap();

        let query = LibraryQuery::for_source("srv-a");
        assert_eq!(store.index_of_first('z', &query).unwrap(), 2);
    }

    #[test]
    fn test_index_of_first_respects_filters() {
        let store = create_test_store();
        let mut show = test_item("srv-a", "1", "Andor");
        show.kind = MediaKind::Show;
        store
            .upsert(&[show, test_item("srv-a", "2", "Alien")])
            .unwrap();

        let query = LibraryQuery::unified().with_kind(MediaKind::Movie);
        assert_eq!(store.index_of_first('z', &query).unwrap(), 1);
    }

    #[test]
    fn test_count_unified_counts_groups() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Inception"),
                test_item("srv-b", "9", "Inception"),
                test_item("srv-a", "2", "Dunkirk"),
            ])
            .unwrap();

        assert_eq!(store.count(&LibraryQuery::unified()).unwrap(), 2);
        assert_eq!(store.count(&LibraryQuery::for_source("srv-a")).unwrap(), 2);
    }

    #[test]
    fn test_set_watch_state() {
        let store = create_test_store();
        store.upsert(&[test_item("srv-a", "1", "Inception")]).unwrap();

        store
            .set_watch_state("srv-a", "1", WatchStateUpdate::Progress { view_offset_ms: 5000 })
            .unwrap();
        let item = store.get("srv-a", "1").unwrap().unwrap();
        assert_eq!(item.view_offset_ms, Some(5000));
        assert!(!item.watched);

        store
            .set_watch_state("srv-a", "1", WatchStateUpdate::Watched)
            .unwrap();
        let item = store.get("srv-a", "1").unwrap().unwrap();
        assert!(item.watched);
        assert_eq!(item.view_count, 1);
        assert!(item.view_offset_ms.is_none());

        store
            .set_watch_state("srv-a", "1", WatchStateUpdate::Unwatched)
            .unwrap();
        let item = store.get("srv-a", "1").unwrap().unwrap();
        assert!(!item.watched);
        assert_eq!(item.view_count, 0);
    }

    #[test]
    fn test_set_watch_state_unknown_item() {
        let store = create_test_store();
        let result = store.set_watch_state("srv-a", "absent", WatchStateUpdate::Watched);
        assert!(matches!(result, Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_section_row_count() {
        let store = create_test_store();
        let mut paged = test_item("srv-a", "1", "Inception");
        paged.section_id = Some("2".to_string());
        paged.page_offset = Some(0);
        store
            .upsert(&[paged, test_item("srv-a", "2", "Loose Item")])
            .unwrap();

        assert_eq!(store.section_row_count("srv-a", "2").unwrap(), 1);
        assert_eq!(store.section_row_count("srv-a", "99").unwrap(), 0);
    }

    #[test]
    fn test_remove_source_and_clear() {
        let store = create_test_store();
        store
            .upsert(&[
                test_item("srv-a", "1", "Inception"),
                test_item("srv-b", "9", "Tenet"),
            ])
            .unwrap();

        store.remove_source("srv-a").unwrap();
        assert!(store.get("srv-a", "1").unwrap().is_none());
        assert!(store.get("srv-b", "9").unwrap().is_some());

        store.clear().unwrap();
        assert!(store.get("srv-b", "9").unwrap().is_none());
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("library.db");

        let store = SqliteLibraryStore::new(&db_path).unwrap();
        store.upsert(&[test_item("srv-a", "1", "Inception")]).unwrap();

        assert!(db_path.exists());
        assert!(store.get("srv-a", "1").unwrap().is_some());
    }
}
