//! SQLite-backed response cache implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{CacheError, ResponseCache};

/// SQLite-backed response cache.
pub struct SqliteResponseCache {
    conn: Mutex<Connection>,
}

impl SqliteResponseCache {
    /// Create a new cache, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                ttl_secs INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<(String, DateTime<Utc>, i64)>, CacheError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT payload, created_at, ttl_secs FROM response_cache WHERE key = ?",
            params![key],
            |row| {
                let payload: String = row.get(0)?;
                let created_at_str: String = row.get(1)?;
                let ttl_secs: i64 = row.get(2)?;
                Ok((payload, created_at_str, ttl_secs))
            },
        );

        match result {
            Ok((payload, created_at_str, ttl_secs)) => {
                let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(Some((payload, created_at, ttl_secs)))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Database(e.to_string())),
        }
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, secs: i64) {
        let conn = self.conn.lock().unwrap();
        let past = (Utc::now() - chrono::Duration::seconds(secs)).to_rfc3339();
        conn.execute(
            "UPDATE response_cache SET created_at = ? WHERE key = ?",
            params![past, key],
        )
        .unwrap();
    }
}

impl ResponseCache for SqliteResponseCache {
    fn get_fresh(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.read(key)? {
            Some((payload, created_at, ttl_secs)) => {
                let age = Utc::now() - created_at;
                if age.num_seconds() <= ttl_secs {
                    Ok(Some(payload))
                } else {
                    // Expired entries stay on disk for degraded-mode reads.
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn get_any(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.read(key)?.map(|(payload, _, _)| payload))
    }

    fn put(&self, key: &str, payload: &str, ttl_secs: i64) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO response_cache (key, payload, created_at, ttl_secs)
             VALUES (?, ?, ?, ?)",
            params![key, payload, Utc::now().to_rfc3339(), ttl_secs],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    fn evict(&self, key: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM response_cache WHERE key = ?", params![key])
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM response_cache", [])
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }
}
