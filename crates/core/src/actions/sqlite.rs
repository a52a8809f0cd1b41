//! SQLite-backed pending-action store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{
    compute_should_mark_watched, ActionError, ActionKind, EnqueueAction, PendingAction,
    PendingActionStore,
};

const ACTION_COLUMNS: &str = "id, source_id, item_id, global_key, kind, view_offset_ms, \
     duration_ms, should_mark_watched, created_at, updated_at, attempt_count, last_error";

/// SQLite-backed pending-action store.
pub struct SqliteActionStore {
    conn: Mutex<Connection>,
}

impl SqliteActionStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, ActionError> {
        let conn = Connection::open(path).map_err(|e| ActionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ActionError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ActionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ActionError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_actions (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                global_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                view_offset_ms INTEGER,
                duration_ms INTEGER,
                should_mark_watched INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pending_actions_global_key
                ON pending_actions(global_key);
            CREATE INDEX IF NOT EXISTS idx_pending_actions_source
                ON pending_actions(source_id);
            "#,
        )
        .map_err(|e| ActionError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_action(row: &rusqlite::Row) -> rusqlite::Result<PendingAction> {
        let kind: String = row.get(4)?;
        let created_at_str: String = row.get(8)?;
        let updated_at_str: String = row.get(9)?;

        Ok(PendingAction {
            id: row.get(0)?,
            source_id: row.get(1)?,
            item_id: row.get(2)?,
            global_key: row.get(3)?,
            kind: ActionKind::from_str(&kind).unwrap_or(ActionKind::Progress),
            view_offset_ms: row.get(5)?,
            duration_ms: row.get(6)?,
            should_mark_watched: row.get(7)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            attempt_count: row.get(10)?,
            last_error: row.get(11)?,
        })
    }
}

impl PendingActionStore for SqliteActionStore {
    fn enqueue(&self, request: EnqueueAction) -> Result<PendingAction, ActionError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let global_key = PendingAction::global_key_for(&request.source_id, &request.item_id);

        let should_mark_watched = match request.kind {
            ActionKind::Progress => match (request.view_offset_ms, request.duration_ms) {
                (Some(offset), Some(duration)) => {
                    Some(compute_should_mark_watched(offset, duration))
                }
                _ => Some(false),
            },
            _ => None,
        };

        conn.execute(
            &format!(
                "INSERT INTO pending_actions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)",
                ACTION_COLUMNS
            ),
            params![
                id,
                request.source_id,
                request.item_id,
                global_key,
                request.kind.as_str(),
                request.view_offset_ms,
                request.duration_ms,
                should_mark_watched,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| ActionError::Database(e.to_string()))?;

        Ok(PendingAction {
            id,
            source_id: request.source_id,
            item_id: request.item_id,
            global_key,
            kind: request.kind,
            view_offset_ms: request.view_offset_ms,
            duration_ms: request.duration_ms,
            should_mark_watched,
            created_at: now,
            updated_at: now,
            attempt_count: 0,
            last_error: None,
        })
    }

    fn list_pending(&self) -> Result<Vec<PendingAction>, ActionError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM pending_actions ORDER BY created_at ASC, rowid ASC",
                ACTION_COLUMNS
            ))
            .map_err(|e| ActionError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_action)
            .map_err(|e| ActionError::Database(e.to_string()))?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.map_err(|e| ActionError::Database(e.to_string()))?);
        }
        Ok(actions)
    }

    fn latest_for_key(&self, global_key: &str) -> Result<Option<PendingAction>, ActionError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM pending_actions WHERE global_key = ? \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                ACTION_COLUMNS
            ),
            params![global_key],
            Self::row_to_action,
        );

        match result {
            Ok(action) => Ok(Some(action)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ActionError::Database(e.to_string())),
        }
    }

    fn record_failure(&self, id: &str, error: &str) -> Result<PendingAction, ActionError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE pending_actions SET attempt_count = attempt_count + 1, \
                 last_error = ?, updated_at = ? WHERE id = ?",
                params![error, now.to_rfc3339(), id],
            )
            .map_err(|e| ActionError::Database(e.to_string()))?;

        if rows_affected == 0 {
            return Err(ActionError::NotFound(id.to_string()));
        }

        conn.query_row(
            &format!("SELECT {} FROM pending_actions WHERE id = ?", ACTION_COLUMNS),
            params![id],
            Self::row_to_action,
        )
        .map_err(|e| ActionError::Database(e.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), ActionError> {
        let conn = self.conn.lock().unwrap();

        let rows_affected = conn
            .execute("DELETE FROM pending_actions WHERE id = ?", params![id])
            .map_err(|e| ActionError::Database(e.to_string()))?;

        if rows_affected == 0 {
            return Err(ActionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_for_source(&self, source_id: &str) -> Result<u32, ActionError> {
        let conn = self.conn.lock().unwrap();

        let rows_affected = conn
            .execute(
                "DELETE FROM pending_actions WHERE source_id = ?",
                params![source_id],
            )
            .map_err(|e| ActionError::Database(e.to_string()))?;

        Ok(rows_affected as u32)
    }

    fn count(&self) -> Result<i64, ActionError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))
            .map_err(|e| ActionError::Database(e.to_string()))
    }

    fn clear(&self) -> Result<(), ActionError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pending_actions", [])
            .map_err(|e| ActionError::Database(e.to_string()))?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
