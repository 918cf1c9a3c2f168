//! Local SQLite history store

use crate::error::{Result, SqlGenError};
use crate::history::{HistoryStore, QueryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub struct SqliteHistoryStore {
    db: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;
        info!("Opened query history at {}", path.display());
        Self::with_connection(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        let store = Self { db: Mutex::new(db) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sqlgen_user_query_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                question TEXT NOT NULL,
                query TEXT NOT NULL,
                is_favorite INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_user_time ON sqlgen_user_query_history(user_name, timestamp)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| SqlGenError::History("History database lock poisoned".to_string()))
    }

    /// Insert a record with its own timestamp.
    pub fn insert_record(&self, record: &QueryRecord) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO sqlgen_user_query_history (user_name, timestamp, question, query, is_favorite) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_name,
                format_timestamp(record.timestamp),
                record.question,
                record.query,
                record.is_favorite,
            ],
        )?;
        Ok(())
    }

    fn list_since(&self, user_name: &str, schema_filter: &str, since: DateTime<Utc>) -> Result<Vec<QueryRecord>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            r#"
            SELECT user_name, timestamp, question, query, is_favorite
            FROM sqlgen_user_query_history
            WHERE user_name = ?1 AND timestamp > ?2 AND instr(query, ?3) > 0
            ORDER BY timestamp DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map(
            params![user_name, format_timestamp(since), schema_filter],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (user_name, timestamp, question, query, is_favorite) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| SqlGenError::History(format!("Bad timestamp '{}': {}", timestamp, e)))?
                .with_timezone(&Utc);
            records.push(QueryRecord {
                user_name,
                timestamp,
                question,
                query,
                is_favorite,
            });
        }
        Ok(records)
    }
}

/// Fixed-width UTC so text comparison orders chronologically.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, user_name: &str, question: &str, query: &str, is_favorite: bool) -> Result<()> {
        self.insert_record(&QueryRecord {
            user_name: user_name.to_string(),
            timestamp: Utc::now(),
            question: question.to_string(),
            query: query.to_string(),
            is_favorite,
        })
    }

    async fn list(&self, user_name: &str, schema_filter: &str, window_days: i64) -> Result<Vec<QueryRecord>> {
        let since = Duration::try_days(window_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| SqlGenError::Config(format!("History window of {} days is out of range", window_days)))?;
        self.list_since(user_name, schema_filter, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_list() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store
            .append("ana", "Revenue by month?", "SELECT * FROM main.sales.orders", true)
            .await
            .unwrap();

        let records = store.list("ana", "sales", 20).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Revenue by month?");
        assert!(records[0].is_favorite);
    }

    #[tokio::test]
    async fn test_out_of_range_window_is_rejected() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let err = store.list("ana", "sales", i64::MAX).await.unwrap_err();
        assert!(matches!(err, SqlGenError::Config(_)));
    }

    #[test]
    fn test_timestamp_format_is_sortable() {
        let early = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let late = early + Duration::milliseconds(1);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2026-01-02T03:04:05.000000Z");
    }
}
