//! Saved query history
//!
//! Append-only log of (user, timestamp, question, query, favourite flag).
//! Statements are always parameterized, so questions and SQL with quotes are
//! stored verbatim.

pub mod sqlite_store;
pub mod warehouse_store;

pub use sqlite_store::SqliteHistoryStore;
pub use warehouse_store::WarehouseHistoryStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub query: String,
    pub is_favorite: bool,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one record stamped with the current time.
    async fn append(&self, user_name: &str, question: &str, query: &str, is_favorite: bool) -> Result<()>;

    /// Records of `user_name` from the last `window_days` days whose query
    /// text contains `schema_filter`, newest first.
    async fn list(&self, user_name: &str, schema_filter: &str, window_days: i64) -> Result<Vec<QueryRecord>>;
}
