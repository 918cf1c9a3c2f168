//! History table inside the SQL warehouse

use crate::error::{Result, SqlGenError};
use crate::history::{HistoryStore, QueryRecord};
use crate::warehouse::{StatementParam, Warehouse};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

lazy_static! {
    // catalog.schema.table, each part a plain identifier
    static ref TABLE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").expect("valid table name regex");
}

pub struct WarehouseHistoryStore {
    warehouse: Arc<dyn Warehouse>,
    table: String,
}

impl WarehouseHistoryStore {
    /// The table name is spliced into statements, so it must be a plain
    /// dotted identifier.
    pub fn new(warehouse: Arc<dyn Warehouse>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !TABLE_NAME.is_match(&table) {
            return Err(SqlGenError::Config(format!(
                "Invalid history table name '{}'",
                table
            )));
        }
        Ok(Self { warehouse, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (user_name STRING, timestamp TIMESTAMP, question STRING, query STRING, is_favorite BOOLEAN)",
            self.table
        );
        self.warehouse.query(&sql).await?;
        info!("History table {} is ready", self.table);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for WarehouseHistoryStore {
    async fn append(&self, user_name: &str, question: &str, query: &str, is_favorite: bool) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_name, timestamp, question, query, is_favorite) \
             VALUES (:user_name, current_timestamp(), :question, :query, :is_favorite)",
            self.table
        );
        let params = [
            StatementParam::string("user_name", user_name),
            StatementParam::string("question", question),
            StatementParam::string("query", query),
            StatementParam::boolean("is_favorite", is_favorite),
        ];
        self.warehouse
            .execute(&sql, &params)
            .await
            .map_err(|e| SqlGenError::History(format!("Failed to save query: {}", e)))?;
        Ok(())
    }

    async fn list(&self, user_name: &str, schema_filter: &str, window_days: i64) -> Result<Vec<QueryRecord>> {
        let sql = format!(
            "SELECT user_name, timestamp, question, query, is_favorite FROM {} \
             WHERE user_name = :user_name \
             AND timestamp > date_sub(current_date(), :window_days) \
             AND instr(query, :schema_filter) > 0 \
             ORDER BY timestamp DESC",
            self.table
        );
        let params = [
            StatementParam::string("user_name", user_name),
            StatementParam::int("window_days", window_days),
            StatementParam::string("schema_filter", schema_filter),
        ];
        let result = self
            .warehouse
            .execute(&sql, &params)
            .await
            .map_err(|e| SqlGenError::History(format!("Failed to load history: {}", e)))?;

        let mut records = Vec::with_capacity(result.row_count());
        for row in 0..result.row_count() {
            let raw_ts = result.value(row, "timestamp").unwrap_or_default();
            let Some(timestamp) = parse_timestamp(raw_ts) else {
                warn!("Skipping history row with unreadable timestamp '{}'", raw_ts);
                continue;
            };
            records.push(QueryRecord {
                user_name: result.value(row, "user_name").unwrap_or_default().to_string(),
                timestamp,
                question: result.value(row, "question").unwrap_or_default().to_string(),
                query: result.value(row, "query").unwrap_or_default().to_string(),
                is_favorite: result
                    .value(row, "is_favorite")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1"),
            });
        }
        Ok(records)
    }
}

/// Warehouse timestamps come back as ISO-8601 text, with or without offset.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
