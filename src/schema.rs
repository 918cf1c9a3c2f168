//! Schema summarization
//!
//! Builds the textual context handed to every generation prompt: per table
//! the DDL without its storage clause, two sample rows, and the distinct
//! values of low-cardinality string columns.

use crate::catalog::TableRef;
use crate::error::Result;
use crate::warehouse::{quote_ident, QueryResult, StatementParam, Warehouse};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A string column is treated as categorical when it has at most this many
/// distinct values.
pub const CATEGORICAL_DISTINCT_LIMIT: i64 = 20;

pub const SAMPLE_ROW_COUNT: usize = 2;

const NO_CATEGORICAL_FIELDS: &str = "No Categorical Fields";

lazy_static! {
    static ref STORAGE_CLAUSE: Regex = Regex::new(r"\bUSING\s+\w+").expect("valid storage clause regex");
}

/// Concatenated schema context for a table selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaSummary(String);

impl SchemaSummary {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SchemaSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
}

impl ColumnDefinition {
    pub fn is_string(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("string")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: TableRef,
    pub ddl: String,
    pub sample: String,
    pub categorical: Vec<CategoricalColumn>,
}

impl TableSummary {
    pub fn render(&self) -> String {
        let cat_info = if self.categorical.is_empty() {
            NO_CATEGORICAL_FIELDS.to_string()
        } else {
            self.categorical
                .iter()
                .map(|c| format!("{}: [{}]", c.column, c.values.join(", ")))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "{}\n{}\n\nCategorical Fields:\n{}\n",
            self.ddl, self.sample, cat_info
        )
    }
}

/// Drop the storage clause (`USING delta ...`) and everything after it.
pub fn strip_storage_clause(ddl: &str) -> String {
    match STORAGE_CLAUSE.find(ddl) {
        Some(m) => ddl[..m.start()].trim_end().to_string(),
        None => ddl.trim_end().to_string(),
    }
}

pub struct SchemaSummarizer {
    warehouse: Arc<dyn Warehouse>,
}

impl SchemaSummarizer {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Summarize every table of the selection. Any query error aborts the
    /// whole summary.
    pub async fn summarize(&self, catalog: &str, schema: &str, tables: &[String]) -> Result<SchemaSummary> {
        info!("📋 Summarizing {} tables in {}.{}", tables.len(), catalog, schema);
        let mut full_schema = String::new();
        for table in tables {
            let summary = self
                .summarize_table(&TableRef::new(catalog, schema, table.as_str()))
                .await?;
            full_schema.push_str(&summary.render());
        }
        Ok(SchemaSummary::new(full_schema))
    }

    pub async fn summarize_table(&self, table: &TableRef) -> Result<TableSummary> {
        let ddl = self.fetch_ddl(table).await?;
        let columns = self.describe_columns(table).await?;
        let string_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.is_string())
            .map(|c| c.name.clone())
            .collect();
        let categorical = self.categorical_columns(table, &string_columns).await?;
        let sample = self.sample_rows(table).await?.render()?;

        debug!(
            "{}: {} string columns, {} categorical",
            table,
            string_columns.len(),
            categorical.len()
        );

        Ok(TableSummary {
            table: table.clone(),
            ddl,
            sample,
            categorical,
        })
    }

    pub async fn fetch_ddl(&self, table: &TableRef) -> Result<String> {
        let result = self
            .warehouse
            .query(&format!("SHOW CREATE TABLE {}", table.qualified_name()))
            .await?;
        let statement = result
            .column_values_or_first(&["createtab_stmt"])
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(strip_storage_clause(&statement))
    }

    /// Column names and types. Stops at the first section marker (`# ...`)
    /// so partition and detail sections are not read as columns.
    pub async fn describe_columns(&self, table: &TableRef) -> Result<Vec<ColumnDefinition>> {
        let result = self
            .warehouse
            .query(&format!("DESCRIBE TABLE {}", table.qualified_name()))
            .await?;

        let mut columns = Vec::new();
        for row in 0..result.row_count() {
            let name = result.value(row, "col_name").unwrap_or("").trim();
            if name.is_empty() || name.starts_with('#') {
                break;
            }
            columns.push(ColumnDefinition {
                name: name.to_string(),
                data_type: result.value(row, "data_type").unwrap_or("").trim().to_string(),
            });
        }
        Ok(columns)
    }

    /// Distinct values of each string column with at most
    /// [`CATEGORICAL_DISTINCT_LIMIT`] distinct values, in column order.
    pub async fn categorical_columns(
        &self,
        table: &TableRef,
        string_columns: &[String],
    ) -> Result<Vec<CategoricalColumn>> {
        if string_columns.is_empty() {
            return Ok(Vec::new());
        }

        let qualified = table.qualified_name();
        let mut params = Vec::with_capacity(string_columns.len());
        let selects: Vec<String> = string_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let marker = format!("col_{}", idx);
                params.push(StatementParam::string(marker.as_str(), column.as_str()));
                let quoted = quote_ident(column);
                format!(
                    "SELECT :{} AS column_name, COUNT(DISTINCT {}) AS cnt, ARRAY_AGG(DISTINCT {}) AS distinct_values FROM {}",
                    marker, quoted, quoted, qualified
                )
            })
            .collect();

        let result = self
            .warehouse
            .execute(&selects.join(" UNION ALL "), &params)
            .await?;

        let mut by_column: HashMap<String, CategoricalColumn> = HashMap::new();
        for row in 0..result.row_count() {
            let Some(column) = result.value(row, "column_name") else {
                continue;
            };
            let count: i64 = match result.value(row, "cnt").map(|c| c.trim().parse()) {
                Some(Ok(count)) => count,
                _ => {
                    warn!("Unreadable distinct count for {}.{}", table, column);
                    continue;
                }
            };
            if count > CATEGORICAL_DISTINCT_LIMIT {
                continue;
            }
            let values = parse_array_values(result.value(row, "distinct_values"));
            by_column.insert(
                column.to_string(),
                CategoricalColumn {
                    column: column.to_string(),
                    values,
                },
            );
        }

        Ok(string_columns
            .iter()
            .filter_map(|c| by_column.remove(c))
            .collect())
    }

    pub async fn sample_rows(&self, table: &TableRef) -> Result<QueryResult> {
        self.warehouse
            .query(&format!(
                "SELECT * FROM {} LIMIT {}",
                table.qualified_name(),
                SAMPLE_ROW_COUNT
            ))
            .await
    }
}

/// Arrays arrive as JSON text, e.g. `["open","closed"]`.
fn parse_array_values(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(_) => vec![raw.to_string()],
    }
}
