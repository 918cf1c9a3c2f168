//! SQL warehouse boundary
//!
//! Every statement the assistant runs (metadata browsing, schema
//! summarization, validation, previews and history) goes through the
//! [`Warehouse`] trait, so the generation loop can be exercised against any
//! backend that can execute a SQL string.

pub mod databricks;
pub mod result;

pub use databricks::DatabricksWarehouse;
pub use result::{ColumnInfo, QueryResult};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Named statement parameter, bound to a `:name` marker in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementParam {
    pub name: String,
    /// `None` binds SQL NULL.
    pub value: Option<String>,
    /// Warehouse type of the marker, e.g. `STRING`, `INT`, `BOOLEAN`.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl StatementParam {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            type_name: "STRING".to_string(),
        }
    }

    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
            type_name: "INT".to_string(),
        }
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
            type_name: "BOOLEAN".to_string(),
        }
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Execute a statement with named parameters and return its full result.
    async fn execute(&self, sql: &str, params: &[StatementParam]) -> Result<QueryResult>;

    /// Execute a statement without parameters.
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.execute(sql, &[]).await
    }
}

/// Backtick-quote an identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Fully qualified, quoted three-part name.
pub fn qualified_name(catalog: &str, schema: &str, table: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_ident(catalog),
        quote_ident(schema),
        quote_ident(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("sales"), "`sales`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(
            qualified_name("main", "retail", "orders"),
            "`main`.`retail`.`orders`"
        );
    }
}
