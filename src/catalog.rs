//! Catalog browsing
//!
//! Enumerates catalog -> schema -> table from warehouse metadata. A catalog or
//! schema that cannot be listed (permissions, dropped objects) is logged and
//! skipped, so the result may be partial.

use crate::error::Result;
use crate::warehouse::{qualified_name, quote_ident, Warehouse};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Pseudo-table that selects every table of a schema.
pub const ALL_TABLES: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Quoted three-part name, safe to splice into SQL.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.catalog, &self.schema, &self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

pub async fn fetch_table_metadata(warehouse: &dyn Warehouse) -> Result<Vec<TableRef>> {
    let catalogs = warehouse
        .query("SHOW CATALOGS")
        .await?
        .column_values_or_first(&["catalog", "catalogName"]);

    let mut tables = Vec::new();
    for catalog in &catalogs {
        let schemas = match warehouse
            .query(&format!("SHOW SCHEMAS IN {}", quote_ident(catalog)))
            .await
        {
            Ok(result) => result.column_values_or_first(&["databaseName", "namespace"]),
            Err(e) => {
                warn!("❌ Failed to get schemas from {}: {}", catalog, e);
                continue;
            }
        };

        for schema in &schemas {
            let sql = format!(
                "SHOW TABLES IN {}.{}",
                quote_ident(catalog),
                quote_ident(schema)
            );
            match warehouse.query(&sql).await {
                Ok(result) => {
                    let names = result.column_values("tableName").unwrap_or_default();
                    tables.extend(names.into_iter().map(|t| TableRef::new(catalog, schema, t)));
                }
                Err(e) => warn!("❌ Failed to get tables from {}.{}: {}", catalog, schema, e),
            }
        }
    }

    info!("Found {} tables across {} catalogs", tables.len(), catalogs.len());
    Ok(tables)
}

/// Catalog -> schema -> tables view used to drive selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogTree {
    catalogs: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl CatalogTree {
    pub fn from_tables(tables: &[TableRef]) -> Self {
        let mut catalogs: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for t in tables {
            catalogs
                .entry(t.catalog.clone())
                .or_default()
                .entry(t.schema.clone())
                .or_default()
                .insert(t.table.clone());
        }
        Self { catalogs }
    }

    pub fn catalogs(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self, catalog: &str) -> Vec<&str> {
        self.catalogs
            .get(catalog)
            .map(|schemas| schemas.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn tables(&self, catalog: &str, schema: &str) -> Vec<&str> {
        self.catalogs
            .get(catalog)
            .and_then(|schemas| schemas.get(schema))
            .map(|tables| tables.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Expand a user selection. [`ALL_TABLES`] selects every table of the
    /// schema; otherwise names are kept in order without duplicates.
    pub fn resolve_selection(&self, catalog: &str, schema: &str, selected: &[String]) -> Vec<String> {
        if selected.iter().any(|s| s == ALL_TABLES) {
            return self
                .tables(catalog, schema)
                .into_iter()
                .map(str::to_string)
                .collect();
        }

        selected
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unique()
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> CatalogTree {
        CatalogTree::from_tables(&[
            TableRef::new("main", "retail", "orders"),
            TableRef::new("main", "retail", "customers"),
            TableRef::new("main", "hr", "employees"),
            TableRef::new("dev", "retail", "orders_scratch"),
        ])
    }

    #[test]
    fn test_tree_groups_by_catalog_and_schema() {
        let tree = tree();
        assert_eq!(tree.catalogs(), vec!["dev", "main"]);
        assert_eq!(tree.schemas("main"), vec!["hr", "retail"]);
        // Same schema name in another catalog stays separate
        assert_eq!(tree.tables("main", "retail"), vec!["customers", "orders"]);
        assert_eq!(tree.tables("dev", "retail"), vec!["orders_scratch"]);
        assert!(tree.tables("nope", "retail").is_empty());
    }

    #[test]
    fn test_all_expands_to_every_table() {
        let tree = tree();
        let selected = vec!["orders".to_string(), ALL_TABLES.to_string()];
        assert_eq!(
            tree.resolve_selection("main", "retail", &selected),
            vec!["customers".to_string(), "orders".to_string()]
        );
    }

    #[test]
    fn test_explicit_selection_is_deduplicated() {
        let tree = tree();
        let selected = vec!["orders".to_string(), " orders ".to_string(), "customers".to_string()];
        assert_eq!(
            tree.resolve_selection("main", "retail", &selected),
            vec!["orders".to_string(), "customers".to_string()]
        );
    }

    #[test]
    fn test_display_and_qualified_name() {
        let table = TableRef::new("main", "retail", "orders");
        assert_eq!(table.to_string(), "main.retail.orders");
        assert_eq!(table.qualified_name(), "`main`.`retail`.`orders`");
    }
}
