//! Tabular results returned by the warehouse

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const NULL_CELL: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Warehouse type name, e.g. `STRING`, `BIGINT`
    pub type_name: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }
}

/// Result of a statement. Values stay in the warehouse's textual form;
/// `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Convenience constructor from bare column names.
    pub fn with_columns(names: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        Self::new(names.iter().map(|n| ColumnInfo::new(*n)).collect(), rows)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Non-null values of a column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<String>> {
        let idx = self.column_index(name)?;
        Some(self.values_at(idx))
    }

    pub fn values_at(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).cloned().flatten())
            .collect()
    }

    /// First matching column among `candidates`, else the first column.
    pub fn column_values_or_first(&self, candidates: &[&str]) -> Vec<String> {
        candidates
            .iter()
            .find_map(|c| self.column_values(c))
            .unwrap_or_else(|| {
                if self.columns.is_empty() {
                    Vec::new()
                } else {
                    self.values_at(0)
                }
            })
    }

    /// Rows as `column -> value` maps.
    pub fn records(&self) -> Vec<HashMap<String, Option<String>>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut used: HashSet<String> = HashSet::new();
        let mut series = Vec::with_capacity(self.columns.len());

        for (idx, column) in self.columns.iter().enumerate() {
            // DataFrame column names must be unique
            let mut name = column.name.clone();
            let mut suffix = 0;
            while used.contains(&name) {
                suffix += 1;
                name = format!("{}_{}", column.name, suffix);
            }
            used.insert(name.clone());

            let values: Vec<Option<&str>> = self
                .rows
                .iter()
                .map(|row| row.get(idx).and_then(|v| v.as_deref()))
                .collect();
            series.push(Series::new(name.as_str(), values));
        }

        Ok(DataFrame::new(series)?)
    }

    /// Plain-text table of every column and row, values untruncated. This
    /// text goes into prompts, so nothing may be elided.
    pub fn render(&self) -> Result<String> {
        if self.columns.is_empty() {
            return Ok("(no columns)".to_string());
        }

        let df = self.to_dataframe()?;
        let mut columns: Vec<Vec<String>> = Vec::with_capacity(df.width());
        for series in df.get_columns() {
            let mut cells = vec![series.name().to_string()];
            cells.extend(
                series
                    .str()?
                    .into_iter()
                    .map(|v| v.unwrap_or(NULL_CELL).to_string()),
            );
            columns.push(cells);
        }

        let widths: Vec<usize> = columns
            .iter()
            .map(|cells| cells.iter().map(|c| c.chars().count()).max().unwrap_or(0))
            .collect();

        let lines: Vec<String> = (0..=df.height())
            .map(|line| {
                columns
                    .iter()
                    .zip(&widths)
                    .map(|(cells, width)| format!("{:<width$}", cells[line], width = *width))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            })
            .collect();

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::with_columns(
            &["id", "Status"],
            vec![
                vec![Some("1".to_string()), Some("open".to_string())],
                vec![Some("2".to_string()), None],
            ],
        )
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let result = sample();
        assert_eq!(result.column_index("status"), Some(1));
        assert_eq!(result.value(0, "STATUS"), Some("open"));
        assert_eq!(result.value(1, "status"), None);
    }

    #[test]
    fn test_column_values_skip_nulls() {
        let result = sample();
        assert_eq!(result.column_values("status"), Some(vec!["open".to_string()]));
        assert_eq!(result.column_values("missing"), None);
        assert_eq!(
            result.column_values_or_first(&["missing"]),
            vec!["1".to_string(), "2".to_string()]
        );
    }

    #[test]
    fn test_dataframe_handles_duplicate_columns() {
        let result = QueryResult::with_columns(
            &["id", "id"],
            vec![vec![Some("1".to_string()), Some("2".to_string())]],
        );
        let df = result.to_dataframe().unwrap();
        assert_eq!(df.shape(), (1, 2));
        assert!(df.column("id_1").is_ok());
    }

    #[test]
    fn test_dataframe_suffix_skips_existing_names() {
        let result = QueryResult::with_columns(
            &["id", "id", "id_1"],
            vec![vec![Some("1".to_string()), Some("2".to_string()), Some("3".to_string())]],
        );
        let df = result.to_dataframe().unwrap();
        assert_eq!(df.get_column_names(), vec!["id", "id_1", "id_1_1"]);
        assert!(result.render().unwrap().starts_with("id  id_1  id_1_1"));
    }

    #[test]
    fn test_render_keeps_wide_rows_intact() {
        let names: Vec<String> = (0..12).map(|i| format!("col_{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let long_value = "a rather long customer note that exceeds thirty chars";
        let mut row: Vec<Option<String>> = (0..12).map(|i| Some(format!("v{}", i))).collect();
        row[0] = Some(long_value.to_string());
        row[5] = None;

        let rendered = QueryResult::with_columns(&name_refs, vec![row]).render().unwrap();

        for name in &names {
            assert!(rendered.contains(name.as_str()), "missing {}", name);
        }
        assert!(rendered.contains(long_value));
        assert!(rendered.contains("v11"));
        assert!(rendered.contains("null"));
        assert!(!rendered.contains('…'));
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn test_render_contains_values() {
        let rendered = sample().render().unwrap();
        assert!(rendered.contains("open"));
        assert!(rendered.contains("Status"));
    }
}
