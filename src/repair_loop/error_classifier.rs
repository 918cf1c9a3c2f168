//! Error Classifier
//!
//! Sorts execution failures into a small taxonomy so the repair loop can
//! tell a warehouse hiccup from a query the model has to fix.

use crate::error::SqlGenError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlErrorClass {
    TableNotFound,
    ColumnNotFound,
    Syntax,
    AmbiguousColumn,
    InvalidAggregation,
    PermissionDenied,
    /// Network, throttling or warehouse availability; the SQL may be fine.
    Transient,
    Other(String),
}

impl SqlErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, SqlErrorClass::Transient)
    }

    /// Whether rewriting the SQL can plausibly fix the failure.
    pub fn is_repairable(&self) -> bool {
        !matches!(self, SqlErrorClass::PermissionDenied | SqlErrorClass::Transient)
    }
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorClass::TableNotFound => write!(f, "TableNotFound"),
            SqlErrorClass::ColumnNotFound => write!(f, "ColumnNotFound"),
            SqlErrorClass::Syntax => write!(f, "Syntax"),
            SqlErrorClass::AmbiguousColumn => write!(f, "AmbiguousColumn"),
            SqlErrorClass::InvalidAggregation => write!(f, "InvalidAggregation"),
            SqlErrorClass::PermissionDenied => write!(f, "PermissionDenied"),
            SqlErrorClass::Transient => write!(f, "Transient"),
            SqlErrorClass::Other(msg) => write!(f, "Other({})", msg),
        }
    }
}

#[derive(Debug)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &SqlGenError) -> SqlErrorClass {
        match error {
            SqlGenError::Transport(_) => return SqlErrorClass::Transient,
            SqlGenError::Auth(_) => return SqlErrorClass::PermissionDenied,
            _ => {}
        }

        let error_msg = error.to_string().to_lowercase();

        if error_msg.contains("unresolved_column") {
            return SqlErrorClass::ColumnNotFound;
        }

        if error_msg.contains("table_or_view_not_found") {
            return SqlErrorClass::TableNotFound;
        }

        // Column before table: column messages usually name the table too
        if error_msg.contains("column") && (error_msg.contains("cannot be resolved") || error_msg.contains("not found")) {
            return SqlErrorClass::ColumnNotFound;
        }

        if error_msg.contains("table") && (error_msg.contains("not found") || error_msg.contains("cannot be found")) {
            return SqlErrorClass::TableNotFound;
        }

        if error_msg.contains("ambiguous_reference") || (error_msg.contains("ambiguous") && error_msg.contains("column")) {
            return SqlErrorClass::AmbiguousColumn;
        }

        if error_msg.contains("parse_syntax_error") || error_msg.contains("syntax error") {
            return SqlErrorClass::Syntax;
        }

        if error_msg.contains("missing_aggregation")
            || error_msg.contains("missing_group_by")
            || error_msg.contains("aggregate function")
        {
            return SqlErrorClass::InvalidAggregation;
        }

        if error_msg.contains("insufficient_permissions")
            || error_msg.contains("permission_denied")
            || error_msg.contains("insufficient privileges")
        {
            return SqlErrorClass::PermissionDenied;
        }

        if error_msg.contains("temporarily unavailable")
            || error_msg.contains("timed out")
            || error_msg.contains("too many requests")
        {
            return SqlErrorClass::Transient;
        }

        SqlErrorClass::Other(error.to_string())
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(error: SqlGenError) -> SqlErrorClass {
        ErrorClassifier::new().classify(&error)
    }

    #[test]
    fn test_classify_table_not_found() {
        let error = SqlGenError::Warehouse(
            "[TABLE_OR_VIEW_NOT_FOUND] The table or view `main`.`retail`.`order` cannot be found.".to_string(),
        );
        assert_eq!(classify(error), SqlErrorClass::TableNotFound);
    }

    #[test]
    fn test_classify_column_not_found() {
        let error = SqlGenError::Warehouse(
            "[UNRESOLVED_COLUMN.WITH_SUGGESTION] A column with name `amt` cannot be resolved.".to_string(),
        );
        assert_eq!(classify(error), SqlErrorClass::ColumnNotFound);
    }

    #[test]
    fn test_column_errors_naming_a_table() {
        let error = SqlGenError::Warehouse("column `amt` not found in table `orders`".to_string());
        assert_eq!(classify(error), SqlErrorClass::ColumnNotFound);
    }

    #[test]
    fn test_classify_syntax() {
        let error = SqlGenError::Warehouse("[PARSE_SYNTAX_ERROR] Syntax error at or near 'FORM'".to_string());
        assert_eq!(classify(error), SqlErrorClass::Syntax);
    }

    #[test]
    fn test_transport_errors_are_transient() {
        let class = classify(SqlGenError::Transport("HTTP 503: busy".to_string()));
        assert!(class.is_transient());
        assert!(!class.is_repairable());
    }

    #[test]
    fn test_permission_denied_is_not_repairable() {
        let class = classify(SqlGenError::Warehouse(
            "[INSUFFICIENT_PERMISSIONS] User does not have SELECT on table".to_string(),
        ));
        assert_eq!(class, SqlErrorClass::PermissionDenied);
        assert!(!class.is_repairable());
    }

    #[test]
    fn test_auth_errors_are_not_repairable() {
        let class = classify(SqlGenError::Auth("HTTP 401: Invalid access token".to_string()));
        assert_eq!(class, SqlErrorClass::PermissionDenied);
        assert!(!class.is_repairable());
    }

    #[test]
    fn test_unknown_errors_fall_through() {
        let class = classify(SqlGenError::Warehouse("division by zero".to_string()));
        assert!(matches!(class, SqlErrorClass::Other(_)));
        assert!(class.is_repairable());
    }
}
