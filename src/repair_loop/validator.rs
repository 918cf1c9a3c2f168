//! Validation and repair
//!
//! A candidate query is valid when the warehouse executes it. A failing
//! candidate is sent back to the model together with the error text; the
//! repaired candidate is validated again. [`RepairLoop`] bounds the number of
//! validations and ends in [`ValidationStatus::Failed`] when it runs out.

use crate::config::RepairConfig;
use crate::error::{Result, SqlGenError};
use crate::generator::SqlGenerator;
use crate::repair_loop::error_classifier::{ErrorClassifier, SqlErrorClass};
use crate::schema::SchemaSummary;
use crate::warehouse::Warehouse;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Correct,
    Incorrect,
    Failed,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Correct => write!(f, "Correct"),
            ValidationStatus::Incorrect => write!(f, "Incorrect"),
            ValidationStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of one validate-then-maybe-repair transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub status: ValidationStatus,
    /// `Correct`: the validated SQL. `Incorrect`: the next candidate.
    /// `Failed`: the SQL that could not be fixed.
    pub sql: String,
    pub error: Option<String>,
    pub error_class: Option<SqlErrorClass>,
}

/// Final result of a repair loop run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    /// `Correct` or `Failed`.
    pub status: ValidationStatus,
    pub sql: String,
    /// Number of executions made against the warehouse.
    pub attempts: u8,
    pub last_error: Option<String>,
    /// Every candidate that was executed, in order.
    pub candidates: Vec<String>,
}

impl RepairOutcome {
    pub fn is_correct(&self) -> bool {
        self.status == ValidationStatus::Correct
    }
}

#[derive(Clone)]
pub struct SqlValidator {
    warehouse: Arc<dyn Warehouse>,
    generator: SqlGenerator,
}

impl SqlValidator {
    pub fn new(warehouse: Arc<dyn Warehouse>, generator: SqlGenerator) -> Self {
        Self { warehouse, generator }
    }

    /// Execute the query; `Err` carries the execution failure.
    pub async fn check_sql_validity(&self, sql: &str) -> std::result::Result<(), SqlGenError> {
        self.warehouse.query(sql).await.map(|_| ())
    }

    /// One transition: `Correct` with the unchanged SQL when it executes,
    /// otherwise `Incorrect` with the model's repair of it. Transient
    /// failures come back `Incorrect` with the same SQL for re-validation;
    /// failures no rewrite can fix come back `Failed`.
    pub async fn validate_and_fix_sql(
        &self,
        question: &str,
        sql: &str,
        schema: &SchemaSummary,
    ) -> Result<ValidationStep> {
        let error = match self.check_sql_validity(sql).await {
            Ok(()) => {
                return Ok(ValidationStep {
                    status: ValidationStatus::Correct,
                    sql: sql.to_string(),
                    error: None,
                    error_class: None,
                })
            }
            Err(e) => e,
        };

        let error_class = ErrorClassifier::new().classify(&error);
        let error_msg = error.to_string();
        warn!("SQL failed ({}): {}", error_class, error_msg);

        if error_class.is_transient() {
            return Ok(ValidationStep {
                status: ValidationStatus::Incorrect,
                sql: sql.to_string(),
                error: Some(error_msg),
                error_class: Some(error_class),
            });
        }

        if !error_class.is_repairable() {
            return Ok(ValidationStep {
                status: ValidationStatus::Failed,
                sql: sql.to_string(),
                error: Some(error_msg),
                error_class: Some(error_class),
            });
        }

        let repaired = self
            .generator
            .repair_sql(question, sql, schema, &error_msg)
            .await?;

        Ok(ValidationStep {
            status: ValidationStatus::Incorrect,
            sql: repaired,
            error: Some(error_msg),
            error_class: Some(error_class),
        })
    }
}

/// Bounded self-correction loop
pub struct RepairLoop {
    validator: SqlValidator,
    max_attempts: u8,
    abort_on_repeat: bool,
}

impl RepairLoop {
    pub fn new(validator: SqlValidator, max_attempts: u8, abort_on_repeat: bool) -> Self {
        Self {
            validator,
            max_attempts: max_attempts.max(1),
            abort_on_repeat,
        }
    }

    pub fn from_config(validator: SqlValidator, config: RepairConfig) -> Self {
        Self::new(validator, config.max_attempts, config.abort_on_repeat)
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    /// Validate and repair until the SQL executes or `max_attempts`
    /// executions have failed. Model failures propagate.
    pub async fn run(&self, question: &str, sql: &str, schema: &SchemaSummary) -> Result<RepairOutcome> {
        let mut current = sql.to_string();
        let mut candidates = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            info!("Validation attempt {} of {}", attempt, self.max_attempts);
            candidates.push(current.clone());

            // No repair after the last execution, it would never be validated
            if attempt == self.max_attempts {
                match self.validator.check_sql_validity(&current).await {
                    Ok(()) => {
                        info!("✅ SQL validated on attempt {}", attempt);
                        return Ok(RepairOutcome {
                            status: ValidationStatus::Correct,
                            sql: current,
                            attempts: attempt,
                            last_error: None,
                            candidates,
                        });
                    }
                    Err(e) => {
                        last_error = Some(e.to_string());
                        break;
                    }
                }
            }

            let step = self
                .validator
                .validate_and_fix_sql(question, &current, schema)
                .await?;

            match step.status {
                ValidationStatus::Correct => {
                    info!("✅ SQL validated on attempt {}", attempt);
                    return Ok(RepairOutcome {
                        status: ValidationStatus::Correct,
                        sql: step.sql,
                        attempts: attempt,
                        last_error: None,
                        candidates,
                    });
                }
                ValidationStatus::Failed => {
                    return Ok(RepairOutcome {
                        status: ValidationStatus::Failed,
                        sql: step.sql,
                        attempts: attempt,
                        last_error: step.error,
                        candidates,
                    });
                }
                ValidationStatus::Incorrect => {
                    last_error = step.error;
                    let transient = step.error_class.as_ref().is_some_and(SqlErrorClass::is_transient);
                    if !transient {
                        failed.insert(current.trim().to_string());
                    }

                    if self.abort_on_repeat && !transient && failed.contains(step.sql.trim()) {
                        warn!("Repair repeated a failed query, aborting");
                        return Ok(RepairOutcome {
                            status: ValidationStatus::Failed,
                            sql: current,
                            attempts: attempt,
                            last_error,
                            candidates,
                        });
                    }
                    current = step.sql;
                }
            }
        }

        warn!("SQL still failing after {} attempts", self.max_attempts);
        Ok(RepairOutcome {
            status: ValidationStatus::Failed,
            sql: current,
            attempts: self.max_attempts,
            last_error,
            candidates,
        })
    }
}
