//! Natural-language-to-SQL assistant
//!
//! Questions about a warehouse schema become SQL through a language model;
//! each candidate is validated by executing it and repaired from the error
//! message until it runs or the attempt budget is spent.

pub mod assistant;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod generator;
pub mod history;
pub mod llm;
pub mod prompts;
pub mod repair_loop;
pub mod schema;
pub mod session;
pub mod warehouse;

pub use assistant::{Assistant, SaveOutcome};
pub use error::{Result, SqlGenError};
pub use repair_loop::{RepairOutcome, ValidationStatus, ValidationStep};
pub use schema::SchemaSummary;
