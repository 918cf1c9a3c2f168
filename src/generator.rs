//! Prompt-driven generation
//!
//! Turns questions plus schema context into SQL, follow-up SQL over a
//! validated query, repaired SQL, analysis ideas and ERD code. Nothing here
//! checks validity; that is the repair loop's job.

use crate::error::{Result, SqlGenError};
use crate::extract::extract_code_block_or_raw;
use crate::llm::{run_structured, LanguageModel, ResponseField, StructuredOutputParser};
use crate::prompts;
use crate::schema::SchemaSummary;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const BUSINESS_QUESTIONS_FIELD: &str = "business_questions";

#[derive(Clone)]
pub struct SqlGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn generate_initial_sql(&self, question: &str, schema: &SchemaSummary) -> Result<String> {
        info!("🤖 Generating SQL for: {}", question);
        let prompt = prompts::initial_sql_prompt(question, schema.as_str());
        let response = self.llm.complete(&prompt).await?;
        Ok(extract_code_block_or_raw(&response, "sql"))
    }

    /// Build a follow-up query on top of an already validated one, exposed
    /// to the model as CTE `MASTER`.
    pub async fn enhance_sql_with_cte(
        &self,
        question: &str,
        schema: &SchemaSummary,
        base_sql: &str,
    ) -> Result<String> {
        info!("🤖 Generating follow-up SQL for: {}", question);
        let prompt = prompts::cte_follow_up_prompt(question, schema.as_str(), base_sql);
        let response = self.llm.complete(&prompt).await?;
        Ok(extract_code_block_or_raw(&response, "sql"))
    }

    pub async fn repair_sql(
        &self,
        question: &str,
        sql: &str,
        schema: &SchemaSummary,
        error_msg: &str,
    ) -> Result<String> {
        let prompt = prompts::repair_prompt(question, sql, schema.as_str(), error_msg);
        let response = self.llm.complete(&prompt).await?;
        Ok(extract_code_block_or_raw(&response, "sql"))
    }

    pub async fn generate_analysis_questions(&self, schema: &SchemaSummary) -> Result<Vec<String>> {
        let parser = StructuredOutputParser::new(vec![ResponseField::new(
            BUSINESS_QUESTIONS_FIELD,
            "List of relevant business analysis questions based on the schema",
            "list[string]",
        )]);

        let parsed = run_structured(self.llm.as_ref(), &parser, |instructions| {
            prompts::analysis_questions_prompt(schema.as_str(), instructions)
        })
        .await?;

        let questions = match &parsed[BUSINESS_QUESTIONS_FIELD] {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|q| q.as_str())
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
            serde_json::Value::String(text) => text
                .lines()
                .map(|line| line.trim().trim_start_matches(['-', '*']).trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
            other => {
                return Err(SqlGenError::Llm(format!(
                    "'{}' must be a list of strings, got {}",
                    BUSINESS_QUESTIONS_FIELD, other
                )))
            }
        };

        Ok(questions)
    }

    /// Mermaid ERD for `table -> ["column : type", ...]`.
    pub async fn generate_erd_mermaid(&self, table_columns: &BTreeMap<String, Vec<String>>) -> Result<String> {
        let table_schema = serde_json::to_string_pretty(table_columns)?;
        let response = self.llm.complete(&prompts::erd_prompt(&table_schema)).await?;
        Ok(extract_code_block_or_raw(&response, "mermaid"))
    }
}
