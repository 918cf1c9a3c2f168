#![allow(dead_code)]

use async_trait::async_trait;
use sqlgen::error::{Result, SqlGenError};
use sqlgen::llm::LanguageModel;
use sqlgen::warehouse::{QueryResult, StatementParam, Warehouse};
use std::collections::VecDeque;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&str, &[StatementParam]) -> Result<QueryResult> + Send + Sync>;

/// Warehouse double answering from a closure and recording every statement.
pub struct ScriptedWarehouse {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<StatementParam>)>>,
}

impl ScriptedWarehouse {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[StatementParam]) -> Result<QueryResult> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every statement succeeds with an empty result.
    pub fn accepting() -> Self {
        Self::new(|_, _| Ok(QueryResult::empty()))
    }

    pub fn calls(&self) -> Vec<(String, Vec<StatementParam>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|(sql, _)| sql).collect()
    }
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, sql: &str, params: &[StatementParam]) -> Result<QueryResult> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        (self.handler)(sql, params)
    }
}

/// Language model double replaying canned responses in order.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SqlGenError::Llm("no scripted response left".to_string()))
    }
}

pub fn rows(columns: &[&str], rows: &[&[&str]]) -> QueryResult {
    QueryResult::with_columns(
        columns,
        rows.iter()
            .map(|row| row.iter().map(|v| Some(v.to_string())).collect())
            .collect(),
    )
}

pub fn sql_block(sql: &str) -> String {
    format!("```sql\n{}\n```", sql)
}
