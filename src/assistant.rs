//! SQL assistant
//!
//! The entry point a front end talks to: browse the catalog, summarize a
//! table selection, ask a question (generate, then validate and repair),
//! follow up on a validated query, preview results and manage favourites.
//! Expensive calls are memoized; the `regenerate_*` and `refresh_*` methods
//! drop the matching cache entries first.

use crate::cache::{CacheKey, MemoCache};
use crate::catalog::{fetch_table_metadata, CatalogTree, TableRef};
use crate::config::{AppConfig, HistoryBackend, RepairConfig, DEFAULT_HISTORY_WINDOW_DAYS};
use crate::error::Result;
use crate::generator::SqlGenerator;
use crate::history::{HistoryStore, QueryRecord, SqliteHistoryStore, WarehouseHistoryStore};
use crate::llm::{LanguageModel, LlmClient};
use crate::repair_loop::{RepairLoop, RepairOutcome, SqlValidator};
use crate::schema::{SchemaSummarizer, SchemaSummary};
use crate::session::SessionState;
use crate::warehouse::{DatabricksWarehouse, QueryResult, Warehouse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const FN_TABLE_METADATA: &str = "fetch_table_metadata";
const FN_SUMMARIZE: &str = "summarize_table_schema";
const FN_ERD: &str = "generate_erd_mermaid";
const FN_INITIAL_SQL: &str = "generate_initial_sql";
const FN_FOLLOW_UP: &str = "enhance_sql_with_cte";
const FN_QUESTIONS: &str = "generate_analysis_questions";
const FN_PREVIEW: &str = "execute_sql_query";
const FN_HISTORY: &str = "get_user_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    Saved,
    AlreadySaved,
}

#[derive(Default)]
struct Caches {
    tables: MemoCache<Vec<TableRef>>,
    summaries: MemoCache<SchemaSummary>,
    text: MemoCache<String>,
    questions: MemoCache<Vec<String>>,
    previews: MemoCache<QueryResult>,
    history: MemoCache<Vec<QueryRecord>>,
}

pub struct Assistant {
    warehouse: Arc<dyn Warehouse>,
    summarizer: SchemaSummarizer,
    generator: SqlGenerator,
    repair_loop: RepairLoop,
    history: Arc<dyn HistoryStore>,
    history_window_days: i64,
    caches: Caches,
}

impl Assistant {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        llm: Arc<dyn LanguageModel>,
        history: Arc<dyn HistoryStore>,
        repair: RepairConfig,
    ) -> Self {
        let generator = SqlGenerator::new(llm);
        let validator = SqlValidator::new(Arc::clone(&warehouse), generator.clone());
        Self {
            summarizer: SchemaSummarizer::new(Arc::clone(&warehouse)),
            repair_loop: RepairLoop::from_config(validator, repair),
            warehouse,
            generator,
            history,
            history_window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            caches: Caches::default(),
        }
    }

    pub fn with_history_window(mut self, days: i64) -> Self {
        self.history_window_days = days;
        self
    }

    /// Wire up the Databricks warehouse, the chat model and the configured
    /// history backend.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let warehouse: Arc<dyn Warehouse> = Arc::new(DatabricksWarehouse::new(&config.warehouse)?);
        let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::from_config(&config.llm)?);

        let history: Arc<dyn HistoryStore> = match &config.history.backend {
            HistoryBackend::Sqlite { path } => Arc::new(SqliteHistoryStore::open(path)?),
            HistoryBackend::Warehouse { table } => {
                let store = WarehouseHistoryStore::new(Arc::clone(&warehouse), table.clone())?;
                store.ensure_table().await?;
                Arc::new(store)
            }
        };

        Ok(Self::new(warehouse, llm, history, config.repair).with_history_window(config.history.window_days))
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub async fn table_metadata(&self) -> Result<Vec<TableRef>> {
        let key = CacheKey::new(FN_TABLE_METADATA, &())?;
        self.caches
            .tables
            .get_or_compute(key, || fetch_table_metadata(self.warehouse.as_ref()))
            .await
    }

    pub async fn catalog_tree(&self) -> Result<CatalogTree> {
        Ok(CatalogTree::from_tables(&self.table_metadata().await?))
    }

    /// Expand `All` and de-duplicate a table selection.
    pub async fn resolve_tables(&self, catalog: &str, schema: &str, selected: &[String]) -> Result<Vec<String>> {
        Ok(self
            .catalog_tree()
            .await?
            .resolve_selection(catalog, schema, selected))
    }

    pub async fn summarize(&self, catalog: &str, schema: &str, tables: &[String]) -> Result<SchemaSummary> {
        let key = CacheKey::new(FN_SUMMARIZE, &(catalog, schema, tables))?;
        self.caches
            .summaries
            .get_or_compute(key, || self.summarizer.summarize(catalog, schema, tables))
            .await
    }

    pub async fn erd(&self, catalog: &str, schema: &str, tables: &[String]) -> Result<String> {
        let key = CacheKey::new(FN_ERD, &(catalog, schema, tables))?;
        self.caches
            .text
            .get_or_compute(key, || async {
                let mut table_columns = BTreeMap::new();
                for table in tables {
                    let columns = self
                        .summarizer
                        .describe_columns(&TableRef::new(catalog, schema, table.as_str()))
                        .await?;
                    table_columns.insert(
                        table.clone(),
                        columns
                            .iter()
                            .map(|c| format!("{} : {}", c.name, c.data_type))
                            .collect::<Vec<_>>(),
                    );
                }
                self.generator.generate_erd_mermaid(&table_columns).await
            })
            .await
    }

    pub async fn regenerate_erd(&self, catalog: &str, schema: &str, tables: &[String]) -> Result<String> {
        self.caches.text.invalidate_function(FN_ERD);
        self.erd(catalog, schema, tables).await
    }

    pub async fn analysis_questions(&self, schema: &SchemaSummary) -> Result<Vec<String>> {
        let key = CacheKey::new(FN_QUESTIONS, schema)?;
        self.caches
            .questions
            .get_or_compute(key, || self.generator.generate_analysis_questions(schema))
            .await
    }

    pub async fn regenerate_analysis_questions(&self, schema: &SchemaSummary) -> Result<Vec<String>> {
        self.caches.questions.invalidate_function(FN_QUESTIONS);
        self.analysis_questions(schema).await
    }

    /// Generate SQL for `question` and run it through the repair loop.
    pub async fn ask(&self, question: &str, schema: &SchemaSummary) -> Result<RepairOutcome> {
        let key = CacheKey::new(FN_INITIAL_SQL, &(question, schema))?;
        let initial = self
            .caches
            .text
            .get_or_compute(key, || self.generator.generate_initial_sql(question, schema))
            .await?;
        self.repair_loop.run(question, &initial, schema).await
    }

    /// Answer a follow-up question on top of a validated query.
    pub async fn follow_up(&self, question: &str, schema: &SchemaSummary, base_sql: &str) -> Result<RepairOutcome> {
        let key = CacheKey::new(FN_FOLLOW_UP, &(question, schema, base_sql))?;
        let candidate = self
            .caches
            .text
            .get_or_compute(key, || self.generator.enhance_sql_with_cte(question, schema, base_sql))
            .await?;
        self.repair_loop.run(question, &candidate, schema).await
    }

    /// Drop cached generations so the next `ask`/`follow_up` asks the model again.
    pub fn regenerate_sql(&self) {
        self.caches.text.invalidate_function(FN_INITIAL_SQL);
        self.caches.text.invalidate_function(FN_FOLLOW_UP);
    }

    pub async fn preview(&self, sql: &str) -> Result<QueryResult> {
        let key = CacheKey::new(FN_PREVIEW, sql)?;
        self.caches
            .previews
            .get_or_compute(key, || self.warehouse.query(sql))
            .await
    }

    /// Save a favourite unless this session already saved the question.
    pub async fn save_favorite(
        &self,
        session: &mut SessionState,
        user_name: &str,
        question: &str,
        sql: &str,
    ) -> Result<SaveOutcome> {
        if session.is_favorite(question) {
            return Ok(SaveOutcome::AlreadySaved);
        }

        self.history.append(user_name, question, sql, true).await?;
        session.mark_favorite(question);
        self.caches.history.invalidate_function(FN_HISTORY);
        info!("⭐ Saved favourite for {}", user_name);
        Ok(SaveOutcome::Saved)
    }

    pub async fn favorites(&self, user_name: &str, schema: &str) -> Result<Vec<QueryRecord>> {
        let window = self.history_window_days;
        let key = CacheKey::new(FN_HISTORY, &(user_name, schema, window))?;
        self.caches
            .history
            .get_or_compute(key, || self.history.list(user_name, schema, window))
            .await
    }

    pub async fn refresh_favorites(&self, user_name: &str, schema: &str) -> Result<Vec<QueryRecord>> {
        self.caches.history.invalidate_function(FN_HISTORY);
        self.favorites(user_name, schema).await
    }
}
