mod common;

use common::{rows, sql_block, ScriptedLlm, ScriptedWarehouse};
use sqlgen::config::RepairConfig;
use sqlgen::error::SqlGenError;
use sqlgen::history::{HistoryStore, SqliteHistoryStore};
use sqlgen::schema::SchemaSummary;
use sqlgen::session::SessionState;
use sqlgen::{Assistant, SaveOutcome, ValidationStatus};
use std::sync::Arc;

fn schema() -> SchemaSummary {
    SchemaSummary::new("CREATE TABLE main.retail.orders (id BIGINT, status STRING)\n")
}

fn assistant(
    warehouse: Arc<ScriptedWarehouse>,
    llm: Arc<ScriptedLlm>,
    history: Arc<SqliteHistoryStore>,
) -> Assistant {
    Assistant::new(warehouse, llm, history, RepairConfig::default())
}

fn accepting_assistant(llm: Arc<ScriptedLlm>) -> (Assistant, Arc<ScriptedWarehouse>) {
    let warehouse = Arc::new(ScriptedWarehouse::accepting());
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    (assistant(warehouse.clone(), llm, history), warehouse)
}

#[tokio::test]
async fn test_favourite_is_saved_once_per_session() {
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(
        Arc::new(ScriptedWarehouse::accepting()),
        Arc::new(ScriptedLlm::silent()),
        history.clone(),
    );
    let mut session = SessionState::new();
    let sql = "SELECT status, COUNT(*) FROM main.retail.orders GROUP BY status";

    let first = assistant
        .save_favorite(&mut session, "ana", "Orders by status?", sql)
        .await
        .unwrap();
    let second = assistant
        .save_favorite(&mut session, "ana", "Orders by status?", sql)
        .await
        .unwrap();

    assert_eq!(first, SaveOutcome::Saved);
    assert_eq!(second, SaveOutcome::AlreadySaved);
    assert_eq!(history.list("ana", "retail", 20).await.unwrap().len(), 1);

    // A new session may save the same question again
    let mut other = SessionState::new();
    let third = assistant
        .save_favorite(&mut other, "ana", "Orders by status?", sql)
        .await
        .unwrap();
    assert_eq!(third, SaveOutcome::Saved);
}

#[tokio::test]
async fn test_saving_invalidates_cached_favourites() {
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(
        Arc::new(ScriptedWarehouse::accepting()),
        Arc::new(ScriptedLlm::silent()),
        history.clone(),
    );
    let mut session = SessionState::new();

    assert!(assistant.favorites("ana", "retail").await.unwrap().is_empty());

    assistant
        .save_favorite(&mut session, "ana", "Daily orders?", "SELECT 1 FROM main.retail.orders")
        .await
        .unwrap();
    assert_eq!(assistant.favorites("ana", "retail").await.unwrap().len(), 1);

    // Written behind the assistant's back: cached until refreshed
    history
        .append("ana", "Refunds?", "SELECT 2 FROM main.retail.refunds", true)
        .await
        .unwrap();
    assert_eq!(assistant.favorites("ana", "retail").await.unwrap().len(), 1);
    assert_eq!(assistant.refresh_favorites("ana", "retail").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_generation_is_cached_until_regenerated() {
    let llm = Arc::new(ScriptedLlm::new([
        sql_block("SELECT COUNT(*) FROM main.retail.orders"),
        sql_block("SELECT COUNT(id) FROM main.retail.orders"),
    ]));
    let (assistant, warehouse) = accepting_assistant(llm.clone());

    let first = assistant.ask("How many orders?", &schema()).await.unwrap();
    let again = assistant.ask("How many orders?", &schema()).await.unwrap();

    assert_eq!(first.status, ValidationStatus::Correct);
    assert_eq!(first.sql, "SELECT COUNT(*) FROM main.retail.orders");
    assert_eq!(again.sql, first.sql);
    assert_eq!(llm.prompts().len(), 1);
    // Validation itself is not cached
    assert_eq!(warehouse.statements().len(), 2);

    assistant.regenerate_sql();
    let fresh = assistant.ask("How many orders?", &schema()).await.unwrap();

    assert_eq!(fresh.sql, "SELECT COUNT(id) FROM main.retail.orders");
    assert_eq!(llm.prompts().len(), 2);
}

#[tokio::test]
async fn test_ask_repairs_generated_sql() {
    let llm = Arc::new(ScriptedLlm::new([
        sql_block("SELECT totl FROM main.retail.orders"),
        sql_block("SELECT total FROM main.retail.orders"),
    ]));
    let warehouse = Arc::new(ScriptedWarehouse::new(|sql, _| {
        if sql.contains("totl") {
            Err(SqlGenError::Warehouse(
                "[UNRESOLVED_COLUMN.WITH_SUGGESTION] A column `totl` cannot be resolved".to_string(),
            ))
        } else {
            Ok(rows(&["total"], &[&["1"]]))
        }
    }));
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(warehouse, llm.clone(), history);

    let outcome = assistant.ask("Order totals?", &schema()).await.unwrap();

    assert_eq!(outcome.status, ValidationStatus::Correct);
    assert_eq!(outcome.sql, "SELECT total FROM main.retail.orders");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(llm.prompts().len(), 2);
}

#[tokio::test]
async fn test_follow_up_builds_on_base_query() {
    let llm = Arc::new(ScriptedLlm::new([sql_block(
        "WITH MASTER AS (SELECT status FROM main.retail.orders) SELECT COUNT(*) FROM MASTER",
    )]));
    let (assistant, _) = accepting_assistant(llm.clone());
    let base_sql = "SELECT status FROM main.retail.orders";

    let outcome = assistant
        .follow_up("How many rows is that?", &schema(), base_sql)
        .await
        .unwrap();

    assert!(outcome.is_correct());
    assert!(outcome.sql.starts_with("WITH MASTER AS"));
    let prompt = &llm.prompts()[0];
    assert!(prompt.contains("MASTER"));
    assert!(prompt.contains(base_sql));
    assert!(prompt.contains("How many rows is that?"));
}

#[tokio::test]
async fn test_catalog_skips_unreadable_catalogs() {
    let warehouse = Arc::new(ScriptedWarehouse::new(|sql, _| match sql {
        "SHOW CATALOGS" => Ok(rows(&["catalog"], &[&["main"], &["locked"]])),
        "SHOW SCHEMAS IN `main`" => Ok(rows(&["databaseName"], &[&["retail"]])),
        "SHOW SCHEMAS IN `locked`" => Err(SqlGenError::Warehouse(
            "[INSUFFICIENT_PERMISSIONS] User does not have USE CATALOG".to_string(),
        )),
        "SHOW TABLES IN `main`.`retail`" => Ok(rows(
            &["database", "tableName", "isTemporary"],
            &[&["retail", "orders", "false"], &["retail", "customers", "false"]],
        )),
        other => Err(SqlGenError::Warehouse(format!("unexpected: {}", other))),
    }));
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(warehouse.clone(), Arc::new(ScriptedLlm::silent()), history);

    let tree = assistant.catalog_tree().await.unwrap();
    assert_eq!(tree.catalogs(), vec!["main"]);
    assert_eq!(tree.tables("main", "retail"), vec!["customers", "orders"]);

    let all = assistant
        .resolve_tables("main", "retail", &["All".to_string()])
        .await
        .unwrap();
    assert_eq!(all, vec!["customers".to_string(), "orders".to_string()]);

    // Metadata is fetched once
    assert_eq!(warehouse.statements().len(), 4);
}

#[tokio::test]
async fn test_catalog_listing_failure_propagates() {
    let warehouse = Arc::new(ScriptedWarehouse::new(|_, _| {
        Err(SqlGenError::Transport("connection refused".to_string()))
    }));
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(warehouse, Arc::new(ScriptedLlm::silent()), history);

    assert!(matches!(
        assistant.table_metadata().await,
        Err(SqlGenError::Transport(_))
    ));
}

#[tokio::test]
async fn test_analysis_questions_are_cached() {
    let llm = Arc::new(ScriptedLlm::new([
        "```json\n{\"business_questions\": [\"Which status is most common?\", \"How many orders per day?\"]}\n```",
        "```json\n{\"business_questions\": \"- Average order size?\\n- Busiest weekday?\"}\n```",
    ]));
    let (assistant, _) = accepting_assistant(llm.clone());

    let ideas = assistant.analysis_questions(&schema()).await.unwrap();
    assert_eq!(
        ideas,
        vec![
            "Which status is most common?".to_string(),
            "How many orders per day?".to_string()
        ]
    );
    assert_eq!(assistant.analysis_questions(&schema()).await.unwrap(), ideas);
    assert_eq!(llm.prompts().len(), 1);
    assert!(llm.prompts()[0].contains("business_questions"));

    let fresh = assistant.regenerate_analysis_questions(&schema()).await.unwrap();
    assert_eq!(
        fresh,
        vec!["Average order size?".to_string(), "Busiest weekday?".to_string()]
    );
}

#[tokio::test]
async fn test_preview_is_cached_per_statement() {
    let warehouse = Arc::new(ScriptedWarehouse::new(|_, _| {
        Ok(rows(&["status", "n"], &[&["open", "3"], &["closed", "5"]]))
    }));
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(warehouse.clone(), Arc::new(ScriptedLlm::silent()), history);
    let sql = "SELECT status, COUNT(*) AS n FROM main.retail.orders GROUP BY status";

    let first = assistant.preview(sql).await.unwrap();
    let second = assistant.preview(sql).await.unwrap();

    assert_eq!(first.row_count(), 2);
    assert_eq!(first, second);
    assert_eq!(warehouse.statements().len(), 1);
}

#[tokio::test]
async fn test_erd_uses_described_columns() {
    let warehouse = Arc::new(ScriptedWarehouse::new(|_, _| {
        Ok(rows(
            &["col_name", "data_type", "comment"],
            &[&["id", "bigint", ""], &["customer_id", "bigint", ""]],
        ))
    }));
    let llm = Arc::new(ScriptedLlm::new([
        "```mermaid\nerDiagram\n  orders {\n    bigint id\n  }\n```",
    ]));
    let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let assistant = assistant(warehouse, llm.clone(), history);

    let erd = assistant
        .erd("main", "retail", &["orders".to_string()])
        .await
        .unwrap();

    assert!(erd.starts_with("erDiagram"));
    assert!(llm.prompts()[0].contains("customer_id : bigint"));
}
