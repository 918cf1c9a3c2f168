//! Databricks SQL warehouse
//!
//! Uses the SQL Statement Execution REST API: `POST /api/2.0/sql/statements`
//! submits a statement, `GET /api/2.0/sql/statements/{id}` polls it while it
//! is pending or running. Results are requested as `JSON_ARRAY` with `INLINE`
//! disposition, so every value arrives as a string (or null).

use crate::config::WarehouseConfig;
use crate::error::{Result, SqlGenError};
use crate::warehouse::result::{ColumnInfo, QueryResult};
use crate::warehouse::{StatementParam, Warehouse};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// Databricks SQL warehouse client
pub struct DatabricksWarehouse {
    client: Client,
    base_url: String,
    access_token: String,
    warehouse_id: String,
    wait_timeout_secs: u64,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "no_params")]
    parameters: &'a [StatementParam],
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    manifest: Option<ResultManifest>,
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    schema: Option<ManifestSchema>,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    columns: Option<Vec<ManifestColumn>>,
}

#[derive(Debug, Deserialize)]
struct ManifestColumn {
    name: String,
    type_name: Option<String>,
    position: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResultChunk {
    data_array: Option<Vec<Vec<Option<String>>>>,
    next_chunk_internal_link: Option<String>,
}

impl DatabricksWarehouse {
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.wait_timeout_secs + 60))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| SqlGenError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            access_token: config.access_token.clone(),
            warehouse_id: config.warehouse_id()?,
            // The API accepts 0 or 5..=50 seconds
            wait_timeout_secs: config.wait_timeout_secs.clamp(5, 50),
            poll_interval: Duration::from_secs(1),
            max_polls: 600,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn submit(&self, sql: &str, params: &[StatementParam]) -> Result<StatementResponse> {
        let body = StatementRequest {
            warehouse_id: &self.warehouse_id,
            statement: sql,
            wait_timeout: format!("{}s", self.wait_timeout_secs),
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: "INLINE",
            parameters: params,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, STATEMENTS_PATH))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlGenError::Transport(format!("Statement submission failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementResponse> {
        let response = self
            .client
            .get(format!("{}{}/{}", self.base_url, STATEMENTS_PATH, statement_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SqlGenError::Transport(format!("Statement poll failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn fetch_chunk(&self, internal_link: &str) -> Result<ResultChunk> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, internal_link))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SqlGenError::Transport(format!("Result chunk fetch failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SqlGenError::Transport(format!("Malformed warehouse response: {}", e)))
    }

    async fn collect(&self, statement: StatementResponse) -> Result<QueryResult> {
        let mut columns: Vec<(u32, ColumnInfo)> = statement
            .manifest
            .and_then(|m| m.schema)
            .and_then(|s| s.columns)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, c)| {
                (
                    c.position.unwrap_or(idx as u32),
                    ColumnInfo {
                        name: c.name,
                        type_name: c.type_name,
                    },
                )
            })
            .collect();
        columns.sort_by_key(|(position, _)| *position);
        let columns = columns.into_iter().map(|(_, c)| c).collect();

        let mut rows = Vec::new();
        let mut next = statement.result;
        while let Some(chunk) = next.take() {
            rows.extend(chunk.data_array.unwrap_or_default());
            if let Some(link) = chunk.next_chunk_internal_link {
                debug!("Fetching result chunk {}", link);
                next = Some(self.fetch_chunk(&link).await?);
            }
        }

        Ok(QueryResult::new(columns, rows))
    }
}

#[async_trait]
impl Warehouse for DatabricksWarehouse {
    fn name(&self) -> &'static str {
        "databricks"
    }

    async fn execute(&self, sql: &str, params: &[StatementParam]) -> Result<QueryResult> {
        debug!("Executing statement: {}", sql);
        let mut statement = self.submit(sql, params).await?;
        let mut polls = 0u32;

        loop {
            let state = statement.status.state.clone();
            match state.as_str() {
                "SUCCEEDED" => {
                    let result = self.collect(statement).await?;
                    info!("✅ Statement returned {} rows", result.row_count());
                    return Ok(result);
                }
                "PENDING" | "RUNNING" => {
                    polls += 1;
                    if polls > self.max_polls {
                        warn!("Statement {} still running after {} polls", statement.statement_id, polls);
                        return Err(SqlGenError::Transport(format!(
                            "Statement {} timed out waiting for completion",
                            statement.statement_id
                        )));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                    statement = self.poll(&statement.statement_id).await?;
                }
                "FAILED" => {
                    let message = statement
                        .status
                        .error
                        .map(format_service_error)
                        .unwrap_or_else(|| "Statement failed without an error message".to_string());
                    debug!("Statement failed: {}", message);
                    return Err(SqlGenError::Warehouse(message));
                }
                other => {
                    return Err(SqlGenError::Warehouse(format!(
                        "Statement {} ended in state {}",
                        statement.statement_id, other
                    )));
                }
            }
        }
    }
}

fn no_params(params: &&[StatementParam]) -> bool {
    params.is_empty()
}

fn format_service_error(error: ServiceError) -> String {
    match (error.error_code, error.message) {
        (Some(code), Some(message)) if !message.contains(&code) => format!("[{}] {}", code, message),
        (_, Some(message)) => message,
        (Some(code), None) => code,
        (None, None) => "Unknown statement error".to_string(),
    }
}

/// Throttling and server-side failures are transport problems, 401/403 are
/// credential problems; other non-success statuses mean the request itself
/// was rejected.
fn classify_http_failure(status: StatusCode, body: &str) -> SqlGenError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SqlGenError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => SqlGenError::Transport(message),
        s if s.is_server_error() => SqlGenError::Transport(message),
        _ => SqlGenError::Warehouse(message),
    }
}
