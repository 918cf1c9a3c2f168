//! Runtime configuration
//!
//! Everything is read from the process environment (optionally seeded from a
//! `.env` file by the binary). Warehouse credentials are mandatory, the rest
//! falls back to defaults.

use crate::error::{Result, SqlGenError};
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_HISTORY_TABLE: &str = "hive_metastore.dev_tools.sqlgen_user_query_history";
pub const DEFAULT_HISTORY_WINDOW_DAYS: i64 = 20;
pub const MAX_HISTORY_WINDOW_DAYS: i64 = 365_000;
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u8 = 5;

/// Connection settings for the SQL warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: String,
    pub access_token: String,
    pub http_path: String,
    /// Seconds the statement API may block before returning a pending statement.
    pub wait_timeout_secs: u64,
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: required("DATABRICKS_SERVER_HOSTNAME")?,
            access_token: required("DATABRICKS_ACCESS_TOKEN")?,
            http_path: required("DATABRICKS_HTTP_PATH")?,
            wait_timeout_secs: parsed("DATABRICKS_WAIT_TIMEOUT_SECS", 30)?,
        })
    }

    /// Warehouse id is the last segment of the HTTP path,
    /// e.g. `/sql/1.0/warehouses/abc123` -> `abc123`.
    pub fn warehouse_id(&self) -> Result<String> {
        self.http_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SqlGenError::Config(format!(
                    "Cannot derive warehouse id from HTTP path '{}'",
                    self.http_path
                ))
            })
    }

    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: required("OPENAI_API_KEY")?,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
            temperature: parsed("OPENAI_TEMPERATURE", 0.0)?,
        })
    }
}

/// Where saved queries live.
#[derive(Debug, Clone)]
pub enum HistoryBackend {
    /// Append-only table inside the warehouse.
    Warehouse { table: String },
    /// Local SQLite file.
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    pub window_days: i64,
}

impl HistoryConfig {
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("SQLGEN_HISTORY_DB") {
            Ok(path) if !path.trim().is_empty() => HistoryBackend::Sqlite {
                path: PathBuf::from(path),
            },
            _ => HistoryBackend::Warehouse {
                table: std::env::var("SQLGEN_HISTORY_TABLE")
                    .unwrap_or_else(|_| DEFAULT_HISTORY_TABLE.to_string()),
            },
        };

        Ok(Self {
            backend,
            window_days: check_window_days(parsed("SQLGEN_HISTORY_WINDOW_DAYS", DEFAULT_HISTORY_WINDOW_DAYS)?)?,
        })
    }
}

/// Windows must be positive and no longer than about a thousand years.
fn check_window_days(days: i64) -> Result<i64> {
    if (1..=MAX_HISTORY_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(SqlGenError::Config(format!(
            "SQLGEN_HISTORY_WINDOW_DAYS must be between 1 and {}, got {}",
            MAX_HISTORY_WINDOW_DAYS, days
        )))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepairConfig {
    pub max_attempts: u8,
    pub abort_on_repeat: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            abort_on_repeat: false,
        }
    }
}

impl RepairConfig {
    pub fn from_env() -> Result<Self> {
        let max_attempts: u8 = parsed("SQLGEN_MAX_REPAIR_ATTEMPTS", DEFAULT_MAX_REPAIR_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(SqlGenError::Config(
                "SQLGEN_MAX_REPAIR_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            abort_on_repeat: parsed("SQLGEN_ABORT_ON_REPEAT", false)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub history: HistoryConfig,
    pub repair: RepairConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            warehouse: WarehouseConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            history: HistoryConfig::from_env()?,
            repair: RepairConfig::from_env()?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SqlGenError::Config(format!("{} is not set", name))),
    }
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|e| {
            SqlGenError::Config(format!("Invalid value '{}' for {}: {}", raw, name, e))
        }),
        _ => Ok(default),
    }
}
