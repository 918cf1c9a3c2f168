use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlGenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Code block extraction error: {0}")]
    Extraction(String),

    /// The warehouse accepted the request but the statement itself failed.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// The warehouse could not be reached or answered with a non-success HTTP status.
    #[error("Warehouse transport error: {0}")]
    Transport(String),

    /// The warehouse rejected the credentials (HTTP 401/403).
    #[error("Warehouse authentication error: {0}")]
    Auth(String),

    #[error("History store error: {0}")]
    History(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for SqlGenError {
    fn from(err: polars::error::PolarsError) -> Self {
        SqlGenError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SqlGenError>;
