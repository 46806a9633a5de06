use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetailError {
    #[error("Source dataset not found at {path:?}")]
    SourceNotFound { path: PathBuf },

    #[error("Warehouse not found at {path:?}; run the ETL rebuild first")]
    StorageNotFound { path: PathBuf },

    #[error("Required column missing from source header: {0}")]
    MissingColumn(String),

    #[error("Malformed value {value:?} in column '{column}' at line {line}")]
    MalformedRecord {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Forecast error: {0}")]
    Forecast(String),

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RetailError>;
