use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid asset reference: {0}")]
    InvalidAsset(String),

    #[error("Invalid period key: {0}")]
    InvalidPeriod(String),

    #[error("Quota store error: {0}")]
    Store(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, QuotaError>;
