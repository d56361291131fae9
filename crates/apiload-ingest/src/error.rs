//! Error taxonomy for fetching and persisting endpoint data

use apiload_common::CommonError;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request never produced a response (connect, timeout, TLS, ...)
    #[error("Transport failed for {url}: {source}")]
    TransportFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// A JSON document was required but the body was not JSON
    #[error("Response is not valid JSON: {0}")]
    DecodeFailed(String),

    #[error("Failed to update schema of table '{table}': {source}")]
    SchemaUpdateFailed {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to persist into table '{table}': {source}")]
    PersistFailed {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Connecting, introspecting or reading the destination database
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Page fetch worker failed: {0}")]
    Worker(String),

    #[error("Unsupported pagination strategy: '{0}'")]
    UnsupportedStrategy(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Invalid date '{0}', expected dd/mm/yyyy")]
    InvalidDate(String),

    #[error("Invalid resource path '{0}': no table segment")]
    InvalidResource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
