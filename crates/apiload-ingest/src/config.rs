//! Configuration management
//!
//! Settings are read from the process environment after loading an optional
//! `.env` file. Credentials and connection targets are required; every tuning
//! knob has a `DEFAULT_*` constant.

use apiload_common::env;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// API Client Constants
// ============================================================================

/// Per-attempt request timeout in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Total attempts per request, first try included.
pub const DEFAULT_API_MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff in milliseconds.
pub const DEFAULT_API_BACKOFF_MS: u64 = 1_000;

/// Upper bound for a single exponential backoff wait in seconds. A server
/// `Retry-After` is honored as given.
pub const DEFAULT_API_MAX_BACKOFF_SECS: u64 = 60;

// ============================================================================
// Database Constants
// ============================================================================

pub const DEFAULT_DB_PORT: u16 = 5432;

/// Connections kept open in the pool.
pub const DEFAULT_DB_POOL_SIZE: u32 = 5;

/// Extra connections the pool may open under load.
pub const DEFAULT_DB_MAX_OVERFLOW: u32 = 10;

/// Rows per INSERT statement.
pub const DEFAULT_DB_INSERT_CHUNK_SIZE: usize = 1_000;

// ============================================================================
// Ingestion Constants
// ============================================================================

/// First month fetched by date-range endpoints (dd/mm/yyyy).
pub const DEFAULT_START_DATE: &str = "01/01/2025";

/// Concurrent page fetches for per-page endpoints.
pub const DEFAULT_WORKERS: usize = 5;

/// Pages committed together as one batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

pub const DEFAULT_ENDPOINTS_PATH: &str = "endpoints.json";

/// Columns stored as NUMERIC(15,2) when a table is created.
pub const DEFAULT_NUMERIC_COLUMNS: &[&str] = &[
    "valor_documento",
    "valor_pago",
    "valor_aberto",
    "valor_desconto",
    "valor_juros",
    "valor_multa",
    "nValorDocumento",
    "nValorMovCC",
    "nSaldo",
    "nSaldoAnterior",
    "nSaldoAtual",
];

/// Fields removed from every per-page record before persistence.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "tags",
    "recomendacoes",
    "homepage",
    "fax_ddd",
    "bloquear_exclusao",
    "produtor_rural",
];

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

/// Remote API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub app_key: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_secs: u64,
}

/// Destination database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub insert_chunk_size: usize,
}

/// Pagination and persistence tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// dd/mm/yyyy
    pub start_date: String,
    pub workers: usize,
    pub batch_size: usize,
    pub numeric_columns: Vec<String>,
    pub denylist: Vec<String>,
    pub endpoints_path: PathBuf,
}

impl Settings {
    /// Load settings from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load settings from the process environment only
    pub fn from_env() -> Result<Self> {
        let settings = Settings {
            api: ApiConfig {
                base_url: env::required("BASE_URL")?,
                app_key: env::required("APP_KEY")?,
                app_secret: env::required("APP_SECRET")?,
                timeout_secs: env::parse_or("API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS)?,
                max_attempts: env::parse_or("API_MAX_ATTEMPTS", DEFAULT_API_MAX_ATTEMPTS)?,
                backoff_ms: env::parse_or("API_BACKOFF_MS", DEFAULT_API_BACKOFF_MS)?,
                max_backoff_secs: env::parse_or(
                    "API_MAX_BACKOFF_SECS",
                    DEFAULT_API_MAX_BACKOFF_SECS,
                )?,
            },
            database: DatabaseConfig {
                host: env::required("DB_HOST")?,
                port: env::parse_or("DB_PORT", DEFAULT_DB_PORT)?,
                username: env::required("DB_USERNAME")?,
                password: env::required("DB_PASSWORD")?,
                name: env::required("DB_NAME")?,
                pool_size: env::parse_or("DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE)?,
                max_overflow: env::parse_or("DB_MAX_OVERFLOW", DEFAULT_DB_MAX_OVERFLOW)?,
                insert_chunk_size: env::parse_or(
                    "DB_INSERT_CHUNK_SIZE",
                    DEFAULT_DB_INSERT_CHUNK_SIZE,
                )?,
            },
            ingest: IngestConfig {
                start_date: env::string_or("DATE_INIT", DEFAULT_START_DATE),
                workers: env::parse_or("INGEST_WORKERS", DEFAULT_WORKERS)?,
                batch_size: env::parse_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                numeric_columns: env::list_or("NUMERIC_COLUMNS", DEFAULT_NUMERIC_COLUMNS),
                denylist: env::list_or("DENYLIST_FIELDS", DEFAULT_DENYLIST),
                endpoints_path: PathBuf::from(env::string_or(
                    "ENDPOINTS_PATH",
                    DEFAULT_ENDPOINTS_PATH,
                )),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(IngestError::config("BASE_URL cannot be empty"));
        }
        if self.api.max_attempts == 0 {
            return Err(IngestError::config("API_MAX_ATTEMPTS must be greater than 0"));
        }
        if self.database.pool_size == 0 {
            return Err(IngestError::config("DB_POOL_SIZE must be greater than 0"));
        }
        if self.database.insert_chunk_size == 0 {
            return Err(IngestError::config("DB_INSERT_CHUNK_SIZE must be greater than 0"));
        }
        if self.ingest.workers == 0 {
            return Err(IngestError::config("INGEST_WORKERS must be greater than 0"));
        }
        if self.ingest.batch_size == 0 {
            return Err(IngestError::config("INGEST_BATCH_SIZE must be greater than 0"));
        }
        crate::pagination::dates::parse_start_date(&self.ingest.start_date)?;
        Ok(())
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl DatabaseConfig {
    /// Connection options built field by field so credentials need no URL escaping
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.name)
    }

    /// Pool ceiling: persistent connections plus overflow
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: String::new(),
                app_key: String::new(),
                app_secret: String::new(),
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
                max_attempts: DEFAULT_API_MAX_ATTEMPTS,
                backoff_ms: DEFAULT_API_BACKOFF_MS,
                max_backoff_secs: DEFAULT_API_MAX_BACKOFF_SECS,
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: DEFAULT_DB_PORT,
                username: String::new(),
                password: String::new(),
                name: String::new(),
                pool_size: DEFAULT_DB_POOL_SIZE,
                max_overflow: DEFAULT_DB_MAX_OVERFLOW,
                insert_chunk_size: DEFAULT_DB_INSERT_CHUNK_SIZE,
            },
            ingest: IngestConfig {
                start_date: DEFAULT_START_DATE.to_string(),
                workers: DEFAULT_WORKERS,
                batch_size: DEFAULT_BATCH_SIZE,
                numeric_columns: DEFAULT_NUMERIC_COLUMNS.iter().map(|s| s.to_string()).collect(),
                denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
                endpoints_path: PathBuf::from(DEFAULT_ENDPOINTS_PATH),
            },
        }
    }
}
