//! apiload ingest library
//!
//! Loads paginated JSON API endpoints into PostgreSQL tables whose schema
//! follows the data.
//!
//! # Components
//!
//! - **client**: authenticated POST calls with retry and backoff
//! - **pagination**: per-page and date-range strategies driving fetch and commit
//! - **store**: table creation, column evolution and bulk inserts
//! - **endpoint**: the endpoint catalog
//!
//! # Example
//!
//! ```no_run
//! use apiload_ingest::{ApiClient, EndpointCatalog, Paginator, PgStore, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let catalog = EndpointCatalog::load(&settings.ingest.endpoints_path)?;
//!     let client = ApiClient::new(&settings.api)?;
//!     let store = PgStore::connect(&settings.database, &settings.ingest.numeric_columns).await?;
//!
//!     let paginator = Paginator::new(client, store, settings.ingest.clone());
//!     let summary = paginator.run(catalog.find_by_action("ListarClientes")?).await?;
//!     println!("{} rows written", summary.rows_written);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pagination;
pub mod store;

pub use client::{ApiClient, ApiResponse, RetryPolicy};
pub use config::Settings;
pub use endpoint::{EndpointCatalog, EndpointDescriptor};
pub use error::{IngestError, Result};
pub use pagination::{FailurePolicy, Paginator, RunSummary, Strategy};
pub use store::{PgStore, RecordSink};
