//! Destination store
//!
//! The pagination engine only sees [`RecordSink`]; [`PgStore`] is the
//! PostgreSQL implementation that creates, replaces and widens tables to fit
//! whatever shape the API returns.

pub mod postgres;
pub mod rows;
pub mod schema;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{IngestError, Result};

pub use postgres::PgStore;
pub use rows::{flatten_record, prepare_batch, PreparedBatch};
pub use schema::{ColumnType, TableSchema};

/// Where fetched batches end up
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write one batch into the table derived from `resource`
    ///
    /// With `replace` the table is dropped and recreated from this batch;
    /// otherwise rows are appended, adding any new columns first. Returns the
    /// number of rows written.
    async fn persist(
        &self,
        ordinal: u64,
        resource: &str,
        records: &[Value],
        replace: bool,
    ) -> Result<u64>;

    /// Distinct non-null values of `column` in `table`
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<Value>>;
}

/// Table name for a resource path: the segment before the trailing one
///
/// `/api/v1/geral/clientes/` becomes `clientes`.
pub fn table_name_for(resource: &str) -> Result<String> {
    let segments: Vec<&str> = resource.split('/').collect();
    if segments.len() < 2 {
        return Err(IngestError::InvalidResource(resource.to_string()));
    }
    let name = segments[segments.len() - 2].trim();
    if name.is_empty() {
        return Err(IngestError::InvalidResource(resource.to_string()));
    }
    Ok(name.to_string())
}
