//! PostgreSQL record sink

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;
use tracing::{debug, error, info};

use super::rows::{coerce_numeric, prepare_batch, text_value, PreparedBatch};
use super::schema::{
    add_column_sql, drop_table_sql, insert_prefix, quote_ident, rows_per_statement,
    truncate_ident, ColumnType, TableSchema,
};
use super::{table_name_for, RecordSink};
use crate::config::{DatabaseConfig, DEFAULT_DB_INSERT_CHUNK_SIZE};
use crate::error::{IngestError, Result};

/// Store that creates and widens tables to fit incoming batches
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    numeric_columns: HashSet<String>,
    chunk_size: usize,
}

impl PgStore {
    /// Wrap an existing pool with the default insert chunk size
    pub fn new(pool: PgPool, numeric_columns: &[String]) -> Self {
        Self {
            pool,
            numeric_columns: numeric_columns.iter().cloned().collect(),
            chunk_size: DEFAULT_DB_INSERT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Open a pool sized `pool_size + max_overflow`, checking connections before use
    pub async fn connect(config: &DatabaseConfig, numeric_columns: &[String]) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.pool_size)
            .test_before_acquire(true)
            .connect_with(config.connect_options())
            .await?;

        info!(
            host = %config.host,
            database = %config.name,
            max_connections = config.max_connections(),
            "Database connection pool established"
        );

        Ok(Self::new(pool, numeric_columns).with_chunk_size(config.insert_chunk_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Existing columns of `table` in the current schema
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Ok(TableSchema::missing(table));
        }

        let columns: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(TableSchema {
            table: table.to_string(),
            exists: true,
            columns: columns
                .into_iter()
                .map(|(name, data_type)| (name, ColumnType::from_data_type(&data_type)))
                .collect(),
        })
    }

    /// Drop, recreate and fill the table in one transaction
    async fn replace_table(&self, table: &str, batch: &PreparedBatch) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| persist_failed(table, e))?;

        sqlx::query(&drop_table_sql(table))
            .execute(&mut *tx)
            .await
            .map_err(|e| persist_failed(table, e))?;

        if batch.is_empty() {
            tx.commit().await.map_err(|e| persist_failed(table, e))?;
            info!(table, "Table dropped, batch had no rows");
            return Ok(0);
        }

        let schema = TableSchema::for_batch(table, &batch.columns, &self.numeric_columns);
        let written = self
            .create_and_insert(&mut tx, &schema, batch)
            .await
            .map_err(|e| persist_failed(table, e))?;

        tx.commit().await.map_err(|e| persist_failed(table, e))?;
        Ok(written)
    }

    /// Append rows, creating the table or adding columns first as needed
    async fn append(&self, table: &str, batch: &PreparedBatch) -> Result<u64> {
        if batch.is_empty() {
            debug!(table, "Empty batch, nothing to append");
            return Ok(0);
        }

        let mut schema = self.table_schema(table).await?;
        if !schema.exists {
            let fresh = TableSchema::for_batch(table, &batch.columns, &self.numeric_columns);
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| persist_failed(table, e))?;
            let written = self
                .create_and_insert(&mut tx, &fresh, batch)
                .await
                .map_err(|e| persist_failed(table, e))?;
            tx.commit().await.map_err(|e| persist_failed(table, e))?;
            return Ok(written);
        }

        let missing: Vec<String> = schema
            .missing_columns(&batch.columns)
            .into_iter()
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.add_columns(table, &missing).await?;
            for column in &missing {
                schema.add_column(column, ColumnType::Text);
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| persist_failed(table, e))?;
        let written = self
            .insert_rows(&mut tx, &schema, batch)
            .await
            .map_err(|e| persist_failed(table, e))?;
        tx.commit().await.map_err(|e| persist_failed(table, e))?;
        Ok(written)
    }

    /// One `ALTER TABLE ... ADD COLUMN` per missing column, all or nothing
    async fn add_columns(&self, table: &str, columns: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| schema_update_failed(table, e))?;

        for column in columns {
            sqlx::query(&add_column_sql(table, column))
                .execute(&mut *tx)
                .await
                .map_err(|e| schema_update_failed(table, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| schema_update_failed(table, e))?;
        info!(table, added = ?columns, "Added columns");
        Ok(())
    }

    async fn create_and_insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        schema: &TableSchema,
        batch: &PreparedBatch,
    ) -> sqlx::Result<u64> {
        sqlx::query(&schema.create_sql()).execute(&mut **tx).await?;
        info!(table = %schema.table, columns = schema.columns.len(), "Created table");
        self.insert_rows(tx, schema, batch).await
    }

    /// Chunked multi-row INSERTs bound by the table's actual column types
    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        schema: &TableSchema,
        batch: &PreparedBatch,
    ) -> sqlx::Result<u64> {
        let types: Vec<ColumnType> = batch
            .columns
            .iter()
            .map(|column| schema.column_type(column).unwrap_or(ColumnType::Text))
            .collect();
        let prefix = insert_prefix(&schema.table, &batch.columns);
        let per_statement = rows_per_statement(self.chunk_size, batch.columns.len());

        let mut written = 0;
        for chunk in batch.rows.chunks(per_statement) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
            query_builder.push_values(chunk, |mut b, row| {
                for (column, ty) in batch.columns.iter().zip(&types) {
                    match ty {
                        ColumnType::Numeric => {
                            b.push_bind(coerce_numeric(row.get(column)));
                        },
                        ColumnType::Text => {
                            b.push_bind(text_value(row.get(column)));
                        },
                    }
                }
            });
            written += query_builder.build().execute(&mut **tx).await?.rows_affected();
        }

        debug!(table = %schema.table, rows = written, "Inserted rows");
        Ok(written)
    }
}

#[async_trait]
impl RecordSink for PgStore {
    async fn persist(
        &self,
        ordinal: u64,
        resource: &str,
        records: &[Value],
        replace: bool,
    ) -> Result<u64> {
        let table = truncate_ident(&table_name_for(resource)?);
        let batch = prepare_batch(records);
        debug!(
            batch = ordinal,
            %table,
            records = records.len(),
            rows = batch.rows.len(),
            columns = batch.columns.len(),
            replace,
            "Persisting batch"
        );

        if replace {
            self.replace_table(&table, &batch).await
        } else {
            self.append(&table, &batch).await
        }
    }

    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        let sql = format!(
            "SELECT DISTINCT {column}::text FROM {table} WHERE {column} IS NOT NULL ORDER BY 1",
            column = quote_ident(column),
            table = quote_ident(table),
        );
        let values: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;

        Ok(values.into_iter().map(|value| dimension_value(&value)).collect())
    }
}

/// Integer-looking values go back to the API as numbers
fn dimension_value(raw: &str) -> Value {
    match raw.trim().parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn persist_failed(table: &str, source: sqlx::Error) -> IngestError {
    error!(table, error = %source, "Failed to persist batch");
    IngestError::PersistFailed {
        table: table.to_string(),
        source,
    }
}

fn schema_update_failed(table: &str, source: sqlx::Error) -> IngestError {
    error!(table, error = %source, "Failed to update table schema");
    IngestError::SchemaUpdateFailed {
        table: table.to_string(),
        source,
    }
}
