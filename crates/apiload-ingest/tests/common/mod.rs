//! Shared fixtures for apiload-ingest integration tests
//!
//! - [`MemorySink`]: a [`RecordSink`] that records every persist call
//! - [`api_config`] / [`ingest_config`]: settings pointed at a wiremock server
//!   with zero backoff so retry tests run instantly

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use apiload_ingest::config::{ApiConfig, IngestConfig};
use apiload_ingest::{IngestError, RecordSink, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

/// One call to [`RecordSink::persist`]
#[derive(Debug, Clone)]
pub struct PersistCall {
    pub ordinal: u64,
    pub resource: String,
    pub records: Vec<Value>,
    pub replace: bool,
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<PersistCall>>,
    distinct: Vec<Value>,
    failing_ordinals: HashSet<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values returned by `distinct_values` for any table
    pub fn with_distinct_values(mut self, values: Vec<Value>) -> Self {
        self.distinct = values;
        self
    }

    /// Make persisting these batch ordinals fail
    pub fn failing_on(mut self, ordinals: &[u64]) -> Self {
        self.failing_ordinals = ordinals.iter().copied().collect();
        self
    }

    pub fn calls(&self) -> Vec<PersistCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Every record persisted, in call order
    pub fn records(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .flat_map(|call| call.records)
            .collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(
        &self,
        ordinal: u64,
        resource: &str,
        records: &[Value],
        replace: bool,
    ) -> Result<u64> {
        if self.failing_ordinals.contains(&ordinal) {
            return Err(IngestError::Worker(format!("batch {} rejected", ordinal)));
        }
        self.calls.lock().unwrap().push(PersistCall {
            ordinal,
            resource: resource.to_string(),
            records: records.to_vec(),
            replace,
        });
        Ok(records.len() as u64)
    }

    async fn distinct_values(&self, _table: &str, _column: &str) -> Result<Vec<Value>> {
        Ok(self.distinct.clone())
    }
}

/// API settings aimed at `base_url` with zero backoff
pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        app_key: "test-key".to_string(),
        app_secret: "test-secret".to_string(),
        timeout_secs: 5,
        max_attempts: 5,
        backoff_ms: 0,
        max_backoff_secs: 0,
    }
}

pub fn ingest_config(workers: usize, batch_size: usize) -> IngestConfig {
    IngestConfig {
        start_date: "01/01/2025".to_string(),
        workers,
        batch_size,
        numeric_columns: Vec::new(),
        denylist: vec!["tags".to_string(), "homepage".to_string()],
        endpoints_path: PathBuf::from("endpoints.json"),
    }
}
