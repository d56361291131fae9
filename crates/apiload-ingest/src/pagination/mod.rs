//! Pagination strategy engine
//!
//! [`Paginator::run`] dispatches one endpoint to its strategy:
//!
//! - **per_page**: probe the page count, fetch pages concurrently, commit
//!   them in batches ([`per_page`])
//! - **date_range**: walk calendar months, optionally once per dependency
//!   value, strictly sequentially ([`date_range`])

pub mod batcher;
pub mod date_range;
pub mod dates;
pub mod per_page;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::client::ApiClient;
use crate::config::IngestConfig;
use crate::endpoint::EndpointDescriptor;
use crate::error::{IngestError, Result};
use crate::store::RecordSink;

pub use batcher::{Batch, BatchAccumulator, PageResult};
pub use date_range::RunContext;
pub use dates::{generate_date_range, DateWindow};

/// How an endpoint is paginated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PerPage,
    DateRange,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::PerPage => "per_page",
            Strategy::DateRange => "date_range",
        }
    }

    /// Per-page batches are independent; date-range windows share one run ordinal
    pub fn default_failure_policy(self) -> FailurePolicy {
        match self {
            Strategy::PerPage => FailurePolicy::Continue,
            Strategy::DateRange => FailurePolicy::Abort,
        }
    }
}

impl FromStr for Strategy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per_page" => Ok(Strategy::PerPage),
            "date_range" => Ok(Strategy::DateRange),
            other => Err(IngestError::UnsupportedStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a batch cannot be fetched or persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, count the failure and move on
    Continue,
    /// Stop the run and return the error
    Abort,
}

/// Outcome of one endpoint run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub action: String,
    pub strategy: Strategy,
    pub pages_fetched: usize,
    pub records_reported: u64,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub rows_written: u64,
}

impl RunSummary {
    pub fn new(action: &str, strategy: Strategy) -> Self {
        Self {
            action: action.to_string(),
            strategy,
            pages_fetched: 0,
            records_reported: 0,
            batches_committed: 0,
            batches_failed: 0,
            rows_written: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.batches_failed == 0
    }
}

/// Runs endpoints against one API client and one destination store
pub struct Paginator<S> {
    client: ApiClient,
    store: S,
    config: IngestConfig,
    today: NaiveDate,
}

impl<S: RecordSink> Paginator<S> {
    pub fn new(client: ApiClient, store: S, config: IngestConfig) -> Self {
        Self {
            client,
            store,
            config,
            today: Local::now().date_naive(),
        }
    }

    /// Pin the date used as the end of date-range runs
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Fetch and persist one endpoint using its declared strategy
    #[instrument(skip(self, endpoint), fields(action = %endpoint.action, resource = %endpoint.resource))]
    pub async fn run(&self, endpoint: &EndpointDescriptor) -> Result<RunSummary> {
        let strategy = endpoint.strategy()?;
        let policy = endpoint.effective_failure_policy(strategy);
        info!(%strategy, ?policy, "Starting endpoint");

        let summary = match strategy {
            Strategy::PerPage => per_page::run(self, endpoint, policy).await?,
            Strategy::DateRange => date_range::run(self, endpoint, policy).await?,
        };

        info!(
            pages = summary.pages_fetched,
            records = summary.records_reported,
            batches = summary.batches_committed,
            failed_batches = summary.batches_failed,
            rows = summary.rows_written,
            "Endpoint finished"
        );
        Ok(summary)
    }
}
