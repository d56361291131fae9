//! Calendar-month pagination
//!
//! Every (dimension value, month) pair is fetched and persisted in order, one
//! batch per window. The batch ordinal and the "table already replaced" flag
//! live in a [`RunContext`] that spans the whole run, so the second dimension
//! value appends to what the first one wrote.

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::dates::{month_windows, DateWindow};
use super::{FailurePolicy, Paginator, RunSummary, Strategy};
use crate::endpoint::EndpointDescriptor;
use crate::error::Result;
use crate::store::RecordSink;

/// Mutable state of one date-range run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunContext {
    ordinal: u64,
    table_replaced: bool,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinal for the next window; never reset within a run
    pub fn next_ordinal(&mut self) -> u64 {
        self.ordinal += 1;
        self.ordinal
    }

    pub fn current_ordinal(&self) -> u64 {
        self.ordinal
    }

    /// The first successfully persisted window replaces the table
    pub fn should_replace(&self) -> bool {
        !self.table_replaced
    }

    pub fn mark_replaced(&mut self) {
        self.table_replaced = true;
    }
}

/// Request params for one window, with the optional dimension value injected
pub fn window_params(
    endpoint: &EndpointDescriptor,
    dimension: Option<&Value>,
    window: &DateWindow,
) -> Map<String, Value> {
    let mut params = endpoint.params.clone();
    if let Some(value) = dimension {
        params.insert(endpoint.depends_on_column.clone(), value.clone());
    }
    params.insert(
        endpoint.period_start_label.clone(),
        Value::String(window.start_param()),
    );
    params.insert(
        endpoint.period_end_label.clone(),
        Value::String(window.end_param()),
    );
    params
}

/// Run the date-range strategy for one endpoint
pub async fn run<S: RecordSink>(
    paginator: &Paginator<S>,
    endpoint: &EndpointDescriptor,
    policy: FailurePolicy,
) -> Result<RunSummary> {
    let mut summary = RunSummary::new(&endpoint.action, Strategy::DateRange);
    let windows = month_windows(&paginator.config().start_date, paginator.today())?;
    if windows.is_empty() {
        warn!(
            start_date = %paginator.config().start_date,
            "Start date is after today, nothing to fetch"
        );
        return Ok(summary);
    }

    let dimensions: Vec<Option<Value>> = match &endpoint.depends_on {
        Some(table) => {
            let values = paginator
                .store()
                .distinct_values(table, &endpoint.depends_on_column)
                .await?;
            info!(
                depends_on = %table,
                column = %endpoint.depends_on_column,
                values = values.len(),
                "Resolved dimension values"
            );
            if values.is_empty() {
                warn!(depends_on = %table, "Dependency table has no values, nothing to fetch");
                return Ok(summary);
            }
            values.into_iter().map(Some).collect()
        },
        None => vec![None],
    };

    info!(
        windows = windows.len(),
        dimensions = dimensions.len(),
        "Fetching date windows"
    );

    let mut context = RunContext::new();
    for dimension in &dimensions {
        for window in &windows {
            let ordinal = context.next_ordinal();
            let outcome = fetch_and_persist(
                paginator,
                endpoint,
                dimension.as_ref(),
                window,
                ordinal,
                &mut context,
            )
            .await;
            match outcome {
                Ok(rows) => {
                    summary.pages_fetched += 1;
                    summary.batches_committed += 1;
                    summary.rows_written += rows;
                },
                Err(e) => {
                    summary.batches_failed += 1;
                    error!(
                        batch = ordinal,
                        dimension = ?dimension,
                        start = %window.start_param(),
                        end = %window.end_param(),
                        error = %e,
                        "Date window failed"
                    );
                    if policy == FailurePolicy::Abort {
                        return Err(e);
                    }
                },
            }
        }
    }

    Ok(summary)
}

async fn fetch_and_persist<S: RecordSink>(
    paginator: &Paginator<S>,
    endpoint: &EndpointDescriptor,
    dimension: Option<&Value>,
    window: &DateWindow,
    ordinal: u64,
    context: &mut RunContext,
) -> Result<u64> {
    let params = window_params(endpoint, dimension, window);
    let body = paginator
        .client()
        .call(&endpoint.resource, &endpoint.action, &params)
        .await?
        .into_json()?;

    let replace = context.should_replace();
    let rows = paginator
        .store()
        .persist(ordinal, &endpoint.resource, std::slice::from_ref(&body), replace)
        .await?;
    if replace {
        context.mark_replaced();
    }

    info!(
        batch = ordinal,
        start = %window.start_param(),
        end = %window.end_param(),
        rows,
        replace,
        "Date window persisted"
    );
    Ok(rows)
}
