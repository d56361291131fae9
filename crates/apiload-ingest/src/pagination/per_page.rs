//! Page-counter pagination
//!
//! Pages are fetched by a bounded pool running on its own task and handed to
//! the calling task over a channel; only the calling task touches the store.

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::batcher::{Batch, BatchAccumulator, PageResult};
use super::{FailurePolicy, Paginator, RunSummary, Strategy};
use crate::client::{ApiClient, ApiResponse};
use crate::endpoint::EndpointDescriptor;
use crate::error::{IngestError, Result};
use crate::store::RecordSink;

/// One page to fetch; owns its own copy of the request parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub params: Map<String, Value>,
}

impl PageRequest {
    /// Copy `base` and set the page field
    pub fn new(base: &Map<String, Value>, page_label: &str, page: u32) -> Self {
        let mut params = base.clone();
        params.insert(page_label.to_string(), Value::from(page));
        Self { page, params }
    }
}

/// Everything a fetch worker needs, shared read-only between workers
#[derive(Debug)]
pub struct PageFetcher {
    client: ApiClient,
    resource: String,
    action: String,
    data_source: String,
    records_label: String,
    denylist: Vec<String>,
}

impl PageFetcher {
    pub fn new(client: ApiClient, endpoint: &EndpointDescriptor, denylist: &[String]) -> Self {
        Self {
            client,
            resource: endpoint.resource.clone(),
            action: endpoint.action.clone(),
            data_source: endpoint.data_source.clone(),
            records_label: endpoint.records_label.clone(),
            denylist: denylist.to_vec(),
        }
    }

    /// Fetch one page; failures yield an empty page instead of an error
    pub async fn fetch(&self, request: PageRequest) -> PageResult {
        let page = request.page;
        match self
            .client
            .call(&self.resource, &self.action, &request.params)
            .await
        {
            Ok(ApiResponse::Json(body)) => {
                let mut records = extract_records(&body, &self.data_source);
                for record in &mut records {
                    strip_denylisted(record, &self.denylist);
                }
                let reported = read_count(&body, &self.records_label).unwrap_or(0);
                debug!(page, records = records.len(), reported, "Page fetched");
                PageResult::new(page, records, reported)
            },
            Ok(ApiResponse::Text(_)) => {
                warn!(page, "Page body is not JSON, treating as empty");
                PageResult::empty(page)
            },
            Err(e) => {
                error!(page, error = %e, "Failed to fetch page");
                PageResult::empty(page)
            },
        }
    }
}

/// Run the per-page strategy for one endpoint
pub async fn run<S: RecordSink>(
    paginator: &Paginator<S>,
    endpoint: &EndpointDescriptor,
    policy: FailurePolicy,
) -> Result<RunSummary> {
    let mut summary = RunSummary::new(&endpoint.action, Strategy::PerPage);
    let config = paginator.config();

    let total_pages = probe_total_pages(paginator.client(), endpoint).await?;
    if total_pages == 0 {
        info!("No pages reported, nothing to fetch");
        return Ok(summary);
    }
    info!(
        total_pages,
        workers = config.workers,
        batch_size = config.batch_size,
        "Fetching pages"
    );

    let base_params = endpoint.params.clone();
    let page_label = endpoint.page_label.clone();
    let fetcher = Arc::new(PageFetcher::new(
        paginator.client().clone(),
        endpoint,
        &config.denylist,
    ));

    let workers = config.workers.max(1);
    let (tx, mut rx) = mpsc::channel::<PageResult>(config.batch_size.max(1));
    let producer = tokio::spawn(async move {
        let requests = (1..=total_pages)
            .map(move |page| PageRequest::new(&base_params, &page_label, page));
        let mut pages = stream::iter(requests)
            .map(|request| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.fetch(request).await }
            })
            .buffer_unordered(workers);

        while let Some(page) = pages.next().await {
            if tx.send(page).await.is_err() {
                break;
            }
        }
    });

    let mut accumulator = BatchAccumulator::new(config.batch_size, total_pages as usize);
    while let Some(page) = rx.recv().await {
        summary.pages_fetched += 1;
        summary.records_reported += page.reported_records;

        let Some(batch) = accumulator.push(page) else {
            continue;
        };
        if let Err(e) = commit(paginator.store(), endpoint, batch, &mut summary).await {
            if policy == FailurePolicy::Abort {
                producer.abort();
                return Err(e);
            }
        }
    }

    if let Some(batch) = accumulator.finish() {
        if let Err(e) = commit(paginator.store(), endpoint, batch, &mut summary).await {
            if policy == FailurePolicy::Abort {
                return Err(e);
            }
        }
    }

    producer
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))?;

    Ok(summary)
}

async fn commit<S: RecordSink>(
    store: &S,
    endpoint: &EndpointDescriptor,
    batch: Batch,
    summary: &mut RunSummary,
) -> Result<()> {
    let ordinal = batch.ordinal;
    let replace = batch.contains_first_page();
    let pages = batch.page_numbers();
    let failed_pages = batch.pages.iter().filter(|p| p.failed).count();
    let records = batch.into_records();

    match store
        .persist(ordinal, &endpoint.resource, &records, replace)
        .await
    {
        Ok(rows) => {
            summary.batches_committed += 1;
            summary.rows_written += rows;
            info!(
                batch = ordinal,
                ?pages,
                failed_pages,
                rows,
                replace,
                "Batch committed"
            );
            Ok(())
        },
        Err(e) => {
            summary.batches_failed += 1;
            error!(batch = ordinal, ?pages, replace, error = %e, "Failed to commit batch");
            Err(e)
        },
    }
}

/// Read the page count from a page-1 probe; missing counts as zero
pub async fn probe_total_pages(client: &ApiClient, endpoint: &EndpointDescriptor) -> Result<u32> {
    let probe = PageRequest::new(&endpoint.params, &endpoint.page_label, 1);
    let body = client
        .call(&endpoint.resource, &endpoint.action, &probe.params)
        .await?
        .into_json()?;

    let total = read_count(&body, &endpoint.total_of_pages_label).unwrap_or(0);
    Ok(u32::try_from(total).unwrap_or(u32::MAX))
}

/// Record mappings under `data_source`; anything that is not an object is dropped
pub fn extract_records(body: &Value, data_source: &str) -> Vec<Map<String, Value>> {
    match body.get(data_source) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        Some(Value::Object(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// Remove noisy fields before a record reaches the store
pub fn strip_denylisted(record: &mut Map<String, Value>, denylist: &[String]) {
    for field in denylist {
        record.remove(field);
    }
}

/// Non-negative integer field, accepting numeric strings
fn read_count(body: &Value, field: &str) -> Option<u64> {
    match body.get(field)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_request_owns_copy() {
        let base = json!({"registros_por_pagina": 50}).as_object().cloned().unwrap();
        let first = PageRequest::new(&base, "pagina", 1);
        let second = PageRequest::new(&base, "pagina", 2);

        assert_eq!(first.params["pagina"], json!(1));
        assert_eq!(second.params["pagina"], json!(2));
        assert!(!base.contains_key("pagina"));
    }

    #[test]
    fn test_strip_denylisted() {
        let mut record = json!({"codigo": 1, "tags": [], "homepage": "x", "nome": "A"})
            .as_object()
            .cloned()
            .unwrap();
        strip_denylisted(&mut record, &["tags".to_string(), "homepage".to_string()]);

        assert!(!record.contains_key("tags"));
        assert!(!record.contains_key("homepage"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_extract_records() {
        let body = json!({"clientes": [{"a": 1}, 7, {"a": 2}], "registros": 2});
        assert_eq!(extract_records(&body, "clientes").len(), 2);
        assert!(extract_records(&body, "missing").is_empty());
    }

    #[test]
    fn test_read_count() {
        let body = json!({"total_de_paginas": 4, "registros": "12", "bad": "x", "neg": -3});
        assert_eq!(read_count(&body, "total_de_paginas"), Some(4));
        assert_eq!(read_count(&body, "registros"), Some(12));
        assert_eq!(read_count(&body, "bad"), None);
        assert_eq!(read_count(&body, "neg"), Some(0));
        assert_eq!(read_count(&body, "missing"), None);
    }
}
