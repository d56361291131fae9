//! Pagination engine tests
//!
//! Runs both strategies end to end against a mock API and an in-memory sink:
//! - page counts and the single replacing batch
//! - denylisted fields never reaching the sink
//! - failure policies
//! - month windows expanded per dependency value with one run-wide ordinal

mod common;

use apiload_ingest::{
    ApiClient, EndpointDescriptor, FailurePolicy, IngestError, Paginator,
};
use chrono::NaiveDate;
use common::{api_config, ingest_config, MemorySink};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const CLIENTES: &str = "/api/v1/geral/clientes/";
const EXTRATO: &str = "/api/v1/financas/extrato/";

fn clientes_endpoint() -> EndpointDescriptor {
    let mut endpoint = EndpointDescriptor::new(CLIENTES, "ListarClientes", "clientes_cadastro");
    endpoint.params = json!({"registros_por_pagina": 2}).as_object().cloned().unwrap();
    endpoint
}

fn extrato_endpoint() -> EndpointDescriptor {
    let mut endpoint = EndpointDescriptor::new(EXTRATO, "ListarExtrato", "listaMovimentos");
    endpoint.pagination_type = "date_range".to_string();
    endpoint
}

fn page_body(page: u32, total: u32) -> Value {
    json!({
        "pagina": page,
        "total_de_paginas": total,
        "registros": 2,
        "clientes_cadastro": [
            {"codigo": page * 10 + 1, "nome": format!("Cliente {}", page), "tags": [{"tag": "vip"}]},
            {"codigo": page * 10 + 2, "nome": "Outro", "homepage": "https://example.com"}
        ]
    })
}

/// One mock per page; page 1 is also hit by the probe
async fn mount_pages(server: &MockServer, total: u32) {
    for page in 1..=total {
        Mock::given(method("POST"))
            .and(path(CLIENTES))
            .and(query_param("pagina", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(page, total)))
            .expect(if page == 1 { 2 } else { 1 })
            .mount(server)
            .await;
    }
}

fn paginator(
    server: &MockServer,
    sink: MemorySink,
    workers: usize,
    batch_size: usize,
) -> Paginator<MemorySink> {
    let client = ApiClient::new(&api_config(&server.uri())).unwrap();
    Paginator::new(client, sink, ingest_config(workers, batch_size))
        .with_today(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
}

fn codigo(record: &Value) -> u64 {
    record["codigo"].as_u64().unwrap()
}

// ============================================================================
// Per-page strategy
// ============================================================================

#[tokio::test]
async fn test_zero_pages_only_probes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CLIENTES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagina": 1, "total_de_paginas": 0, "registros": 0, "clientes_cadastro": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let summary = paginator.run(&clientes_endpoint()).await.unwrap();

    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.batches_committed, 0);
    assert!(paginator.store().calls().is_empty());
}

#[tokio::test]
async fn test_pages_are_batched_with_one_replace() {
    let mock_server = MockServer::start().await;
    mount_pages(&mock_server, 7).await;

    let paginator = paginator(&mock_server, MemorySink::new(), 3, 3);
    let summary = paginator.run(&clientes_endpoint()).await.unwrap();

    assert_eq!(summary.pages_fetched, 7);
    assert_eq!(summary.records_reported, 14);
    assert_eq!(summary.batches_committed, 3);
    assert_eq!(summary.rows_written, 14);
    assert!(summary.is_clean());

    let calls = paginator.store().calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls.iter().map(|c| c.ordinal).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(calls.iter().all(|c| c.resource == CLIENTES));

    let replacing: Vec<_> = calls.iter().filter(|c| c.replace).collect();
    assert_eq!(replacing.len(), 1);
    assert!(replacing[0].records.iter().any(|r| codigo(r) == 11));

    let mut codigos: Vec<u64> = paginator.store().records().iter().map(codigo).collect();
    codigos.sort_unstable();
    let expected: Vec<u64> = (1..=7u64).flat_map(|p| [p * 10 + 1, p * 10 + 2]).collect();
    assert_eq!(codigos, expected);
}

#[tokio::test]
async fn test_batch_without_first_page_appends_before_replace() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CLIENTES))
        .and(query_param("pagina", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(1, 2))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(CLIENTES))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(2, 2)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let paginator = paginator(&mock_server, MemorySink::new(), 2, 1);
    let summary = paginator.run(&clientes_endpoint()).await.unwrap();
    assert_eq!(summary.batches_committed, 2);

    // page 2 lands first and appends; the later page-1 batch replaces the table
    let calls = paginator.store().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].ordinal, calls[0].replace), (1, false));
    assert_eq!(codigo(&calls[0].records[0]), 21);
    assert_eq!((calls[1].ordinal, calls[1].replace), (2, true));
    assert_eq!(codigo(&calls[1].records[0]), 11);
}

#[tokio::test]
async fn test_denylisted_fields_never_persisted() {
    let mock_server = MockServer::start().await;
    mount_pages(&mock_server, 2).await;

    let paginator = paginator(&mock_server, MemorySink::new(), 2, 10);
    paginator.run(&clientes_endpoint()).await.unwrap();

    let records = paginator.store().records();
    assert_eq!(records.len(), 4);
    for record in &records {
        assert!(record.get("tags").is_none());
        assert!(record.get("homepage").is_none());
        assert!(record.get("nome").is_some());
    }
}

#[tokio::test]
async fn test_failed_page_becomes_empty() {
    let mock_server = MockServer::start().await;

    for page in 1..=2 {
        Mock::given(method("POST"))
            .and(path(CLIENTES))
            .and(query_param("pagina", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(page, 3)))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(CLIENTES))
        .and(query_param("pagina", "3"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&mock_server)
        .await;

    let paginator = paginator(&mock_server, MemorySink::new(), 3, 10);
    let summary = paginator.run(&clientes_endpoint()).await.unwrap();

    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.batches_committed, 1);
    assert_eq!(paginator.store().records().len(), 4);
}

#[tokio::test]
async fn test_probe_failure_aborts_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CLIENTES))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let result = paginator.run(&clientes_endpoint()).await;

    assert!(matches!(
        result,
        Err(IngestError::RequestFailed { status: 400, .. })
    ));
    assert!(paginator.store().calls().is_empty());
}

#[tokio::test]
async fn test_per_page_continues_past_failed_batch() {
    let mock_server = MockServer::start().await;
    mount_pages(&mock_server, 4).await;

    let sink = MemorySink::new().failing_on(&[1]);
    let paginator = paginator(&mock_server, sink, 1, 2);
    let summary = paginator.run(&clientes_endpoint()).await.unwrap();

    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.batches_committed, 1);
    assert!(!summary.is_clean());

    let calls = paginator.store().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ordinal, 2);
}

#[tokio::test]
async fn test_per_page_abort_policy_stops_run() {
    let mock_server = MockServer::start().await;
    mount_pages(&mock_server, 2).await;

    let mut endpoint = clientes_endpoint();
    endpoint.failure_policy = Some(FailurePolicy::Abort);

    let sink = MemorySink::new().failing_on(&[1]);
    let paginator = paginator(&mock_server, sink, 2, 10);
    let result = paginator.run(&endpoint).await;

    assert!(matches!(result, Err(IngestError::Worker(_))));
    assert!(paginator.store().calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_strategy_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut endpoint = clientes_endpoint();
    endpoint.pagination_type = "cursor".to_string();

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let result = paginator.run(&endpoint).await;

    assert!(matches!(result, Err(IngestError::UnsupportedStrategy(tag)) if tag == "cursor"));
}

// ============================================================================
// Date-range strategy
// ============================================================================

fn extrato_body() -> Value {
    json!({
        "nCodCC": 11,
        "listaMovimentos": [{"nValorDocumento": "10.00", "cDesCliente": "A"}]
    })
}

#[tokio::test]
async fn test_date_range_expands_dependency_values() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXTRATO))
        .respond_with(ResponseTemplate::new(200).set_body_json(extrato_body()))
        .expect(6)
        .mount(&mock_server)
        .await;

    let mut endpoint = extrato_endpoint();
    endpoint.depends_on = Some("contacorrente".to_string());

    let sink = MemorySink::new().with_distinct_values(vec![json!(11), json!(22)]);
    let paginator = paginator(&mock_server, sink, 5, 10);
    let summary = paginator.run(&endpoint).await.unwrap();

    assert_eq!(summary.pages_fetched, 6);
    assert_eq!(summary.batches_committed, 6);

    let calls = paginator.store().calls();
    assert_eq!(
        calls.iter().map(|c| c.ordinal).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );
    assert_eq!(
        calls.iter().map(|c| c.replace).collect::<Vec<_>>(),
        vec![true, false, false, false, false, false]
    );
    assert!(calls.iter().all(|c| c.records == vec![extrato_body()]));

    let requests = mock_server.received_requests().await.unwrap();
    let sent: Vec<(Value, Value, Value)> = requests
        .iter()
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let param = body["param"][0].clone();
            (
                param["nCodCC"].clone(),
                param["dPeriodoInicial"].clone(),
                param["dPeriodoFinal"].clone(),
            )
        })
        .collect();

    assert_eq!(
        sent,
        vec![
            (json!(11), json!("01/01/2025"), json!("31/01/2025")),
            (json!(11), json!("01/02/2025"), json!("28/02/2025")),
            (json!(11), json!("01/03/2025"), json!("31/03/2025")),
            (json!(22), json!("01/01/2025"), json!("31/01/2025")),
            (json!(22), json!("01/02/2025"), json!("28/02/2025")),
            (json!(22), json!("01/03/2025"), json!("31/03/2025")),
        ]
    );
}

#[tokio::test]
async fn test_date_range_without_dependency_values_fetches_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(extrato_body()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut endpoint = extrato_endpoint();
    endpoint.depends_on = Some("contacorrente".to_string());

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let summary = paginator.run(&endpoint).await.unwrap();

    assert_eq!(summary.pages_fetched, 0);
    assert!(paginator.store().calls().is_empty());
}

async fn mount_failing_february(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(EXTRATO))
        .and(query_param("dPeriodoInicial", "01/02/2025"))
        .respond_with(ResponseTemplate::new(400).set_body_string("periodo invalido"))
        .with_priority(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_date_range_aborts_on_first_failure() {
    let mock_server = MockServer::start().await;
    mount_failing_february(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(EXTRATO))
        .respond_with(ResponseTemplate::new(200).set_body_json(extrato_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let result = paginator.run(&extrato_endpoint()).await;

    assert!(matches!(
        result,
        Err(IngestError::RequestFailed { status: 400, .. })
    ));
    let calls = paginator.store().calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].replace);
}

#[tokio::test]
async fn test_date_range_continue_keeps_ordinals() {
    let mock_server = MockServer::start().await;
    mount_failing_february(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(EXTRATO))
        .respond_with(ResponseTemplate::new(200).set_body_json(extrato_body()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut endpoint = extrato_endpoint();
    endpoint.failure_policy = Some(FailurePolicy::Continue);

    let paginator = paginator(&mock_server, MemorySink::new(), 5, 10);
    let summary = paginator.run(&endpoint).await.unwrap();

    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.batches_committed, 2);

    let calls = paginator.store().calls();
    assert_eq!(calls.iter().map(|c| c.ordinal).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(calls.iter().map(|c| c.replace).collect::<Vec<_>>(), vec![true, false]);
}

#[tokio::test]
async fn test_date_range_replace_moves_to_first_successful_window() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXTRATO))
        .respond_with(ResponseTemplate::new(200).set_body_json(extrato_body()))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut endpoint = extrato_endpoint();
    endpoint.failure_policy = Some(FailurePolicy::Continue);

    let sink = MemorySink::new().failing_on(&[1]);
    let paginator = paginator(&mock_server, sink, 5, 10);
    let summary = paginator.run(&endpoint).await.unwrap();

    assert_eq!(summary.batches_failed, 1);
    let calls = paginator.store().calls();
    assert_eq!(calls.iter().map(|c| c.ordinal).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(calls.iter().map(|c| c.replace).collect::<Vec<_>>(), vec![true, false]);
}
