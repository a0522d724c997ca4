//! Graph strategy tests against a mock graph service

use std::time::Duration;

use beacon_retrieval::config::{GraphSetting, KeywordSetting, VectorSetting, Weights};
use beacon_retrieval::dispatch::StrategyStatus;
use beacon_retrieval::retry::RetryPolicy;
use beacon_retrieval::{
    KnowledgeRetrievalResult, RetrievalEngine, RetrievalReport, RetrieveConfig, SearchMethod,
    Settings,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::kbs;

fn settings(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings
        .graph
        .set_api_endpoint(&format!("{}/traverse", server.uri()))
        .unwrap();
    settings
        .graph
        .set_api_key(Some(SecretString::from("graph-key".to_string())));
    settings.graph.set_relation_types(["cites"]);
    settings.engine.retry = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    };
    settings
}

fn graph_config(max_depth: u32, retries: u32) -> RetrieveConfig {
    let graph = GraphSetting::new(0.4, max_depth, false)
        .unwrap()
        .with_timeout(2.0)
        .unwrap()
        .with_retry_count(retries);
    RetrieveConfig::builder()
        .search_method(SearchMethod::Graph)
        .top_k(10)
        .weights(Weights::new(
            VectorSetting::new(0.6, "", "").unwrap(),
            KeywordSetting::new(0.4).unwrap(),
            graph,
        ))
        .build()
        .unwrap()
}

fn nodes() -> Value {
    json!({
        "nodes": [
            {
                "id": "n1",
                "fragment_id": "f1",
                "knowledge_base_code": "kb",
                "content": "Ownership rules",
                "score": 0.9,
                "labels": ["Document"],
                "depth": 0,
                "properties": { "title": "Ownership" }
            },
            {
                "id": "n2",
                "content": "Borrowing",
                "score": 0.5,
                "labels": ["Concept"],
                "relation": "cites",
                "depth": 1
            },
            {
                "id": "n3",
                "content": "Lifetimes",
                "score": 0.4,
                "labels": ["Concept"],
                "relation": "cites",
                "depth": 2
            },
            {
                "id": "n4",
                "content": "Traits",
                "score": 0.7,
                "labels": ["Concept"],
                "relation": "mentions",
                "depth": 1
            }
        ]
    })
}

fn ids(results: &[KnowledgeRetrievalResult]) -> Vec<&str> {
    results.iter().map(KnowledgeRetrievalResult::id).collect()
}

async fn run(server: &MockServer, config: &RetrieveConfig) -> RetrievalReport {
    RetrievalEngine::builder()
        .http_services(&settings(server))
        .build()
        .retrieve_detailed("ownership", &kbs(&["kb"]), config, &CancellationToken::new())
        .await
        .unwrap()
}

fn graph_status(report: &RetrievalReport) -> &StrategyStatus {
    &report.runs[0].status
}

#[tokio::test]
async fn traversal_request_carries_filters_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/traverse"))
        .and(header("authorization", "Bearer graph-key"))
        .and(body_partial_json(json!({
            "query": "ownership",
            "knowledge_base_codes": ["kb"],
            "relation_types": ["cites"],
            "node_types": [],
            "max_depth": 1,
            "limit": 20,
            "include_properties": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(nodes()))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, &graph_config(1, 0)).await;

    // n3 is too deep and n4 arrived through a filtered relation
    assert_eq!(ids(&report.results), ["f1", "n2"]);
    assert_eq!(graph_status(&report), &StrategyStatus::Completed(2));

    let seed = &report.results[0];
    assert_eq!(seed.content(), "Ownership rules");
    assert_eq!(seed.metadata()["node_id"], json!("n1"));
    assert_eq!(seed.metadata()["depth"], json!(0));
    assert!(seed.metadata().get("properties").is_none());
    assert_eq!(report.results[1].metadata()["relation"], json!("cites"));
}

#[tokio::test]
async fn deeper_traversal_keeps_more_hops() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "max_depth": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(nodes()))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, &graph_config(2, 0)).await;
    assert_eq!(ids(&report.results), ["f1", "n2", "n3"]);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nodes()))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, &graph_config(1, 1)).await;
    assert_eq!(ids(&report.results), ["f1", "n2"]);
    assert!(!report.is_degraded());
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown knowledge base"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, &graph_config(1, 3)).await;
    assert!(report.results.is_empty());
    match graph_status(&report) {
        StrategyStatus::Failed(reason) => assert!(reason.contains("400"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_payload_degrades_to_no_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let report = run(&server, &graph_config(1, 0)).await;
    assert!(report.results.is_empty());
    assert!(report.is_degraded());
}
