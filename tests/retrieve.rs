//! End-to-end retrieval tests against in-process backends

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use beacon_retrieval::config::{
    GraphSearchConfig, GraphSetting, KeywordSetting, RerankingMode, RerankingModelConfig,
    VectorSetting, Weights,
};
use beacon_retrieval::dispatch::StrategyStatus;
use beacon_retrieval::{
    Error, KnowledgeRetrievalResult, RetrievalEngine, RetrievalType, RetrieveConfig, SearchMethod,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

mod common;
use common::{
    FailingText, FixedReranker, StalledVectors, StaticGraph, StaticText, StaticVectors, fast_settings,
    fragments, graph_node, kbs,
};

fn weights(vector: f64, keyword: f64, graph: GraphSetting) -> Weights {
    Weights::new(
        VectorSetting::new(vector, "embed-small", "local").unwrap(),
        KeywordSetting::new(keyword).unwrap(),
        graph,
    )
}

fn no_graph() -> GraphSetting {
    GraphSetting::new(0.0, 2, true).unwrap()
}

fn ids(results: &[KnowledgeRetrievalResult]) -> Vec<&str> {
    results.iter().map(KnowledgeRetrievalResult::id).collect()
}

fn assert_scores(results: &[KnowledgeRetrievalResult], expected: &[f64]) {
    assert_eq!(results.len(), expected.len());
    for (result, want) in results.iter().zip(expected) {
        assert!(
            (result.score() - want).abs() < 1e-9,
            "{} scored {}, expected {want}",
            result.id(),
            result.score()
        );
    }
}

#[tokio::test]
async fn weighted_fusion_normalizes_single_strategy_pool() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[
            ("f1", 0.9),
            ("f2", 0.7),
            ("f3", 0.5),
            ("f4", 0.3),
            ("f5", 0.1),
        ]))))
        .full_text(Arc::new(StaticText(Vec::new())))
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .top_k(3)
        .reranking_mode(RerankingMode::WeightedScore)
        .weights(weights(1.0, 0.0, no_graph()))
        .build()
        .unwrap();

    let results = engine.retrieve("rust ownership", &kbs(&["kb"]), &config).await.unwrap();

    assert_eq!(ids(&results), ["f1", "f2", "f3"]);
    assert_scores(&results, &[1.0, 0.75, 0.5]);
    assert!(results.iter().all(|r| r.retrieval_type() == RetrievalType::Semantic));
}

#[tokio::test]
async fn rerank_top_n_caps_below_top_k() {
    let mut reranking = RerankingModelConfig::default();
    reranking.set_top_n(2).unwrap();

    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[
            ("a", 0.9),
            ("b", 0.8),
            ("c", 0.7),
            ("d", 0.6),
        ]))))
        .reranker(Arc::new(FixedReranker::new(&[
            ("a", 0.1),
            ("b", 0.9),
            ("c", 0.4),
            ("d", 0.8),
        ])))
        .reranking_config(reranking)
        .build();

    let config = RetrieveConfig::builder()
        .top_k(5)
        .reranking_mode(RerankingMode::RerankingModel)
        .build()
        .unwrap();

    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(ids(&results), ["b", "d"]);
    assert_eq!(results[0].metadata()["rerank_fallback"], json!(false));
}

#[tokio::test]
async fn rerank_top_k_caps_below_top_n() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[
            ("a", 0.9),
            ("b", 0.8),
            ("c", 0.7),
            ("d", 0.6),
        ]))))
        .reranker(Arc::new(FixedReranker::new(&[("a", 0.5), ("b", 0.6), ("c", 0.7)])))
        .build();

    let config = RetrieveConfig::builder()
        .top_k(3)
        .reranking_mode(RerankingMode::RerankingModel)
        .build()
        .unwrap();

    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(ids(&results), ["c", "b", "a"]);

    // d was not scored by the model and fell back to its normalized native score
    let engine_fallback = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[("d", 0.6), ("e", 0.2)]))))
        .reranker(Arc::new(FixedReranker::new(&[("e", 0.3)])))
        .build();
    let results = engine_fallback
        .retrieve("q", &kbs(&["kb"]), &config)
        .await
        .unwrap();
    assert_eq!(ids(&results), ["d", "e"]);
    assert_eq!(results[0].metadata()["rerank_fallback"], json!(true));
    assert_scores(&results, &[1.0, 0.3]);
}

#[tokio::test]
async fn timed_out_graph_does_not_change_hybrid_results() {
    let graph_setting = GraphSetting::new(0.5, 2, true)
        .unwrap()
        .with_timeout(0.05)
        .unwrap()
        .with_retry_count(0);
    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .top_k(10)
        .reranking_mode(RerankingMode::WeightedScore)
        .weights(weights(0.7, 0.3, graph_setting))
        .build()
        .unwrap();

    let semantic = fragments(&[("a", 0.9), ("b", 0.4), ("c", 0.2)]);
    let text = fragments(&[("b", 11.0), ("d", 3.0)]);

    let with_dead_graph = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(semantic.clone())))
        .full_text(Arc::new(StaticText(text.clone())))
        .graph(
            Arc::new(StaticGraph {
                nodes: vec![graph_node("a", 1.0)],
                delay: Duration::from_secs(5),
            }),
            GraphSearchConfig::default(),
        )
        .build();
    let without_graph = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(semantic)))
        .full_text(Arc::new(StaticText(text)))
        .build();

    let cancel = CancellationToken::new();
    let degraded = with_dead_graph
        .retrieve_detailed("q", &kbs(&["kb"]), &config, &cancel)
        .await
        .unwrap();
    let baseline = without_graph
        .retrieve("q", &kbs(&["kb"]), &config)
        .await
        .unwrap();

    assert_eq!(degraded.results, baseline);
    assert!(degraded.is_degraded());
    let graph_run = degraded
        .runs
        .iter()
        .find(|r| r.kind == RetrievalType::Graph)
        .unwrap();
    assert_eq!(graph_run.status, StrategyStatus::TimedOut);
    assert!(graph_run.elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn failed_strategy_is_retried_then_skipped() {
    let text = Arc::new(FailingText::default());
    let mut settings = fast_settings();
    settings.backend_retry_count = 2;

    let engine = RetrievalEngine::builder()
        .settings(settings)
        .semantic(Arc::new(StaticVectors(fragments(&[("a", 0.8), ("b", 0.3)]))))
        .full_text(text.clone())
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .reranking_mode(RerankingMode::WeightedScore)
        .weights(weights(0.5, 0.5, no_graph()))
        .build()
        .unwrap();

    let report = engine
        .retrieve_detailed("q", &kbs(&["kb"]), &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(text.calls.load(Ordering::SeqCst), 3);
    assert_eq!(ids(&report.results), ["a", "b"]);
    assert!(report.runs.iter().any(|r| matches!(r.status, StrategyStatus::Failed(_))));
}

#[tokio::test]
async fn fragments_found_twice_are_returned_once() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[("shared", 0.9), ("a", 0.5)]))))
        .full_text(Arc::new(StaticText(fragments(&[("shared", 4.0), ("b", 2.0)]))))
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .top_k(10)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();

    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(results.len(), 3);
    let shared: Vec<_> = results.iter().filter(|r| r.id() == "shared").collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].retrieval_type(), RetrievalType::Semantic);
    assert_eq!(shared[0].metadata()["strategies"], json!(["semantic", "full_text"]));
    assert_eq!(shared[0].metadata()["strategy_scores"]["full_text"], json!(4.0));
    assert_eq!(shared[0].metadata()["knowledge_base_code"], json!("kb"));
}

#[tokio::test]
async fn graph_nodes_merge_with_their_fragments() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[("a", 0.9), ("b", 0.2)]))))
        .full_text(Arc::new(StaticText(Vec::new())))
        .graph(
            Arc::new(StaticGraph {
                nodes: vec![graph_node("b", 0.7)],
                delay: Duration::ZERO,
            }),
            GraphSearchConfig::default(),
        )
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .reranking_mode(RerankingMode::WeightedScore)
        .weights(weights(0.5, 0.5, GraphSetting::new(0.5, 1, false).unwrap()))
        .build()
        .unwrap();

    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    let b = results.iter().find(|r| r.id() == "b").unwrap();
    assert_eq!(b.retrieval_type(), RetrievalType::Graph);
    assert_eq!(b.metadata()["node_id"], json!("node-b"));
    // b: (0.5 * 0.0 semantic + 0.5 * 1.0 graph) / 1.0
    assert!((b.score() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn threshold_and_top_k_bound_results() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[
            ("a", 1.0),
            ("b", 0.8),
            ("c", 0.6),
            ("d", 0.4),
            ("e", 0.2),
            ("f", 0.0),
        ]))))
        .build();

    let config = RetrieveConfig::builder()
        .top_k(4)
        .score_threshold(0.5)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();
    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(ids(&results), ["a", "b", "c"]);
    assert!(results.iter().all(|r| r.score() >= 0.5));

    let loose = RetrieveConfig::builder()
        .top_k(4)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();
    let results = engine.retrieve("q", &kbs(&["kb"]), &loose).await.unwrap();
    assert_eq!(results.len(), 4);
}

#[tokio::test]
async fn disabled_reranking_orders_by_native_score() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[("a", 0.9), ("c", 0.1)]))))
        .full_text(Arc::new(StaticText(fragments(&[("b", 12.0), ("a", 0.5)]))))
        .build();

    let mut config = RetrieveConfig::default();
    config.set_search_method(SearchMethod::Hybrid);
    config.set_top_k(10).unwrap();

    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(ids(&results), ["b", "a", "c"]);
    assert_scores(&results, &[12.0, 0.9, 0.1]);
}

#[tokio::test]
async fn repeated_queries_are_identical() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StaticVectors(fragments(&[
            ("x", 0.5),
            ("y", 0.5),
            ("z", 0.5),
        ]))))
        .full_text(Arc::new(StaticText(fragments(&[("w", 1.0), ("y", 1.0)]))))
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Hybrid)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();

    let first = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    let second = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(first, second);
    // Every fused score is 1.0: ties fall back to type priority, then id
    assert_eq!(ids(&first), ["x", "y", "z", "w"]);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_strategies() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .semantic(Arc::new(StalledVectors))
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = engine
        .retrieve_with_cancel("q", &kbs(&["kb"]), &RetrieveConfig::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn malformed_knowledge_bases_fail_before_dispatch() {
    let text = Arc::new(FailingText::default());
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .full_text(text.clone())
        .build();

    let mut config = RetrieveConfig::default();
    config.set_search_method(SearchMethod::FullText);

    let err = engine
        .retrieve("q", &kbs(&["kb one"]), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKnowledgeBases(_)));
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn graph_search_on_default_weights_ranks_by_node_score() {
    let engine = RetrievalEngine::builder()
        .settings(fast_settings())
        .graph(
            Arc::new(StaticGraph {
                nodes: vec![
                    graph_node("zz-best", 0.95),
                    graph_node("aa-worst", 0.05),
                    graph_node("mm-mid", 0.5),
                ],
                delay: Duration::ZERO,
            }),
            GraphSearchConfig::default(),
        )
        .build();

    let config = RetrieveConfig::builder()
        .search_method(SearchMethod::Graph)
        .top_k(2)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();
    let results = engine.retrieve("q", &kbs(&["kb"]), &config).await.unwrap();
    assert_eq!(ids(&results), ["zz-best", "mm-mid"]);
    assert!((results[0].score() - 1.0).abs() < 1e-9);

    let filtered = RetrieveConfig::builder()
        .search_method(SearchMethod::Graph)
        .top_k(2)
        .score_threshold(0.1)
        .reranking_mode(RerankingMode::WeightedScore)
        .build()
        .unwrap();
    let results = engine.retrieve("q", &kbs(&["kb"]), &filtered).await.unwrap();
    assert_eq!(ids(&results), ["zz-best", "mm-mid"]);
}
