//! Shared test utilities
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_retrieval::config::{EngineSettings, GraphSearchConfig, RerankingModelConfig, VectorSetting};
use beacon_retrieval::rerank::{RerankCandidate, RerankScore, Reranker};
use beacon_retrieval::result::{GraphNode, ScoredFragment};
use beacon_retrieval::retry::RetryPolicy;
use beacon_retrieval::strategy::{GraphStore, TextSearch, VectorSearch};
use beacon_retrieval::{Error, Result};
use serde_json::Map;
use tokio_util::sync::CancellationToken;

/// Build a knowledge base code set
pub fn kbs(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|c| (*c).to_string()).collect()
}

/// Build a backend fragment in knowledge base `kb`
pub fn fragment(id: &str, score: f64) -> ScoredFragment {
    ScoredFragment {
        id: id.to_string(),
        knowledge_base_code: "kb".to_string(),
        business_id: format!("biz-{id}"),
        content: format!("content of {id}"),
        score,
        metadata: Map::new(),
    }
}

pub fn fragments(scored: &[(&str, f64)]) -> Vec<ScoredFragment> {
    scored.iter().map(|(id, s)| fragment(id, *s)).collect()
}

/// Build a seed graph node extracted from fragment `id`
pub fn graph_node(id: &str, score: f64) -> GraphNode {
    GraphNode {
        id: format!("node-{id}"),
        fragment_id: Some(id.to_string()),
        knowledge_base_code: Some("kb".to_string()),
        business_id: String::new(),
        content: format!("content of {id}"),
        score,
        labels: vec!["Document".to_string()],
        relation: None,
        depth: 0,
        properties: Map::new(),
    }
}

/// Engine settings with short timeouts and no backend retries
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        backend_timeout: Duration::from_millis(500),
        backend_retry_count: 0,
        retry: RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..EngineSettings::default()
    }
}

/// Vector backend returning a fixed list
pub struct StaticVectors(pub Vec<ScoredFragment>);

#[async_trait]
impl VectorSearch for StaticVectors {
    async fn search(
        &self,
        _query: &str,
        _knowledge_bases: &BTreeSet<String>,
        _setting: &VectorSetting,
    ) -> Result<Vec<ScoredFragment>> {
        Ok(self.0.clone())
    }
}

/// Full-text backend returning a fixed list
pub struct StaticText(pub Vec<ScoredFragment>);

#[async_trait]
impl TextSearch for StaticText {
    async fn search(
        &self,
        _query: &str,
        _knowledge_bases: &BTreeSet<String>,
    ) -> Result<Vec<ScoredFragment>> {
        Ok(self.0.clone())
    }
}

/// Full-text backend that always fails and counts its calls
#[derive(Default)]
pub struct FailingText {
    pub calls: AtomicU32,
}

#[async_trait]
impl TextSearch for FailingText {
    async fn search(
        &self,
        _query: &str,
        _knowledge_bases: &BTreeSet<String>,
    ) -> Result<Vec<ScoredFragment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Backend {
            backend: "full_text",
            reason: "index unavailable".to_string(),
        })
    }
}

/// Vector backend that never answers in time
pub struct StalledVectors;

#[async_trait]
impl VectorSearch for StalledVectors {
    async fn search(
        &self,
        _query: &str,
        _knowledge_bases: &BTreeSet<String>,
        _setting: &VectorSetting,
    ) -> Result<Vec<ScoredFragment>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Graph store returning fixed nodes after an optional delay
pub struct StaticGraph {
    pub nodes: Vec<GraphNode>,
    pub delay: Duration,
}

#[async_trait]
impl GraphStore for StaticGraph {
    async fn traverse(
        &self,
        _query: &str,
        _knowledge_bases: &BTreeSet<String>,
        _config: &GraphSearchConfig,
    ) -> Result<Vec<GraphNode>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.nodes.clone())
    }
}

/// Reranker with a fixed score per fragment id; unknown ids fall back
pub struct FixedReranker(pub HashMap<String, f64>);

impl FixedReranker {
    pub fn new(scores: &[(&str, f64)]) -> Self {
        Self(
            scores
                .iter()
                .map(|(id, s)| ((*id).to_string(), *s))
                .collect(),
        )
    }
}

#[async_trait]
impl Reranker for FixedReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: &[RerankCandidate],
        _config: &RerankingModelConfig,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RerankScore>> {
        Ok(candidates
            .iter()
            .map(|c| match self.0.get(&c.id) {
                Some(&score) => RerankScore {
                    id: c.id.clone(),
                    score,
                    fallback: false,
                },
                None => RerankScore::fallback_for(c),
            })
            .collect())
    }
}
