//! Graph relationship retrieval
//!
//! The strategy asks a [`GraphStore`] for nodes related to the query, then
//! enforces the traversal bounds itself so a misbehaving service cannot
//! widen the result set.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{AttemptBudget, GraphStore, Strategy};
use crate::config::{EngineSettings, GraphSearchConfig, RetrieveConfig};
use crate::error::ConfigError;
use crate::result::{GraphNode, KnowledgeRetrievalResult, RetrievalType};
use crate::retry;
use crate::{Error, Result};

/// Strategy backed by a graph store
pub struct GraphStrategy {
    store: Arc<dyn GraphStore>,
    base: GraphSearchConfig,
}

impl GraphStrategy {
    /// `base` supplies endpoint, key, type filters and limit; traversal
    /// fields are overlaid per query from `weights.graph_setting`
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, base: GraphSearchConfig) -> Self {
        Self { store, base }
    }

    fn effective_config(&self, config: &RetrieveConfig) -> GraphSearchConfig {
        self.base.with_setting(&config.weights().graph_setting)
    }
}

#[async_trait]
impl Strategy for GraphStrategy {
    fn kind(&self) -> RetrievalType {
        RetrievalType::Graph
    }

    async fn retrieve(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
    ) -> Result<Vec<KnowledgeRetrievalResult>> {
        let effective = self.effective_config(config);
        let nodes = self.store.traverse(query, knowledge_bases, &effective).await?;
        let returned = nodes.len();
        let results = shape(nodes, &effective);

        tracing::debug!(
            returned,
            kept = results.len(),
            max_depth = effective.max_depth(),
            "graph traversal complete"
        );
        Ok(results)
    }

    fn attempt_budget(&self, config: &RetrieveConfig, _settings: &EngineSettings) -> AttemptBudget {
        let effective = self.effective_config(config);
        AttemptBudget {
            timeout: effective.timeout_duration(),
            retries: effective.retry_count(),
        }
    }
}

/// Drop nodes outside the configured bounds and cap at `limit`
fn shape(nodes: Vec<GraphNode>, config: &GraphSearchConfig) -> Vec<KnowledgeRetrievalResult> {
    let limit = usize::try_from(config.limit()).unwrap_or(usize::MAX);
    nodes
        .into_iter()
        .filter(|node| admits(config, node))
        .take(limit)
        .map(|node| KnowledgeRetrievalResult::from_graph_data(node, config.include_properties()))
        .collect()
}

fn admits(config: &GraphSearchConfig, node: &GraphNode) -> bool {
    if node.depth > config.max_depth() {
        return false;
    }

    // Seeds have no relation and always pass the relation filter
    let relation_ok = config.relation_types().is_empty()
        || node
            .relation
            .as_ref()
            .is_none_or(|r| config.relation_types().contains(r));

    let node_ok = config.node_types().is_empty()
        || node.labels.iter().any(|l| config.node_types().contains(l));

    relation_ok && node_ok
}

/// Traversal request sent to the graph service
#[derive(Debug, Serialize)]
struct TraverseRequest<'a> {
    query: &'a str,
    knowledge_base_codes: &'a BTreeSet<String>,
    relation_types: &'a BTreeSet<String>,
    node_types: &'a BTreeSet<String>,
    max_depth: u32,
    limit: u32,
    include_properties: bool,
}

#[derive(Debug, Deserialize)]
struct TraverseResponse {
    #[serde(default)]
    nodes: Vec<GraphNode>,
}

/// HTTP client for the graph service
#[derive(Debug, Clone, Default)]
pub struct GraphServiceClient {
    client: reqwest::Client,
}

impl GraphServiceClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, pooling)
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GraphStore for GraphServiceClient {
    async fn traverse(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &GraphSearchConfig,
    ) -> Result<Vec<GraphNode>> {
        let endpoint = config
            .api_endpoint()
            .ok_or_else(|| ConfigError::missing("graph.api_endpoint"))?;

        let body = TraverseRequest {
            query,
            knowledge_base_codes: knowledge_bases,
            relation_types: config.relation_types(),
            node_types: config.node_types(),
            max_depth: config.max_depth(),
            limit: config.limit(),
            include_properties: config.include_properties(),
        };

        let mut request = self.client.post(endpoint.as_str()).json(&body);
        if let Some(key) = config.api_key() {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = retry::ensure_success("graph", request.send().await?).await?;
        let bytes = response.bytes().await?;
        let parsed: TraverseResponse =
            serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse {
                service: "graph",
                reason: e.to_string(),
            })?;

        Ok(parsed.nodes)
    }
}
