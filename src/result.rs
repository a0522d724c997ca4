//! Retrieval result types shared by strategy adapters and fusion

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata keys written by adapters and fusion
pub mod metadata_keys {
    /// Knowledge base the fragment belongs to
    pub const KNOWLEDGE_BASE_CODE: &str = "knowledge_base_code";
    /// Strategy names that found the fragment, highest priority first
    pub const STRATEGIES: &str = "strategies";
    /// Pre-fusion score of the kept candidate
    pub const NATIVE_SCORE: &str = "native_score";
    /// Native score per contributing strategy
    pub const STRATEGY_SCORES: &str = "strategy_scores";
    /// Whether the reranker fell back to the normalized native score
    pub const RERANK_FALLBACK: &str = "rerank_fallback";
    /// Graph node identity
    pub const NODE_ID: &str = "node_id";
    /// Graph node labels
    pub const NODE_LABELS: &str = "node_labels";
    /// Relation type the node was reached through
    pub const RELATION: &str = "relation";
    /// Hops from the nearest seed node
    pub const DEPTH: &str = "depth";
    /// Graph node properties (only when requested)
    pub const PROPERTIES: &str = "properties";
}

/// Provenance of a retrieval result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalType {
    Semantic,
    FullText,
    Graph,
    Hybrid,
}

impl RetrievalType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::FullText => "full_text",
            Self::Graph => "graph",
            Self::Hybrid => "hybrid",
        }
    }

    /// Tie-break rank when fused scores are equal (higher wins)
    ///
    /// Graph > Semantic > FullText > Hybrid
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Graph => 3,
            Self::Semantic => 2,
            Self::FullText => 1,
            Self::Hybrid => 0,
        }
    }
}

impl fmt::Display for RetrievalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate fragment as returned by a semantic or full-text backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    /// Fragment identity, unique across knowledge bases
    pub id: String,
    pub knowledge_base_code: String,
    #[serde(default)]
    pub business_id: String,
    pub content: String,
    /// Backend-native score (cosine, BM25, ...)
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Node returned by the graph service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Fragment this node was extracted from, if any
    #[serde(default)]
    pub fragment_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_code: Option<String>,
    #[serde(default)]
    pub business_id: String,
    #[serde(default)]
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Relation type the node was reached through; `None` for seeds
    #[serde(default)]
    pub relation: Option<String>,
    /// Hops from the nearest seed node
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A knowledge fragment flowing from a strategy adapter through fusion
///
/// The provenance type is fixed at creation. Fusion may overwrite the score;
/// the first overwrite preserves the native score under
/// [`metadata_keys::NATIVE_SCORE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeRetrievalResult {
    id: String,
    content: String,
    business_id: String,
    metadata: Map<String, Value>,
    #[serde(rename = "type")]
    kind: RetrievalType,
    score: f64,
}

impl KnowledgeRetrievalResult {
    /// Build a result from a semantic or full-text backend fragment
    #[must_use]
    pub fn from_fragment(fragment: ScoredFragment, kind: RetrievalType) -> Self {
        let mut metadata = fragment.metadata;
        metadata.insert(
            metadata_keys::KNOWLEDGE_BASE_CODE.to_string(),
            Value::from(fragment.knowledge_base_code),
        );

        Self {
            id: fragment.id,
            content: fragment.content,
            business_id: fragment.business_id,
            metadata,
            kind,
            score: fragment.score,
        }
    }

    /// Build a result from a graph node
    ///
    /// Nodes extracted from a fragment share that fragment's identity so
    /// they deduplicate against semantic and full-text hits.
    #[must_use]
    pub fn from_graph_data(node: GraphNode, include_properties: bool) -> Self {
        let mut metadata = Map::new();
        metadata.insert(metadata_keys::NODE_ID.to_string(), Value::from(node.id.clone()));
        metadata.insert(metadata_keys::NODE_LABELS.to_string(), Value::from(node.labels));
        metadata.insert(metadata_keys::DEPTH.to_string(), Value::from(node.depth));
        if let Some(relation) = node.relation {
            metadata.insert(metadata_keys::RELATION.to_string(), Value::from(relation));
        }
        if let Some(code) = node.knowledge_base_code {
            metadata.insert(
                metadata_keys::KNOWLEDGE_BASE_CODE.to_string(),
                Value::from(code),
            );
        }
        if include_properties {
            metadata.insert(
                metadata_keys::PROPERTIES.to_string(),
                Value::Object(node.properties),
            );
        }

        Self {
            id: node.fragment_id.unwrap_or(node.id),
            content: node.content,
            business_id: node.business_id,
            metadata,
            kind: RetrievalType::Graph,
            score: node.score,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    #[must_use]
    pub const fn retrieval_type(&self) -> RetrievalType {
        self.kind
    }

    /// Current score: native before fusion, fused after
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Score before any fusion overwrote it
    #[must_use]
    pub fn native_score(&self) -> f64 {
        self.metadata
            .get(metadata_keys::NATIVE_SCORE)
            .and_then(Value::as_f64)
            .unwrap_or(self.score)
    }

    pub(crate) fn set_fused_score(&mut self, score: f64) {
        self.metadata
            .entry(metadata_keys::NATIVE_SCORE)
            .or_insert_with(|| Value::from(self.score));
        self.score = score;
    }

    pub(crate) fn insert_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }
}

/// Everything one strategy returned for a query, before fusion
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResults {
    pub kind: RetrievalType,
    pub results: Vec<KnowledgeRetrievalResult>,
}

impl StrategyResults {
    #[must_use]
    pub const fn new(kind: RetrievalType, results: Vec<KnowledgeRetrievalResult>) -> Self {
        Self { kind, results }
    }
}
