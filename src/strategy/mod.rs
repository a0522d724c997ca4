//! Retrieval strategies
//!
//! Each strategy wraps one external search backend and turns its raw output
//! into [`KnowledgeRetrievalResult`]s tagged with the strategy's type. Scores
//! stay backend-native; truncation and filtering happen during fusion.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::config::{EngineSettings, GraphSearchConfig, RetrieveConfig, VectorSetting};
use crate::result::{GraphNode, KnowledgeRetrievalResult, RetrievalType, ScoredFragment};

pub mod full_text;
pub mod graph;
pub mod semantic;

pub use full_text::FullTextStrategy;
pub use graph::{GraphServiceClient, GraphStrategy};
pub use semantic::SemanticStrategy;

/// Vector index queried by the semantic strategy
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Nearest fragments to `query` across the given knowledge bases
    async fn search(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        setting: &VectorSetting,
    ) -> Result<Vec<ScoredFragment>>;
}

/// Full-text index queried by the full-text strategy
#[async_trait]
pub trait TextSearch: Send + Sync {
    /// Keyword matches for `query` across the given knowledge bases
    async fn search(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
    ) -> Result<Vec<ScoredFragment>>;
}

/// Graph store queried by the graph strategy
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes related to `query`, at most `config.max_depth()` hops from a seed
    async fn traverse(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &GraphSearchConfig,
    ) -> Result<Vec<GraphNode>>;
}

/// Timeout and retry budget for one strategy invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    /// Bound on each attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retries: u32,
}

/// A candidate-generating retrieval strategy
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Type tag carried by every result this strategy produces
    fn kind(&self) -> RetrievalType;

    /// Produce native-scored candidates for `query`
    async fn retrieve(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
    ) -> Result<Vec<KnowledgeRetrievalResult>>;

    /// Budget for one invocation under `config`
    ///
    /// Defaults to the engine-wide backend timeout and retry count
    fn attempt_budget(&self, _config: &RetrieveConfig, settings: &EngineSettings) -> AttemptBudget {
        AttemptBudget {
            timeout: settings.backend_timeout,
            retries: settings.backend_retry_count,
        }
    }
}

/// Strategy registry - one adapter per retrieval type
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<RetrievalType, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any previous one of the same type
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        let kind = strategy.kind();
        if self.strategies.insert(kind, strategy).is_some() {
            tracing::debug!(strategy = %kind, "replaced registered strategy");
        }
    }

    /// Strategy registered for `kind`
    #[must_use]
    pub fn get(&self, kind: RetrievalType) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(&kind).cloned()
    }

    #[must_use]
    pub fn contains(&self, kind: RetrievalType) -> bool {
        self.strategies.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().copied().collect();
        kinds.sort();
        f.debug_struct("StrategyRegistry")
            .field("strategies", &kinds)
            .finish()
    }
}
