//! Retrieval engine
//!
//! The engine owns the registered strategies and the optional reranker and
//! runs one query end to end:
//!
//! ```text
//! validate ─► dispatch (concurrent) ─► fuse ─► threshold ─► sort ─► top_k
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{
    EngineSettings, GraphSearchConfig, RerankingMode, RerankingModelConfig, RetrieveConfig,
    Settings,
};
use crate::dispatch::{self, StrategyRun};
use crate::fusion::{self, reranked, weighted};
use crate::rerank::{RerankClient, Reranker};
use crate::result::KnowledgeRetrievalResult;
use crate::strategy::{
    FullTextStrategy, GraphServiceClient, GraphStore, GraphStrategy, SemanticStrategy, Strategy,
    StrategyRegistry, TextSearch, VectorSearch,
};
use crate::{Error, Result};

/// Final results plus how each planned strategy ended
#[derive(Debug, Clone, Default)]
pub struct RetrievalReport {
    pub results: Vec<KnowledgeRetrievalResult>,
    pub runs: Vec<StrategyRun>,
}

impl RetrievalReport {
    /// Whether any planned strategy contributed nothing because it failed
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.runs.iter().any(|r| !r.status.is_completed())
    }
}

/// Multi-strategy retrieval over one or more knowledge bases
pub struct RetrievalEngine {
    registry: StrategyRegistry,
    reranker: Option<Arc<dyn Reranker>>,
    reranking: RerankingModelConfig,
    settings: EngineSettings,
}

impl RetrievalEngine {
    #[must_use]
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Retrieve the best fragments for `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKnowledgeBases` if the code set is empty or
    /// contains a malformed code. Strategy and rerank failures degrade
    /// instead of failing.
    pub async fn retrieve(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
    ) -> Result<Vec<KnowledgeRetrievalResult>> {
        self.retrieve_with_cancel(query, knowledge_bases, config, &CancellationToken::new())
            .await
    }

    /// [`retrieve`](Self::retrieve), abandoning in-flight work when `cancel` fires
    ///
    /// # Errors
    ///
    /// As `retrieve`, plus `Error::Cancelled`
    pub async fn retrieve_with_cancel(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<KnowledgeRetrievalResult>> {
        self.retrieve_detailed(query, knowledge_bases, config, cancel)
            .await
            .map(|report| report.results)
    }

    /// Retrieve and report the outcome of every planned strategy
    ///
    /// # Errors
    ///
    /// As `retrieve_with_cancel`
    pub async fn retrieve_detailed(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
        cancel: &CancellationToken,
    ) -> Result<RetrievalReport> {
        validate_knowledge_bases(knowledge_bases)?;

        if query.trim().is_empty() {
            tracing::debug!("blank query, nothing to retrieve");
            return Ok(RetrievalReport::default());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let dispatch = dispatch::run(
            &self.registry,
            &self.settings,
            query,
            knowledge_bases,
            config,
            cancel,
        )
        .await?;

        let fused = match (config.reranking_enable(), config.reranking_mode()) {
            (false, _) => fusion::merge(dispatch.candidates),
            (true, RerankingMode::WeightedScore) => {
                weighted::fuse(dispatch.candidates, config.weights())
            }
            (true, RerankingMode::RerankingModel) => {
                let rerank_config = self.reranking.for_model(config.reranking_model());
                reranked::fuse(
                    query,
                    dispatch.candidates,
                    self.reranker.as_deref(),
                    &rerank_config,
                    cancel,
                )
                .await?
            }
        };
        let candidates = fused.len();
        let results = fusion::finish(fused, config);

        tracing::debug!(
            search_method = %config.search_method(),
            reranking = config.reranking_enable(),
            candidates,
            returned = results.len(),
            "retrieval complete"
        );

        Ok(RetrievalReport {
            results,
            runs: dispatch.runs,
        })
    }
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("registry", &self.registry)
            .field("reranker", &self.reranker.is_some())
            .field("reranking", &self.reranking)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for [`RetrievalEngine`]
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    registry: StrategyRegistry,
    reranker: Option<Arc<dyn Reranker>>,
    reranking: RerankingModelConfig,
    settings: EngineSettings,
}

impl RetrievalEngineBuilder {
    /// Engine-wide timeouts, retries and rerank limits
    #[must_use]
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register any strategy, replacing one of the same type
    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.registry.register(strategy);
        self
    }

    #[must_use]
    pub fn semantic(self, backend: Arc<dyn VectorSearch>) -> Self {
        self.strategy(Arc::new(SemanticStrategy::new(backend)))
    }

    #[must_use]
    pub fn full_text(self, backend: Arc<dyn TextSearch>) -> Self {
        self.strategy(Arc::new(FullTextStrategy::new(backend)))
    }

    #[must_use]
    pub fn graph(self, store: Arc<dyn GraphStore>, config: GraphSearchConfig) -> Self {
        self.strategy(Arc::new(GraphStrategy::new(store, config)))
    }

    #[must_use]
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Connection settings for the reranker; model names may be overridden
    /// per query by `RetrieveConfig::reranking_model`
    #[must_use]
    pub fn reranking_config(mut self, config: RerankingModelConfig) -> Self {
        self.reranking = config;
        self
    }

    /// Apply resolved settings and wire the HTTP graph and rerank services
    /// for every endpoint they configure
    #[must_use]
    pub fn http_services(mut self, settings: &Settings) -> Self {
        self.settings = settings.engine.clone();
        self.reranking = settings.reranking.clone();

        if settings.graph.api_endpoint().is_some() {
            self = self.graph(Arc::new(GraphServiceClient::new()), settings.graph.clone());
        }
        if settings.reranking.api_endpoint().is_some() {
            self.reranker = Some(Arc::new(RerankClient::new(&settings.engine)));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> RetrievalEngine {
        if self.registry.is_empty() {
            tracing::warn!("retrieval engine built without strategies");
        }
        RetrievalEngine {
            registry: self.registry,
            reranker: self.reranker,
            reranking: self.reranking,
            settings: self.settings,
        }
    }
}

/// Reject an empty code set and codes outside `[A-Za-z0-9._-]+`
fn validate_knowledge_bases(codes: &BTreeSet<String>) -> Result<()> {
    if codes.is_empty() {
        return Err(Error::InvalidKnowledgeBases(
            "at least one knowledge base code is required".to_string(),
        ));
    }

    for code in codes {
        if code.is_empty() {
            return Err(Error::InvalidKnowledgeBases(
                "knowledge base code is empty".to_string(),
            ));
        }
        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(Error::InvalidKnowledgeBases(format!(
                "knowledge base code {code:?} contains {bad:?}"
            )));
        }
    }
    Ok(())
}
