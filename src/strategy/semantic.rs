//! Semantic (vector) retrieval

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Strategy, VectorSearch};
use crate::Result;
use crate::config::RetrieveConfig;
use crate::result::{KnowledgeRetrievalResult, RetrievalType};

/// Strategy backed by a vector index
pub struct SemanticStrategy {
    backend: Arc<dyn VectorSearch>,
}

impl SemanticStrategy {
    #[must_use]
    pub fn new(backend: Arc<dyn VectorSearch>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Strategy for SemanticStrategy {
    fn kind(&self) -> RetrievalType {
        RetrievalType::Semantic
    }

    async fn retrieve(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        config: &RetrieveConfig,
    ) -> Result<Vec<KnowledgeRetrievalResult>> {
        let setting = &config.weights().vector_setting;
        let fragments = self.backend.search(query, knowledge_bases, setting).await?;

        tracing::debug!(
            candidates = fragments.len(),
            model = %setting.embedding_model_name,
            "semantic search complete"
        );

        Ok(fragments
            .into_iter()
            .map(|f| KnowledgeRetrievalResult::from_fragment(f, RetrievalType::Semantic))
            .collect())
    }
}
