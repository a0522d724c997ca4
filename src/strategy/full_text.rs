//! Full-text (keyword) retrieval

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Strategy, TextSearch};
use crate::Result;
use crate::config::RetrieveConfig;
use crate::result::{KnowledgeRetrievalResult, RetrievalType};

/// Strategy backed by a full-text index
///
/// Scores are whatever the index reports (typically BM25) and are
/// normalized only during fusion.
pub struct FullTextStrategy {
    backend: Arc<dyn TextSearch>,
}

impl FullTextStrategy {
    #[must_use]
    pub fn new(backend: Arc<dyn TextSearch>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Strategy for FullTextStrategy {
    fn kind(&self) -> RetrievalType {
        RetrievalType::FullText
    }

    async fn retrieve(
        &self,
        query: &str,
        knowledge_bases: &BTreeSet<String>,
        _config: &RetrieveConfig,
    ) -> Result<Vec<KnowledgeRetrievalResult>> {
        let fragments = self.backend.search(query, knowledge_bases).await?;
        tracing::debug!(candidates = fragments.len(), "full-text search complete");

        Ok(fragments
            .into_iter()
            .map(|f| KnowledgeRetrievalResult::from_fragment(f, RetrievalType::FullText))
            .collect())
    }
}
