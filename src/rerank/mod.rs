//! Reranking model integration
//!
//! A [`Reranker`] replaces fused scores with relevance scores from a
//! dedicated model. Implementations degrade instead of failing: a candidate
//! the model could not score keeps its fallback score and is flagged.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::RerankingModelConfig;

pub mod client;

pub use client::RerankClient;

/// Fragment submitted for reranking
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
    pub id: String,
    pub content: String,
    /// Score used when the model cannot score this fragment
    pub fallback_score: f64,
}

/// Relevance score for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct RerankScore {
    pub id: String,
    pub score: f64,
    /// True when `score` is the candidate's fallback score
    pub fallback: bool,
}

impl RerankScore {
    /// Score a candidate with its own fallback
    #[must_use]
    pub fn fallback_for(candidate: &RerankCandidate) -> Self {
        Self {
            id: candidate.id.clone(),
            score: candidate.fallback_score,
            fallback: true,
        }
    }
}

/// Relevance model that rescores candidates for a query
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every candidate, returning one entry per candidate in order
    ///
    /// Service failures fall back per batch and are not errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires first
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        config: &RerankingModelConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RerankScore>>;
}
