//! Reranking-model fusion
//!
//! Candidates are deduplicated by id (higher native score wins), stripped
//! of empty fragments and sent to a [`Reranker`]. The fused score is the
//! model's relevance score. A fragment the model could not score keeps its
//! native score normalized within its own strategy's result set.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::RerankingModelConfig;
use crate::rerank::{RerankCandidate, RerankScore, Reranker};
use crate::result::{KnowledgeRetrievalResult, StrategyResults, metadata_keys};

/// Rerank pooled candidates and keep the best `config.top_n()`
///
/// Without a reranker every candidate takes its fallback score.
///
/// # Errors
///
/// Returns `Error::Cancelled` if `cancel` fires during reranking
pub async fn fuse(
    query: &str,
    pools: Vec<StrategyResults>,
    reranker: Option<&dyn Reranker>,
    config: &RerankingModelConfig,
    cancel: &CancellationToken,
) -> Result<Vec<KnowledgeRetrievalResult>> {
    let mut deduped: Vec<KnowledgeRetrievalResult> = Vec::new();
    let mut candidates: Vec<RerankCandidate> = Vec::new();
    for group in super::group(pools) {
        let (result, kept) = group.into_strongest();
        if result.content().trim().is_empty() {
            tracing::debug!(fragment_id = %result.id(), "skipping empty fragment");
            continue;
        }
        candidates.push(RerankCandidate {
            id: result.id().to_string(),
            content: result.content().to_string(),
            fallback_score: kept.normalized,
        });
        deduped.push(result);
    }

    let scores = match reranker {
        Some(reranker) => reranker.rerank(query, &candidates, config, cancel).await?,
        None => {
            tracing::warn!("reranking requested but no reranker configured, using fallback scores");
            candidates.iter().map(RerankScore::fallback_for).collect()
        }
    };
    let by_id: HashMap<&str, &RerankScore> = scores.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut fallbacks = 0usize;
    for (result, candidate) in deduped.iter_mut().zip(&candidates) {
        let (score, fallback) = by_id
            .get(result.id())
            .map_or((candidate.fallback_score, true), |s| (s.score, s.fallback));
        if fallback {
            fallbacks += 1;
        }
        result.set_fused_score(score);
        result.insert_metadata(metadata_keys::RERANK_FALLBACK, Value::Bool(fallback));
    }

    deduped.sort_by(super::ranking_order);
    deduped.truncate(usize::try_from(config.top_n()).unwrap_or(usize::MAX));

    tracing::debug!(
        reranked = candidates.len(),
        fallbacks,
        kept = deduped.len(),
        "rerank fusion complete"
    );
    Ok(deduped)
}
