//! HTTP reranking client
//!
//! Speaks the Cohere/Jina rerank shape:
//!
//! ```text
//! POST {api_endpoint}
//! Authorization: Bearer {api_key}
//! {"model": "...", "query": "...", "documents": ["..."], "top_n": N}
//!
//! {"results": [{"index": 0, "relevance_score": 0.93}, ...]}
//! ```
//!
//! Candidates are split into batches of `batch_size` that run concurrently
//! up to `max_in_flight`. A batch that exhausts its retries falls back to the
//! candidates' own scores without affecting other batches.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mini_moka::sync::Cache;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::{RerankCandidate, RerankScore, Reranker};
use crate::config::{EngineSettings, RerankingModelConfig};
use crate::error::ConfigError;
use crate::retry::{self, RetryPolicy};
use crate::{Error, Result};

const SERVICE: &str = "rerank";

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Cache key for a reranked fragment
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
struct CacheKey {
    model: String,
    query_hash: String,
    fragment_id: String,
}

/// Cached relevance score
///
/// The insertion time is kept so each call can apply its own `cache_ttl`.
#[derive(Debug, Clone, Copy)]
struct CachedScore {
    score: f64,
    stored_at: Instant,
}

/// Reranker backed by an HTTP reranking service
#[derive(Clone)]
pub struct RerankClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    max_in_flight: usize,
    cache: Cache<CacheKey, CachedScore>,
}

impl RerankClient {
    /// Create a client using engine-wide concurrency, cache and backoff settings
    #[must_use]
    pub fn new(settings: &EngineSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Use a preconfigured HTTP client
    #[must_use]
    pub fn with_client(http: reqwest::Client, settings: &EngineSettings) -> Self {
        Self {
            http,
            retry: settings.retry.clone(),
            max_in_flight: settings.rerank_max_in_flight.max(1),
            cache: Cache::builder()
                .max_capacity(settings.rerank_cache_capacity)
                .build(),
        }
    }

    fn cached(&self, key: &CacheKey, ttl: Duration) -> Option<f64> {
        let entry = self.cache.get(key)?;
        if entry.stored_at.elapsed() < ttl {
            tracing::trace!(fragment_id = %key.fragment_id, "rerank cache hit");
            Some(entry.score)
        } else {
            self.cache.invalidate(key);
            None
        }
    }

    /// Score one batch, falling back if every attempt fails
    ///
    /// Only cancellation is returned as an error.
    async fn score_batch(
        &self,
        query: &str,
        batch: &[&RerankCandidate],
        config: &RerankingModelConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RerankScore>> {
        let policy = self.retry.with_max_retries(config.retry_count());
        let outcome = retry::run_with_retries(
            SERVICE,
            &policy,
            config.timeout_duration(),
            cancel,
            |_| self.request(query, batch, config),
        )
        .await;

        match outcome {
            Ok(scores) => Ok(batch
                .iter()
                .zip(scores)
                .map(|(candidate, score)| match score {
                    Some(score) => RerankScore {
                        id: candidate.id.clone(),
                        score,
                        fallback: false,
                    },
                    None => {
                        tracing::warn!(
                            fragment_id = %candidate.id,
                            "rerank response omitted fragment, using fallback score"
                        );
                        RerankScore::fallback_for(candidate)
                    }
                })
                .collect()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(
                    batch_size = batch.len(),
                    error = %e,
                    "rerank batch failed, using fallback scores"
                );
                Ok(batch.iter().map(|c| RerankScore::fallback_for(c)).collect())
            }
        }
    }

    /// One call to the reranking service; `None` marks an unscored document
    async fn request(
        &self,
        query: &str,
        batch: &[&RerankCandidate],
        config: &RerankingModelConfig,
    ) -> Result<Vec<Option<f64>>> {
        let endpoint = config
            .api_endpoint()
            .ok_or_else(|| ConfigError::missing("reranking.api_endpoint"))?;

        // Ask for every document so batches can be merged before top_n applies
        let body = RerankRequest {
            model: config.reranking_model_name(),
            query,
            documents: batch.iter().map(|c| c.content.as_str()).collect(),
            top_n: batch.len(),
        };

        let mut request = self.http.post(endpoint.as_str()).json(&body);
        if let Some(key) = config.api_key() {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = retry::ensure_success(SERVICE, request.send().await?).await?;
        let bytes = response.bytes().await?;
        let parsed: RerankResponse =
            serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let mut scores = vec![None; batch.len()];
        for result in parsed.results {
            let slot = scores
                .get_mut(result.index)
                .ok_or_else(|| Error::MalformedResponse {
                    service: SERVICE,
                    reason: format!(
                        "index {} out of range for {} documents",
                        result.index,
                        batch.len()
                    ),
                })?;
            if !result.relevance_score.is_finite() {
                return Err(Error::MalformedResponse {
                    service: SERVICE,
                    reason: format!("non-finite score at index {}", result.index),
                });
            }
            *slot = Some(result.relevance_score);
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for RerankClient {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        config: &RerankingModelConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RerankScore>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_hash = hex::encode(Sha256::digest(query.as_bytes()));
        let key_for = |candidate: &RerankCandidate| CacheKey {
            model: config.reranking_model_name().to_string(),
            query_hash: query_hash.clone(),
            fragment_id: candidate.id.clone(),
        };
        let ttl = Duration::from_secs(config.cache_ttl());
        let read_cache = config.use_cache() && !ttl.is_zero();

        let mut scores: Vec<Option<RerankScore>> = candidates
            .iter()
            .map(|c| {
                read_cache
                    .then(|| self.cached(&key_for(c), ttl))
                    .flatten()
                    .map(|score| RerankScore {
                        id: c.id.clone(),
                        score,
                        fallback: false,
                    })
            })
            .collect();

        let pending: Vec<usize> = (0..candidates.len())
            .filter(|&i| scores[i].is_none())
            .collect();
        let batch_size = usize::try_from(config.batch_size()).unwrap_or(usize::MAX).max(1);
        let batches: Vec<&[usize]> = pending.chunks(batch_size).collect();

        tracing::debug!(
            candidates = candidates.len(),
            cached = candidates.len() - pending.len(),
            batches = batches.len(),
            model = config.reranking_model_name(),
            "reranking candidates"
        );

        let requests: Vec<_> = batches
            .iter()
            .map(|slots| {
                let batch: Vec<&RerankCandidate> = slots.iter().map(|&i| &candidates[i]).collect();
                async move { self.score_batch(query, &batch, config, cancel).await }
            })
            .collect();
        let outcomes: Vec<Result<Vec<RerankScore>>> = stream::iter(requests)
        .buffered(self.max_in_flight)
        .collect()
        .await;

        for (slots, outcome) in batches.iter().zip(outcomes) {
            for (&i, score) in slots.iter().zip(outcome?) {
                if config.use_cache() && !score.fallback {
                    self.cache.insert(
                        key_for(&candidates[i]),
                        CachedScore {
                            score: score.score,
                            stored_at: Instant::now(),
                        },
                    );
                }
                scores[i] = Some(score);
            }
        }

        Ok(scores
            .into_iter()
            .zip(candidates)
            .map(|(score, c)| score.unwrap_or_else(|| RerankScore::fallback_for(c)))
            .collect())
    }
}

impl std::fmt::Debug for RerankClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankClient")
            .field("max_in_flight", &self.max_in_flight)
            .field("retry", &self.retry)
            .field("cached_entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}
