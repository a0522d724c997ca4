//! Fusion of per-strategy candidate lists into one ranked list
//!
//! - **merge**: no-fusion fallback, deduplicated and ordered by native score
//! - **weighted**: min-max normalization and weighted linear combination
//! - **reranked**: deduplication followed by an external reranking model
//!
//! Every discipline ends in [`finish`]: threshold filter, deterministic sort,
//! `top_k` truncation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::config::RetrieveConfig;
use crate::result::{KnowledgeRetrievalResult, RetrievalType, StrategyResults, metadata_keys};

pub mod reranked;
pub mod weighted;

/// Min-max normalize `scores` into [0, 1]
///
/// A set whose scores are all equal (including a singleton) normalizes to
/// 1.0 for every member.
#[must_use]
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let (min, max) = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });
    let range = max - min;

    scores
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                0.0
            } else if range > 0.0 {
                ((s - min) / range).clamp(0.0, 1.0)
            } else {
                1.0
            }
        })
        .collect()
}

/// Final ordering: score descending, then type priority, then id ascending
#[must_use]
pub fn ranking_order(a: &KnowledgeRetrievalResult, b: &KnowledgeRetrievalResult) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| {
            b.retrieval_type()
                .priority()
                .cmp(&a.retrieval_type().priority())
        })
        .then_with(|| a.id().cmp(b.id()))
}

/// Post-fusion pipeline shared by every discipline
///
/// Drops fragments under the threshold (when enabled), sorts with
/// [`ranking_order`] and keeps the first `top_k`.
#[must_use]
pub fn finish(
    mut results: Vec<KnowledgeRetrievalResult>,
    config: &RetrieveConfig,
) -> Vec<KnowledgeRetrievalResult> {
    if config.score_threshold_enabled() {
        let threshold = config.score_threshold();
        results.retain(|r| r.score() >= threshold);
    }
    results.sort_by(ranking_order);
    results.truncate(usize::try_from(config.top_k()).unwrap_or(usize::MAX));
    results
}

/// No-fusion fallback used when reranking is disabled
///
/// Fragments are deduplicated (keeping the higher native score) and keep
/// their native scores; no cross-strategy rebalancing happens.
#[must_use]
pub fn merge(pools: Vec<StrategyResults>) -> Vec<KnowledgeRetrievalResult> {
    group(pools)
        .into_iter()
        .map(|group| group.into_strongest().0)
        .collect()
}

/// One strategy's view of a fragment
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contribution {
    pub kind: RetrievalType,
    pub native: f64,
    /// Native score min-max normalized within the strategy's result set
    pub normalized: f64,
}

/// Every candidate sharing one fragment id
#[derive(Debug)]
pub(crate) struct Group {
    first: (KnowledgeRetrievalResult, Contribution),
    rest: Vec<(KnowledgeRetrievalResult, Contribution)>,
}

impl Group {
    pub fn contributions(&self) -> impl Iterator<Item = &Contribution> {
        std::iter::once(&self.first.1).chain(self.rest.iter().map(|(_, c)| c))
    }

    /// Keep the member with the highest native score (ties: higher priority)
    pub fn into_strongest(self) -> (KnowledgeRetrievalResult, Contribution) {
        self.keep_by(|candidate, kept| {
            candidate
                .native
                .total_cmp(&kept.native)
                .then(candidate.kind.priority().cmp(&kept.kind.priority()))
        })
    }

    /// Keep the member from the highest-priority strategy (ties: higher native score)
    pub fn into_preferred(self) -> (KnowledgeRetrievalResult, Contribution) {
        self.keep_by(|candidate, kept| {
            candidate
                .kind
                .priority()
                .cmp(&kept.kind.priority())
                .then(candidate.native.total_cmp(&kept.native))
        })
    }

    /// Fold to the member `compare` ranks highest, first-seen on ties, and
    /// record every contribution on it
    fn keep_by(
        self,
        compare: impl Fn(&Contribution, &Contribution) -> Ordering,
    ) -> (KnowledgeRetrievalResult, Contribution) {
        let contributions: Vec<Contribution> = self.contributions().copied().collect();
        let (mut result, kept) = self.rest.into_iter().fold(self.first, |kept, candidate| {
            if compare(&candidate.1, &kept.1) == Ordering::Greater {
                candidate
            } else {
                kept
            }
        });
        annotate(&mut result, &contributions);
        (result, kept)
    }
}

/// Group candidates by fragment id, in first-seen order
///
/// Scores are normalized per pool before grouping so each contribution
/// carries its position within its own strategy's result set.
pub(crate) fn group(pools: Vec<StrategyResults>) -> Vec<Group> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for pool in pools {
        let scores: Vec<f64> = pool.results.iter().map(KnowledgeRetrievalResult::score).collect();
        let normalized = normalize(&scores);

        for (result, normalized) in pool.results.into_iter().zip(normalized) {
            let contribution = Contribution {
                kind: result.retrieval_type(),
                native: result.score(),
                normalized,
            };
            if let Some(&slot) = index.get(result.id()) {
                groups[slot].rest.push((result, contribution));
            } else {
                index.insert(result.id().to_string(), groups.len());
                groups.push(Group {
                    first: (result, contribution),
                    rest: Vec::new(),
                });
            }
        }
    }

    groups
}

/// Record contributing strategies and their native scores
fn annotate(result: &mut KnowledgeRetrievalResult, contributions: &[Contribution]) {
    let mut by_kind: BTreeMap<RetrievalType, f64> = BTreeMap::new();
    for c in contributions {
        by_kind
            .entry(c.kind)
            .and_modify(|s| *s = s.max(c.native))
            .or_insert(c.native);
    }

    let mut kinds: Vec<(RetrievalType, f64)> = by_kind.into_iter().collect();
    kinds.sort_by_key(|(k, _)| std::cmp::Reverse(k.priority()));

    let names: Vec<&str> = kinds.iter().map(|(k, _)| k.as_str()).collect();
    let scores: Map<String, Value> = kinds
        .iter()
        .map(|(k, s)| (k.as_str().to_string(), Value::from(*s)))
        .collect();

    result.insert_metadata(metadata_keys::STRATEGIES, Value::from(names));
    result.insert_metadata(metadata_keys::STRATEGY_SCORES, Value::Object(scores));
}
