//! Weighted-score fusion
//!
//! Each strategy's scores are min-max normalized within that strategy's own
//! result set. A fragment's fused score is the weighted mean of its
//! normalized scores over the strategies that actually returned it:
//!
//! ```text
//! fused = Σ w(kind) · norm(kind) / Σ w(kind)
//! ```
//!
//! so a fragment only one strategy found is not diluted by the others'
//! weight mass. A fragment whose contributors all weigh zero scores 0.0,
//! unless no returned candidate carries any weight at all: then every
//! strategy counts equally and the score is the plain mean.

use std::collections::BTreeMap;

use crate::config::Weights;
use crate::result::{KnowledgeRetrievalResult, RetrievalType, StrategyResults};

/// Fuse per-strategy pools into deduplicated results with scores in [0, 1]
///
/// A fragment found by several strategies keeps the content and type tag of
/// the highest-priority one.
#[must_use]
pub fn fuse(pools: Vec<StrategyResults>, weights: &Weights) -> Vec<KnowledgeRetrievalResult> {
    // A single-strategy search on a zero weight must still rank its candidates
    let unweighted = pools
        .iter()
        .flat_map(|pool| &pool.results)
        .all(|r| weights.weight_for(r.retrieval_type()) <= 0.0);
    if unweighted {
        tracing::debug!("no contributing strategy carries weight, using unweighted mean");
    }
    let weight_of = |kind: RetrievalType| {
        if unweighted {
            1.0
        } else {
            weights.weight_for(kind)
        }
    };

    super::group(pools)
        .into_iter()
        .map(|group| {
            let mut best: BTreeMap<RetrievalType, f64> = BTreeMap::new();
            for c in group.contributions() {
                best.entry(c.kind)
                    .and_modify(|n| *n = n.max(c.normalized))
                    .or_insert(c.normalized);
            }

            let (weighted, mass) = best.iter().fold((0.0, 0.0), |(sum, mass), (&kind, &n)| {
                let w = weight_of(kind);
                (w.mul_add(n, sum), mass + w)
            });
            let fused = if mass > 0.0 {
                (weighted / mass).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let (mut result, _) = group.into_preferred();
            result.set_fused_score(fused);
            result
        })
        .collect()
}
