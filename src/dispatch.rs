//! Strategy planning and concurrent execution
//!
//! The dispatcher maps a search method to its strategy set and runs every
//! selected strategy at once. A strategy that fails or runs out of time
//! contributes nothing; only cancellation aborts the whole dispatch.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineSettings, RetrieveConfig, SearchMethod};
use crate::result::{RetrievalType, StrategyResults};
use crate::retry;
use crate::strategy::StrategyRegistry;
use crate::{Error, Result};

/// Strategies to run for `config`, in priority order
#[must_use]
pub fn plan(config: &RetrieveConfig) -> Vec<RetrievalType> {
    match config.search_method() {
        SearchMethod::Semantic => vec![RetrievalType::Semantic],
        SearchMethod::FullText => vec![RetrievalType::FullText],
        SearchMethod::Graph => vec![RetrievalType::Graph],
        SearchMethod::Hybrid => {
            if config.weights().graph_setting.relation_weight() > 0.0 {
                vec![
                    RetrievalType::Graph,
                    RetrievalType::Semantic,
                    RetrievalType::FullText,
                ]
            } else {
                vec![RetrievalType::Semantic, RetrievalType::FullText]
            }
        }
    }
}

/// How one planned strategy ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyStatus {
    /// Returned this many candidates
    Completed(usize),
    /// Every attempt exceeded its timeout
    TimedOut,
    /// Gave up with this error
    Failed(String),
    /// No adapter is registered for the type
    Unavailable,
}

impl StrategyStatus {
    /// Whether the strategy's results made it into fusion
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(n) => write!(f, "completed ({n} candidates)"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Report for one planned strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRun {
    pub kind: RetrievalType,
    pub status: StrategyStatus,
    /// Wall time including retries
    pub elapsed: Duration,
}

/// Candidates from every strategy plus a per-strategy report
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    /// One entry per planned strategy; failed strategies have no results
    pub candidates: Vec<StrategyResults>,
    pub runs: Vec<StrategyRun>,
}

/// Run every planned strategy concurrently and wait for all of them
///
/// # Errors
///
/// Returns `Error::Cancelled` if `cancel` fires before all strategies finish
pub async fn run(
    registry: &StrategyRegistry,
    settings: &EngineSettings,
    query: &str,
    knowledge_bases: &BTreeSet<String>,
    config: &RetrieveConfig,
    cancel: &CancellationToken,
) -> Result<Dispatch> {
    let planned = plan(config);
    tracing::debug!(
        search_method = %config.search_method(),
        strategies = ?planned,
        "dispatching strategies"
    );

    let outcomes = join_all(planned.into_iter().map(|kind| {
        run_one(registry, settings, kind, query, knowledge_bases, config, cancel)
    }))
    .await;

    let mut dispatch = Dispatch::default();
    for outcome in outcomes {
        let (results, run) = outcome?;
        dispatch.candidates.push(results);
        dispatch.runs.push(run);
    }
    Ok(dispatch)
}

async fn run_one(
    registry: &StrategyRegistry,
    settings: &EngineSettings,
    kind: RetrievalType,
    query: &str,
    knowledge_bases: &BTreeSet<String>,
    config: &RetrieveConfig,
    cancel: &CancellationToken,
) -> Result<(StrategyResults, StrategyRun)> {
    let started = Instant::now();
    let report = |status, results| {
        (
            StrategyResults::new(kind, results),
            StrategyRun {
                kind,
                status,
                elapsed: started.elapsed(),
            },
        )
    };

    let Some(strategy) = registry.get(kind) else {
        tracing::warn!(strategy = %kind, "no adapter registered, contributing no results");
        return Ok(report(StrategyStatus::Unavailable, Vec::new()));
    };

    let budget = strategy.attempt_budget(config, settings);
    let policy = settings.retry.with_max_retries(budget.retries);
    let outcome = retry::run_with_retries(kind.as_str(), &policy, budget.timeout, cancel, |_| {
        strategy.retrieve(query, knowledge_bases, config)
    })
    .await;

    match outcome {
        Ok(results) => Ok(report(StrategyStatus::Completed(results.len()), results)),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(Error::Timeout { timeout, .. }) => {
            tracing::warn!(
                strategy = %kind,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "strategy timed out, contributing no results"
            );
            Ok(report(StrategyStatus::TimedOut, Vec::new()))
        }
        Err(e) => {
            tracing::warn!(strategy = %kind, error = %e, "strategy failed, contributing no results");
            Ok(report(StrategyStatus::Failed(e.to_string()), Vec::new()))
        }
    }
}
