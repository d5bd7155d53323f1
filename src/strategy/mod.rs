//! Strategy Engine
//!
//! Picks one winner out of a (possibly still resolving) set of simulated
//! quotes. Only quotes that succeeded twice, once at the provider and once
//! in simulation, are ever eligible. "No winner" is `Ok(None)`; an empty
//! candidate set is a caller bug and comes back as an error.

use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregator::QuoteSet;
use crate::errors::StrategyError;
use crate::types::SimulatedQuote;

/// Caller-supplied policy over the raw pending results
pub type CustomStrategy =
    Arc<dyn Fn(QuoteSet<SimulatedQuote>) -> BoxFuture<'static, Option<SimulatedQuote>> + Send + Sync>;

#[derive(Clone)]
pub enum SelectionStrategy {
    /// First doubly-successful result to complete; later ones are ignored
    Fastest,
    /// Highest simulated output once everything resolved
    BestPrice,
    /// Lowest simulated gas once everything resolved
    EstimatedGas,
    /// First doubly-successful result in provider order (failover)
    Priority,
    Custom(CustomStrategy),
}

impl SelectionStrategy {
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(QuoteSet<SimulatedQuote>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<SimulatedQuote>> + Send + 'static,
    {
        Self::Custom(Arc::new(move |set| Box::pin(f(set))))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::Fastest => "fastest",
            SelectionStrategy::BestPrice => "bestPrice",
            SelectionStrategy::EstimatedGas => "estimatedGas",
            SelectionStrategy::Priority => "priority",
            SelectionStrategy::Custom(_) => "custom",
        }
    }
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::BestPrice
    }
}

impl std::fmt::Debug for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionStrategy {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fastest" => Ok(SelectionStrategy::Fastest),
            "bestPrice" | "best-price" | "best_price" => Ok(SelectionStrategy::BestPrice),
            "estimatedGas" | "estimated-gas" | "estimated_gas" => Ok(SelectionStrategy::EstimatedGas),
            "priority" => Ok(SelectionStrategy::Priority),
            other => Err(StrategyError::Unknown(other.to_string())),
        }
    }
}

// ============================================
// SELECTION
// ============================================

pub async fn select(
    set: QuoteSet<SimulatedQuote>,
    strategy: &SelectionStrategy,
) -> Result<Option<SimulatedQuote>, StrategyError> {
    if set.expected() == Some(0) {
        return Err(StrategyError::EmptyCandidates);
    }

    let winner = match strategy {
        SelectionStrategy::Fastest => fastest(set).await?,
        SelectionStrategy::BestPrice => best_by(set, |a, b| a.simulated_output() > b.simulated_output()).await?,
        SelectionStrategy::EstimatedGas => best_by(set, |a, b| a.gas_used() < b.gas_used()).await?,
        SelectionStrategy::Priority => priority(set).await?,
        SelectionStrategy::Custom(f) => f(set).await,
    };

    match &winner {
        Some(w) => info!(strategy = strategy.name(), provider = w.provider(), "selected quote"),
        None => info!(strategy = strategy.name(), "no quote succeeded"),
    }
    Ok(winner)
}

async fn fastest(set: QuoteSet<SimulatedQuote>) -> Result<Option<SimulatedQuote>, StrategyError> {
    let mut results = set.into_stream();
    let mut seen = 0usize;
    while let Some(item) = results.next().await {
        seen += 1;
        if item.result.is_successful() {
            return Ok(Some(item.result));
        }
        debug!(provider = item.result.provider(), "skipping unsuccessful result");
    }
    if seen == 0 {
        return Err(StrategyError::EmptyCandidates);
    }
    Ok(None)
}

/// Fold in provider order; `better(candidate, current)` must be strict so
/// ties keep the earlier provider
async fn best_by<F>(set: QuoteSet<SimulatedQuote>, better: F) -> Result<Option<SimulatedQuote>, StrategyError>
where
    F: Fn(&SimulatedQuote, &SimulatedQuote) -> bool,
{
    let all = set.collect().await;
    if all.is_empty() {
        return Err(StrategyError::EmptyCandidates);
    }

    let mut best: Option<SimulatedQuote> = None;
    for candidate in all.into_iter().filter(SimulatedQuote::is_successful) {
        let replace = match &best {
            None => true,
            Some(current) => better(&candidate, current),
        };
        if replace {
            best = Some(candidate);
        }
    }
    Ok(best)
}

/// Returns as soon as every earlier provider has resolved unsuccessfully
async fn priority(set: QuoteSet<SimulatedQuote>) -> Result<Option<SimulatedQuote>, StrategyError> {
    let mut results = set.into_stream();
    let mut pending: BTreeMap<usize, SimulatedQuote> = BTreeMap::new();
    let mut next = 0usize;
    let mut seen = 0usize;

    while let Some(item) = results.next().await {
        seen += 1;
        pending.insert(item.index, item.result);
        while let Some(result) = pending.remove(&next) {
            if result.is_successful() {
                return Ok(Some(result));
            }
            next += 1;
        }
    }

    if seen == 0 {
        return Err(StrategyError::EmptyCandidates);
    }
    // gaps left by tasks that never reported
    Ok(pending.into_values().find(SimulatedQuote::is_successful))
}
