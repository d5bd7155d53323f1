//! Simulation Engine
//!
//! Executes each quote's transaction against live chain state before it is
//! trusted. Responsible for:
//! - Planning the approve / swap / probe batch for a quote
//! - Running it through the chain client with a synthetic native balance
//! - Classifying reverts and broken-but-successful routes
//! - Pairing the quote with its realized outcome
//!
//! Failures never escape as errors: they become `SimulationResult::Failure`.

mod plan;

pub use plan::{CallPlan, TraceMode};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::Transform;
use crate::chain::{ChainClient, ChainRegistry, SimulateCallsRequest};
use crate::errors::{describe_return_data, ExecutionError, SimulationError};
use crate::telemetry::Telemetry;
use crate::tokens::SIMULATION_BALANCE;
use crate::types::{
    Quote, SimulatedQuote, SimulationResult, SimulationSuccess, SuccessfulQuote, SwapRequest,
};

#[derive(Clone)]
pub struct SimulationEngine {
    chains: ChainRegistry,
    balance_diff: bool,
    telemetry: Telemetry,
}

impl SimulationEngine {
    pub fn new(chains: ChainRegistry, telemetry: Telemetry) -> Self {
        Self {
            chains,
            balance_diff: false,
            telemetry,
        }
    }

    /// Always read output from balance probes, even without a distinct recipient
    pub fn with_balance_diff(mut self, enabled: bool) -> Self {
        self.balance_diff = enabled;
        self
    }

    /// Asset changes are traced for the simulating account only, so a
    /// distinct recipient forces balance-diff mode
    pub fn trace_mode_for(&self, request: &SwapRequest) -> TraceMode {
        if self.balance_diff || request.recipient().is_some() {
            TraceMode::BalanceDiff
        } else {
            TraceMode::AssetChanges
        }
    }

    /// Per-quote transform for the orchestrator.
    ///
    /// Resolves the chain client up front so a missing client is reported
    /// before any provider is contacted.
    pub fn transform(&self, request: &SwapRequest) -> Result<Transform<SimulatedQuote>, ExecutionError> {
        let client = self.chains.get(request.chain_id())?;
        let request = Arc::new(request.clone());
        let mode = self.trace_mode_for(&request);
        let telemetry = self.telemetry.child("simulate");

        Ok(Arc::new(move |quote: Quote| {
            let client = client.clone();
            let request = request.clone();
            telemetry.instrument(async move { simulate_quote(client.as_ref(), &request, quote, mode).await })
        }))
    }

    /// Simulate one quote outside the orchestrator
    pub async fn simulate(&self, request: &SwapRequest, quote: Quote) -> Result<SimulatedQuote, ExecutionError> {
        let client = self.chains.get(request.chain_id())?;
        let mode = self.trace_mode_for(request);
        Ok(self
            .telemetry
            .instrument({
                let request = request.clone();
                async move { simulate_quote(client.as_ref(), &request, quote, mode).await }
            })
            .await)
    }
}

async fn simulate_quote(
    client: &dyn ChainClient,
    request: &SwapRequest,
    quote: Quote,
    mode: TraceMode,
) -> SimulatedQuote {
    let simulation = match &quote {
        Quote::Successful(q) => match run(client, request, q, mode).await {
            Ok(success) => {
                info!(
                    provider = %q.provider,
                    quoted = %q.output_amount,
                    realized = %success.output_amount,
                    gas = success.gas_used,
                    latency_ms = success.latency_ms,
                    "simulation succeeded"
                );
                SimulationResult::Success(success)
            }
            Err(error) => {
                warn!(provider = %q.provider, "simulation failed: {}", error);
                SimulationResult::Failure { error }
            }
        },
        Quote::Failed(_) => SimulationResult::Failure {
            error: SimulationError::QuoteNotSuccessful,
        },
    };
    SimulatedQuote::new(quote, simulation)
}

async fn run(
    client: &dyn ChainClient,
    request: &SwapRequest,
    quote: &SuccessfulQuote,
    mode: TraceMode,
) -> Result<SimulationSuccess, SimulationError> {
    let plan = CallPlan::build(request, quote, mode);
    debug!(provider = %quote.provider, calls = plan.calls.len(), ?mode, "simulating");

    let started = Instant::now();
    let outcome = client
        .simulate_calls(SimulateCallsRequest {
            account: request.swapper(),
            calls: plan.calls.clone(),
            balance_override: Some(SIMULATION_BALANCE),
            trace_asset_changes: mode == TraceMode::AssetChanges,
        })
        .await
        .map_err(|e| SimulationError::Client { message: e.to_string() })?;
    let latency_ms = started.elapsed().as_millis() as u64;

    if outcome.results.len() != plan.calls.len() {
        return Err(SimulationError::Client {
            message: format!(
                "expected {} call results, got {}",
                plan.calls.len(),
                outcome.results.len()
            ),
        });
    }

    if let Some(revert) = plan.first_revert(&outcome) {
        debug!(
            call_index = revert.call_index,
            block = revert.block_number,
            return_data = %describe_return_data(&revert.result.return_data),
            "call reverted in simulation"
        );
        return Err(SimulationError::Revert(revert));
    }

    let output_amount = plan.realized_output(&outcome)?;
    let gas_used = plan.swap_result(&outcome).map(|r| r.gas_used).unwrap_or_default();

    Ok(SimulationSuccess {
        output_amount,
        gas_used,
        latency_ms,
        block_number: outcome.block_number,
        per_call_results: outcome.results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QuoteError;
    use crate::testing::{exact_in_request, successful_quote, MockChainClient, ROUTER};
    use alloy_primitives::{Address, U256};

    fn engine(client: MockChainClient) -> (SimulationEngine, Arc<MockChainClient>) {
        let client = Arc::new(client);
        let chains = ChainRegistry::new().with_client(client.clone());
        (SimulationEngine::new(chains, Telemetry::default()), client)
    }

    #[tokio::test]
    async fn test_successful_simulation_produces_metrics() {
        let (engine, client) = engine(
            MockChainClient::new(8453).with_route(ROUTER, U256::from(1_010_000u64), 1_300_000),
        );
        let quote = Quote::Successful(successful_quote("a", U256::from(1_000_000u64)));

        let simulated = engine.simulate(&exact_in_request(), quote).await.unwrap();

        assert!(simulated.is_successful());
        assert_eq!(simulated.simulated_output(), Some(U256::from(1_010_000u64)));
        assert_eq!(simulated.gas_used(), Some(1_300_000));
        let metrics = simulated.metrics.unwrap();
        assert_eq!(metrics.price_delta_bps, 100);
        assert_eq!(metrics.accuracy_bps, 100);

        let batches = client.simulated_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].balance_override, Some(SIMULATION_BALANCE));
        assert!(batches[0].trace_asset_changes);
    }

    #[tokio::test]
    async fn test_revert_degrades_to_failure() {
        let (engine, _) = engine(MockChainClient::new(8453).with_reverting_route(ROUTER));
        let quote = Quote::Successful(successful_quote("a", U256::from(1u64)));

        let simulated = engine.simulate(&exact_in_request(), quote).await.unwrap();

        match simulated.simulation {
            SimulationResult::Failure { error: SimulationError::Revert(revert) } => {
                assert_eq!(revert.call_index, 1);
                assert_eq!(revert.call.to, ROUTER);
            }
            other => panic!("expected revert, got {:?}", other),
        }
        assert!(simulated.metrics.is_none());
    }

    #[tokio::test]
    async fn test_zero_output_route_fails() {
        let (engine, _) = engine(MockChainClient::new(8453).with_route(ROUTER, U256::ZERO, 100_000));
        let quote = Quote::Successful(successful_quote("a", U256::from(1u64)));

        let simulated = engine.simulate(&exact_in_request(), quote).await.unwrap();
        assert!(matches!(
            simulated.simulation,
            SimulationResult::Failure { error: SimulationError::NonPositiveOutput { .. } }
        ));
    }

    #[tokio::test]
    async fn test_failed_quote_is_not_simulated() {
        let (engine, client) = engine(MockChainClient::new(8453));
        let quote = Quote::failed("a", QuoteError::DeadlineExceeded { deadline_ms: 10 });

        let simulated = engine.simulate(&exact_in_request(), quote).await.unwrap();
        assert!(matches!(
            simulated.simulation,
            SimulationResult::Failure { error: SimulationError::QuoteNotSuccessful }
        ));
        assert!(client.simulated_batches().is_empty());
    }

    #[tokio::test]
    async fn test_recipient_switches_to_balance_diff() {
        let (engine, client) = engine(
            MockChainClient::new(8453).with_route(ROUTER, U256::from(42u64), 90_000),
        );
        let request = exact_in_request().with_recipient(Address::repeat_byte(0x77));
        assert_eq!(engine.trace_mode_for(&request), TraceMode::BalanceDiff);

        let quote = Quote::Successful(successful_quote("a", U256::from(42u64)));
        let simulated = engine.simulate(&request, quote).await.unwrap();

        assert_eq!(simulated.simulated_output(), Some(U256::from(42u64)));
        assert!(!client.simulated_batches()[0].trace_asset_changes);
    }

    #[test]
    fn test_missing_chain_client_is_reported_up_front() {
        let (engine, _) = engine(MockChainClient::new(1));
        assert!(matches!(
            engine.transform(&exact_in_request()),
            Err(ExecutionError::NoClientForChain(8453))
        ));
    }
}
