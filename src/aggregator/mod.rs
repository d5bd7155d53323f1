//! Aggregator
//!
//! The public face of the pipeline. An `Aggregator` runs in one of two
//! modes, fixed when it is built:
//! - local: a provider roster plus chain clients; quotes are fetched and
//!   simulated in-process
//! - remote: a proxy endpoint that fetches and simulates on our behalf
//!
//! Either way the caller gets the same `QuoteSet`, picks a winner with a
//! `SelectionStrategy`, and can hand it to the executor.

pub mod fetcher;
pub mod orchestrator;
mod set;

pub use fetcher::{fetch_with_retry, RetryPolicy};
pub use orchestrator::Orchestrator;
pub use set::{identity, Indexed, QuoteSet, Transform};

use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chain::{ChainClient, ChainRegistry, RpcChainClient};
use crate::codec;
use crate::config::{AggregationOptions, Settings};
use crate::errors::{AggregatorError, CodecError, ConfigError, ExecutionError};
use crate::executor::{AllowanceMode, CallBuilder, ExecutionEngine, Settlement, Wallet};
use crate::provider::QuoteProvider;
use crate::proxy::{ProxyDelegate, ProxyRequest};
use crate::simulator::SimulationEngine;
use crate::strategy::{self, SelectionStrategy};
use crate::telemetry::Telemetry;
use crate::types::{BuiltCall, Quote, SimulatedQuote, SuccessfulQuote, SwapRequest};

enum Backend {
    Local {
        orchestrator: Orchestrator,
        simulator: SimulationEngine,
    },
    Remote(ProxyDelegate),
}

pub struct Aggregator {
    backend: Backend,
    options: AggregationOptions,
    calls: CallBuilder,
    executor: ExecutionEngine,
    allowance_mode: AllowanceMode,
    strategy: SelectionStrategy,
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    pub fn options(&self) -> &AggregationOptions {
        &self.options
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backend, Backend::Remote(_))
    }

    // ============================================
    // QUOTING
    // ============================================

    /// Raw provider quotes, unsimulated
    pub async fn quotes(&self, request: &SwapRequest) -> Result<QuoteSet<Quote>, AggregatorError> {
        match &self.backend {
            Backend::Local { orchestrator, .. } => {
                Ok(orchestrator.fetch_quotes(request, &self.options, identity())?)
            }
            Backend::Remote(proxy) => Ok(proxy
                .fetch(request, &self.options)
                .await?
                .map(|simulated| simulated.quote)),
        }
    }

    /// Quotes paired with their simulations, resolving independently
    pub async fn simulated_quotes(
        &self,
        request: &SwapRequest,
    ) -> Result<QuoteSet<SimulatedQuote>, AggregatorError> {
        self.simulated_quotes_with(request, &self.options).await
    }

    async fn simulated_quotes_with(
        &self,
        request: &SwapRequest,
        options: &AggregationOptions,
    ) -> Result<QuoteSet<SimulatedQuote>, AggregatorError> {
        match &self.backend {
            Backend::Local { orchestrator, simulator } => {
                let transform = simulator.transform(request)?;
                Ok(orchestrator.fetch_quotes(request, options, transform)?)
            }
            Backend::Remote(proxy) => proxy.fetch(request, options).await,
        }
    }

    /// Pick from an already-launched set with the configured strategy
    pub async fn select(
        &self,
        set: QuoteSet<SimulatedQuote>,
    ) -> Result<Option<SimulatedQuote>, AggregatorError> {
        Ok(strategy::select(set, &self.strategy).await?)
    }

    /// Winner under `strategy`; `Ok(None)` when nothing succeeded
    pub async fn best_quote(
        &self,
        request: &SwapRequest,
        strategy: &SelectionStrategy,
    ) -> Result<Option<SimulatedQuote>, AggregatorError> {
        let set = self.simulated_quotes(request).await?;
        Ok(strategy::select(set, strategy).await?)
    }

    /// Serve a proxied request: simulate locally, encode as NDJSON in completion order
    pub async fn serve(
        &self,
        body: ProxyRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, CodecError>>, AggregatorError> {
        let options = body.options.sanitized();
        let set = self.simulated_quotes_with(&body.request, &options).await?;
        Ok(codec::encode_stream(set))
    }

    // ============================================
    // EXECUTION
    // ============================================

    pub async fn build_calls(
        &self,
        quote: &SuccessfulQuote,
        request: &SwapRequest,
        force_approval: bool,
    ) -> Result<Vec<BuiltCall>, AggregatorError> {
        Ok(self
            .calls
            .build_calls(quote, request, self.allowance_mode, force_approval)
            .await?)
    }

    /// Build and submit the calls for a simulated winner
    pub async fn execute(
        &self,
        wallet: &dyn Wallet,
        request: &SwapRequest,
        winner: &SimulatedQuote,
        force_approval: bool,
    ) -> Result<Settlement, AggregatorError> {
        let quote = match winner.successful_quote() {
            Some(q) if winner.is_successful() => q,
            _ => {
                return Err(ExecutionError::QuoteNotSimulated {
                    provider: winner.provider().to_string(),
                }
                .into())
            }
        };
        let calls = self.build_calls(quote, request, force_approval).await?;
        Ok(self.executor.execute(wallet, request, winner, &calls).await?)
    }

    /// Quote, select and execute in one go. `Ok(None)` when no quote won.
    pub async fn swap(
        &self,
        wallet: &dyn Wallet,
        request: &SwapRequest,
    ) -> Result<Option<Settlement>, AggregatorError> {
        let Some(winner) = self.best_quote(request, &self.strategy).await? else {
            info!("no executable quote");
            return Ok(None);
        };
        self.execute(wallet, request, &winner, false).await.map(Some)
    }
}

// ============================================
// BUILDER
// ============================================

pub struct AggregatorBuilder {
    providers: Vec<Arc<dyn QuoteProvider>>,
    proxy_endpoint: Option<String>,
    chains: ChainRegistry,
    options: AggregationOptions,
    telemetry: Telemetry,
    balance_diff: bool,
    allowance_mode: AllowanceMode,
    strategy: SelectionStrategy,
    batch_poll_interval: Duration,
    batch_timeout: Duration,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            proxy_endpoint: None,
            chains: ChainRegistry::new(),
            options: AggregationOptions::default(),
            telemetry: Telemetry::default(),
            balance_diff: false,
            allowance_mode: AllowanceMode::Exact,
            strategy: SelectionStrategy::default(),
            batch_poll_interval: Duration::from_secs(1),
            batch_timeout: Duration::from_secs(120),
        }
    }
}

impl AggregatorBuilder {
    /// Everything except the provider roster, which is supplied by the embedder
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let mut chains = ChainRegistry::new();
        for (chain_id, url) in settings.rpc_endpoints()? {
            let client = RpcChainClient::new(&url, chain_id).map_err(|e| ConfigError::InvalidSetting {
                field: format!("rpc_urls.{chain_id}"),
                message: e.to_string(),
            })?;
            chains = chains.with_client(Arc::new(client));
        }

        let mut builder = Self::default()
            .chains(chains)
            .options(settings.options.clone())
            .balance_diff(settings.balance_diff_simulation)
            .allowance_mode(settings.allowance_mode)
            .strategy(settings.strategy()?)
            .batch_polling(settings.batch_poll_interval(), settings.batch_timeout());
        if let Some(endpoint) = &settings.proxy_endpoint {
            builder = builder.proxy(endpoint.clone());
        }
        Ok(builder)
    }

    pub fn provider(mut self, provider: Arc<dyn QuoteProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn QuoteProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn proxy(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = Some(endpoint.into());
        self
    }

    pub fn chain_client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.chains = self.chains.with_client(client);
        self
    }

    pub fn chains(mut self, chains: ChainRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn options(mut self, options: AggregationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn balance_diff(mut self, enabled: bool) -> Self {
        self.balance_diff = enabled;
        self
    }

    pub fn allowance_mode(mut self, mode: AllowanceMode) -> Self {
        self.allowance_mode = mode;
        self
    }

    pub fn strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn batch_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.batch_poll_interval = interval;
        self.batch_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Aggregator, ConfigError> {
        self.options.validate()?;
        let options = self.options.sanitized();

        let backend = match (self.providers.is_empty(), self.proxy_endpoint) {
            (false, Some(_)) => return Err(ConfigError::ConflictingModes),
            (true, None) => return Err(ConfigError::MissingBackend),
            (true, Some(endpoint)) => {
                info!(%endpoint, "aggregator in proxy mode");
                Backend::Remote(ProxyDelegate::new(endpoint))
            }
            (false, None) => {
                info!(providers = self.providers.len(), "aggregator in local mode");
                Backend::Local {
                    orchestrator: Orchestrator::new(self.providers, self.telemetry.child("orchestrator"))?,
                    simulator: SimulationEngine::new(self.chains.clone(), self.telemetry.clone())
                        .with_balance_diff(self.balance_diff),
                }
            }
        };

        Ok(Aggregator {
            backend,
            options,
            calls: CallBuilder::new(self.chains),
            executor: ExecutionEngine::new(self.telemetry.child("execute"))
                .with_batch_polling(self.batch_poll_interval, self.batch_timeout),
            allowance_mode: self.allowance_mode,
            strategy: self.strategy,
        })
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.backend {
            Backend::Local { orchestrator, .. } => format!("local({} providers)", orchestrator.providers().len()),
            Backend::Remote(proxy) => format!("remote({})", proxy.endpoint()),
        };
        f.debug_struct("Aggregator")
            .field("mode", &mode)
            .field("options", &self.options)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_stream;
    use crate::testing::{exact_in_request, MockChainClient, MockProvider, MockWallet};
    use crate::types::CallKind;
    use alloy_primitives::{Address, U256};
    use futures::StreamExt;

    fn router(n: u8) -> Address {
        Address::repeat_byte(0xd0 + n)
    }

    /// Two providers on Base routing through different routers
    fn base_aggregator(chain: MockChainClient) -> Aggregator {
        Aggregator::builder()
            .provider(Arc::new(
                MockProvider::new("A").with_router(router(1)).with_output(U256::from(900_000u64)),
            ))
            .provider(Arc::new(
                MockProvider::new("B").with_router(router(2)).with_output(U256::from(900_001u64)),
            ))
            .chain_client(Arc::new(chain))
            .build()
            .unwrap()
    }

    fn base_chain() -> MockChainClient {
        MockChainClient::new(8453)
            .with_route(router(1), U256::from(900_000u64), 180_000)
            .with_route(router(2), U256::from(900_001u64), 210_000)
    }

    #[test]
    fn test_modes_are_exclusive() {
        let both = Aggregator::builder()
            .provider(Arc::new(MockProvider::new("A")))
            .proxy("http://localhost:1")
            .build();
        assert!(matches!(both, Err(ConfigError::ConflictingModes)));
        assert!(matches!(Aggregator::builder().build(), Err(ConfigError::MissingBackend)));
    }

    #[tokio::test]
    async fn test_end_to_end_best_price_on_base() {
        let aggregator = base_aggregator(base_chain());
        let request = exact_in_request();
        assert_eq!(request.chain_id(), 8453);

        let winner = aggregator
            .best_quote(&request, &SelectionStrategy::BestPrice)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(winner.provider(), "B");
        assert_eq!(winner.simulated_output(), Some(U256::from(900_001u64)));
    }

    #[tokio::test]
    async fn test_missing_chain_client_fails_before_fetching() {
        let provider = Arc::new(MockProvider::new("A"));
        let aggregator = Aggregator::builder()
            .provider(provider.clone())
            .chain_client(Arc::new(MockChainClient::new(1)))
            .build()
            .unwrap();

        let result = aggregator.simulated_quotes(&exact_in_request()).await;
        assert!(matches!(
            result,
            Err(AggregatorError::Execution(ExecutionError::NoClientForChain(8453)))
        ));
        assert_eq!(provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_swap_executes_winner_sequentially() {
        let aggregator = base_aggregator(base_chain().with_allowance(U256::ZERO));
        let wallet = MockWallet::new(8453);

        let settlement = aggregator
            .swap(&wallet, &exact_in_request())
            .await
            .unwrap()
            .unwrap();

        let sent = wallet.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, router(2));
        assert_eq!(settlement.hash, MockWallet::hash_for(1));
    }

    #[tokio::test]
    async fn test_swap_without_winner_is_none() {
        let aggregator = base_aggregator(
            MockChainClient::new(8453)
                .with_reverting_route(router(1))
                .with_reverting_route(router(2)),
        );
        let wallet = MockWallet::new(8453);
        assert_eq!(aggregator.swap(&wallet, &exact_in_request()).await.unwrap(), None);
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn test_build_calls_respects_allowance() {
        let aggregator = base_aggregator(base_chain().with_allowance(U256::MAX));
        let winner = aggregator
            .best_quote(&exact_in_request(), &SelectionStrategy::Priority)
            .await
            .unwrap()
            .unwrap();
        let quote = winner.successful_quote().unwrap();

        let calls = aggregator.build_calls(quote, &exact_in_request(), false).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Swap);

        let forced = aggregator.build_calls(quote, &exact_in_request(), true).await.unwrap();
        assert_eq!(forced.len(), 2);
    }

    #[tokio::test]
    async fn test_serve_encodes_simulated_quotes() {
        let aggregator = base_aggregator(base_chain());
        let body = ProxyRequest {
            request: exact_in_request(),
            options: AggregationOptions::default(),
        };

        let lines = aggregator
            .serve(body)
            .await
            .unwrap()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut decoded: Vec<Indexed<SimulatedQuote>> = decode_stream(lines)
            .map(|r| r.unwrap())
            .collect()
            .await;
        decoded.sort_by_key(|item| item.index);

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].result.provider(), "A");
        assert!(decoded.iter().all(|d| d.result.is_successful()));
    }
}
