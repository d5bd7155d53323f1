//! swapscout - multi-provider swap quote aggregation
//!
//! Fans a swap request out to every capable quote provider, verifies each
//! quote by simulating its transaction against live chain state, picks a
//! winner under a selection strategy and turns it into on-chain calls.
//!
//! Pipeline:
//! - `aggregator`: retrying fetcher, capability-filtered orchestrator, facade
//! - `simulator`: what-if execution of quotes and outcome extraction
//! - `strategy`: winner selection over a still-resolving quote set
//! - `executor`: call building and atomic/sequential submission
//! - `codec` + `proxy`: newline-delimited wire format and remote delegation

pub mod aggregator;
pub mod chain;
pub mod codec;
pub mod config;
pub mod errors;
pub mod executor;
pub mod provider;
pub mod proxy;
pub mod simulator;
pub mod strategy;
pub mod telemetry;
pub mod tokens;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{Aggregator, AggregatorBuilder, Indexed, QuoteSet, Transform};
pub use chain::{ChainClient, ChainRegistry, RpcChainClient};
pub use config::{AggregationOptions, Settings};
pub use errors::{
    AggregatorError, CodecError, ConfigError, ExecutionError, ProviderError, QuoteError,
    SimulationError, StrategyError,
};
pub use executor::{
    AllowanceMode, CallBuilder, ExecutionEngine, ExecutionReport, ExecutionState, RpcWallet, Settlement, Wallet,
};
pub use provider::{Capabilities, Capability, QuoteProvider};
pub use proxy::ProxyDelegate;
pub use simulator::{SimulationEngine, TraceMode};
pub use strategy::SelectionStrategy;
pub use telemetry::Telemetry;
pub use types::{
    BuiltCall, CallKind, PerformanceMetrics, Quote, SimulatedQuote, SimulationResult,
    SuccessfulQuote, SwapAmount, SwapRequest, TxData,
};
