//! Error taxonomy
//!
//! Provider and deadline failures never escape the orchestrator: they become
//! `Quote::Failed` values carrying a `QuoteError`. Simulation failures become
//! `SimulationResult::Failure` values carrying a `SimulationError`. Everything
//! else is a configuration or precondition problem and is returned as `Err`.

use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Capabilities;
use crate::types::{CallResult, TxData};

// ============================================
// QUOTE-LEVEL (degraded into Failed quotes)
// ============================================

/// Error raised by a provider adapter, with the raw upstream response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Attach the upstream HTTP status and response body
    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.status = Some(status);
        self.body = Some(body.into());
        self
    }
}

/// Why a provider's quote is `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QuoteError {
    #[error("provider error: {message}")]
    Provider {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    /// Synthetic failure from the fetcher's deadline timer
    #[error("deadline of {deadline_ms}ms exceeded")]
    #[serde(rename_all = "camelCase")]
    DeadlineExceeded { deadline_ms: u64 },

    /// The fetch task panicked or was torn down
    #[error("quote task aborted: {message}")]
    TaskAborted { message: String },
}

impl From<ProviderError> for QuoteError {
    fn from(err: ProviderError) -> Self {
        QuoteError::Provider {
            message: err.message,
            status: err.status,
            body: err.body,
        }
    }
}

// ============================================
// SIMULATION-LEVEL (degraded into failed simulations)
// ============================================

/// A call inside a simulated batch failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRevert {
    pub call_index: usize,
    pub call: TxData,
    pub result: CallResult,
    pub block_number: u64,
}

impl std::fmt::Display for SimulationRevert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "call {} to {} reverted at block {}: {} (0x{})",
            self.call_index,
            self.call.to,
            self.block_number,
            self.result.error.as_deref().unwrap_or("execution reverted"),
            hex::encode(&self.result.return_data)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SimulationError {
    #[error("simulation reverted: {0}")]
    Revert(SimulationRevert),

    /// Route executed but delivered nothing
    #[error("realized output {delta} is not positive")]
    NonPositiveOutput { delta: String },

    #[error("output token {token} missing from asset changes")]
    OutputNotTraced { token: String },

    #[error("chain client error: {message}")]
    Client { message: String },

    /// The quote itself failed, so there was nothing to simulate
    #[error("quote was not successful")]
    QuoteNotSuccessful,
}

// ============================================
// PIPELINE-LEVEL (returned as Err)
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no quote providers configured")]
    NoProviders,

    #[error("no configured provider supports the required capabilities {required}")]
    NoCapableProviders { required: Capabilities },

    #[error("inconsistent integrator options: {0}")]
    InconsistentIntegratorOptions(String),

    #[error("providers and a proxy endpoint are mutually exclusive")]
    ConflictingModes,

    #[error("neither providers nor a proxy endpoint configured")]
    MissingBackend,

    #[error("invalid setting {field}: {message}")]
    InvalidSetting { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("wallet is on chain {actual} but the request targets chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("quote from {provider} did not pass simulation")]
    QuoteNotSimulated { provider: String },

    #[error("no chain client available for chain {0}")]
    NoClientForChain(u64),

    #[error("nothing to execute")]
    NoCalls,

    #[error("batch {batch_id} settled with status {status}")]
    BatchFailed { batch_id: String, status: String },

    #[error("batch {batch_id} did not settle within {timeout_ms}ms")]
    BatchTimeout { batch_id: String, timeout_ms: u64 },

    #[error("transaction {index} ({hash}) failed on-chain")]
    TransactionFailed { index: usize, hash: B256 },

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("allowance read failed: {0}")]
    AllowanceRead(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("strategy received an empty candidate set")]
    EmptyCandidates,

    #[error("unknown selection strategy: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream framing error: {0}")]
    Framing(#[from] tokio_util::codec::LinesCodecError),
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("proxy request failed: {0}")]
    Proxy(String),
}

/// Revert payload in a form suitable for log lines
pub fn describe_return_data(data: &Bytes) -> String {
    if data.is_empty() {
        "<empty>".to_string()
    } else {
        format!("0x{}", hex::encode(data))
    }
}
