//! Shared request/quote/result types
//!
//! Every token amount is a `U256`. On the wire amounts travel as
//! `"bigint:<decimal>"` strings (see `codec::bigint`).

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::codec::bigint;
use crate::errors::{QuoteError, SimulationError};
use crate::tokens::is_native;

// ============================================
// SWAP REQUEST
// ============================================

/// Amount and direction of a swap. Exactly one amount exists per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum SwapAmount {
    /// Sell exactly this much of the input token
    #[serde(rename = "exactIn")]
    ExactIn {
        #[serde(rename = "inputAmount", with = "bigint")]
        input_amount: U256,
    },

    /// Buy exactly this much of the output token
    #[serde(rename = "targetOut")]
    TargetOut {
        #[serde(rename = "outputAmount", with = "bigint")]
        output_amount: U256,
    },
}

/// A desired trade. Built once, never mutated while in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSwapRequest")]
pub struct SwapRequest {
    chain_id: u64,
    input_token: Address,
    output_token: Address,
    #[serde(flatten)]
    amount: SwapAmount,
    slippage_bps: u16,
    swapper: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient: Option<Address>,
}

/// Wire shape of a request; the builder rules are re-applied on the way in
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSwapRequest {
    chain_id: u64,
    input_token: Address,
    output_token: Address,
    #[serde(flatten)]
    amount: SwapAmount,
    #[serde(default = "default_slippage_bps")]
    slippage_bps: u16,
    swapper: Address,
    #[serde(default)]
    recipient: Option<Address>,
}

fn default_slippage_bps() -> u16 {
    DEFAULT_SLIPPAGE_BPS
}

impl From<RawSwapRequest> for SwapRequest {
    fn from(raw: RawSwapRequest) -> Self {
        let request = Self {
            chain_id: raw.chain_id,
            input_token: raw.input_token,
            output_token: raw.output_token,
            amount: raw.amount,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            swapper: raw.swapper,
            recipient: None,
        }
        .with_slippage_bps(raw.slippage_bps);
        match raw.recipient {
            Some(recipient) => request.with_recipient(recipient),
            None => request,
        }
    }
}

/// Default slippage tolerance: 0.5%
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

impl SwapRequest {
    /// Sell `input_amount` of `input_token` for as much `output_token` as possible
    pub fn exact_in(
        chain_id: u64,
        input_token: Address,
        output_token: Address,
        input_amount: U256,
        swapper: Address,
    ) -> Self {
        Self {
            chain_id,
            input_token,
            output_token,
            amount: SwapAmount::ExactIn { input_amount },
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            swapper,
            recipient: None,
        }
    }

    /// Buy exactly `output_amount` of `output_token`
    pub fn target_out(
        chain_id: u64,
        input_token: Address,
        output_token: Address,
        output_amount: U256,
        swapper: Address,
    ) -> Self {
        Self {
            chain_id,
            input_token,
            output_token,
            amount: SwapAmount::TargetOut { output_amount },
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            swapper,
            recipient: None,
        }
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps.min(10_000);
        self
    }

    /// Send the output somewhere other than the swapper
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = (recipient != self.swapper).then_some(recipient);
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn input_token(&self) -> Address {
        self.input_token
    }

    pub fn output_token(&self) -> Address {
        self.output_token
    }

    pub fn amount(&self) -> SwapAmount {
        self.amount
    }

    pub fn slippage_bps(&self) -> u16 {
        self.slippage_bps
    }

    pub fn swapper(&self) -> Address {
        self.swapper
    }

    pub fn recipient(&self) -> Option<Address> {
        self.recipient
    }

    /// Account that ends up holding the output token
    pub fn beneficiary(&self) -> Address {
        self.recipient.unwrap_or(self.swapper)
    }

    pub fn is_native_input(&self) -> bool {
        is_native(&self.input_token)
    }

    pub fn is_native_output(&self) -> bool {
        is_native(&self.output_token)
    }

    /// Smallest acceptable output for a quoted amount under this request's slippage
    pub fn min_output(&self, quoted_output: U256) -> U256 {
        let keep = U256::from(10_000u64.saturating_sub(self.slippage_bps as u64));
        quoted_output.saturating_mul(keep) / U256::from(10_000u64)
    }
}

// ============================================
// QUOTES
// ============================================

/// An executable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub to: Address,
    pub data: Bytes,
    #[serde(with = "bigint", default)]
    pub value: U256,
}

impl TxData {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self { to, data, value: U256::ZERO }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Token allowance a quote needs before its swap can execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub token: Address,
    pub spender: Address,
    #[serde(with = "bigint")]
    pub amount: U256,
}

/// One leg of a quoted route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHop {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<Address>,
    pub token_in: Address,
    pub token_out: Address,
    /// Portion of the input routed through this hop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_bps: Option<u16>,
}

/// Pricing metadata reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_impact_bps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "bigint::option")]
    pub integrator_fee_amount: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<u64>,
}

/// A quote a provider returned successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessfulQuote {
    pub provider: String,
    #[serde(with = "bigint")]
    pub output_amount: U256,
    #[serde(with = "bigint")]
    pub input_amount: U256,
    #[serde(with = "bigint")]
    pub network_fee: U256,
    pub tx_data: TxData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<RouteHop>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

/// A provider that produced no usable quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedQuote {
    pub provider: String,
    pub error: QuoteError,
}

/// One provider's answer to a swap request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Quote {
    Successful(SuccessfulQuote),
    Failed(FailedQuote),
}

impl Quote {
    pub fn failed(provider: impl Into<String>, error: QuoteError) -> Self {
        Quote::Failed(FailedQuote {
            provider: provider.into(),
            error,
        })
    }

    pub fn provider(&self) -> &str {
        match self {
            Quote::Successful(q) => &q.provider,
            Quote::Failed(q) => &q.provider,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Quote::Successful(_))
    }

    pub fn as_successful(&self) -> Option<&SuccessfulQuote> {
        match self {
            Quote::Successful(q) => Some(q),
            Quote::Failed(_) => None,
        }
    }
}

// ============================================
// SIMULATION
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    Success,
    Failure,
}

/// Raw outcome of one call inside a simulated batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub status: CallStatus,
    pub gas_used: u64,
    pub return_data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResult {
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }
}

/// Realized outcome of a quote executed against chain state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSuccess {
    #[serde(with = "bigint")]
    pub output_amount: U256,
    pub gas_used: u64,
    pub latency_ms: u64,
    pub block_number: u64,
    pub per_call_results: Vec<CallResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SimulationResult {
    Success(SimulationSuccess),
    Failure { error: SimulationError },
}

impl SimulationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SimulationResult::Success(_))
    }
}

/// How closely a simulated outcome matched what the provider quoted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub latency_ms: u64,
    pub gas_used: u64,
    #[serde(with = "bigint")]
    pub output_amount: U256,
    /// Signed deviation of realized from quoted output
    pub price_delta_bps: i64,
    pub accuracy_bps: u64,
}

impl PerformanceMetrics {
    pub fn new(quoted_output: U256, simulation: &SimulationSuccess) -> Self {
        let price_delta_bps = price_delta_bps(simulation.output_amount, quoted_output);
        Self {
            latency_ms: simulation.latency_ms,
            gas_used: simulation.gas_used,
            output_amount: simulation.output_amount,
            price_delta_bps,
            accuracy_bps: price_delta_bps.unsigned_abs(),
        }
    }
}

/// `(realized - quoted) * 10000 / quoted`, truncated toward zero.
/// A zero quote has no meaningful delta and reports 0.
pub fn price_delta_bps(realized: U256, quoted: U256) -> i64 {
    if quoted.is_zero() {
        return 0;
    }
    let (magnitude, negative) = if realized >= quoted {
        (realized - quoted, false)
    } else {
        (quoted - realized, true)
    };
    let bps = magnitude.saturating_mul(U256::from(10_000u64)) / quoted;
    let bps = if bps > U256::from(i64::MAX as u64) {
        i64::MAX
    } else {
        bps.to::<u64>() as i64
    };
    if negative {
        -bps
    } else {
        bps
    }
}

/// A quote paired with its simulation. Only the simulation engine (or the
/// wire codec, for results simulated remotely) produces these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedQuote {
    pub quote: Quote,
    pub simulation: SimulationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerformanceMetrics>,
}

impl SimulatedQuote {
    pub fn new(quote: Quote, simulation: SimulationResult) -> Self {
        let metrics = match (&quote, &simulation) {
            (Quote::Successful(q), SimulationResult::Success(s)) => {
                Some(PerformanceMetrics::new(q.output_amount, s))
            }
            _ => None,
        };
        Self {
            quote,
            simulation,
            metrics,
        }
    }

    pub fn provider(&self) -> &str {
        self.quote.provider()
    }

    /// Both the quote and its simulation succeeded
    pub fn is_successful(&self) -> bool {
        self.quote.is_successful() && self.simulation.is_success()
    }

    pub fn successful_quote(&self) -> Option<&SuccessfulQuote> {
        self.quote.as_successful()
    }

    pub fn simulation_success(&self) -> Option<&SimulationSuccess> {
        match &self.simulation {
            SimulationResult::Success(s) if self.quote.is_successful() => Some(s),
            _ => None,
        }
    }

    pub fn simulated_output(&self) -> Option<U256> {
        self.simulation_success().map(|s| s.output_amount)
    }

    pub fn gas_used(&self) -> Option<u64> {
        self.simulation_success().map(|s| s.gas_used)
    }
}

// ============================================
// BUILT CALLS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallKind {
    Approval,
    Swap,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallKind::Approval => write!(f, "approval"),
            CallKind::Swap => write!(f, "swap"),
        }
    }
}

/// An on-chain call ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltCall {
    #[serde(rename = "type")]
    pub kind: CallKind,
    #[serde(rename = "txn")]
    pub tx: TxData,
}
