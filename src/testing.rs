//! Test doubles shared across module tests

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use crate::chain::{
    AssetChange, ChainClient, IMulticall3, SimulateCallsOutcome, SimulateCallsRequest, IERC20,
};
use crate::config::AggregationOptions;
use crate::errors::{ProviderError, QuoteError, SimulationError};
use crate::executor::{BatchState, BatchStatus, Receipt, Wallet};
use crate::provider::{Capabilities, Capability, QuoteProvider};
use crate::tokens::NATIVE_TOKEN;
use crate::types::{
    Approval, CallResult, CallStatus, Quote, SimulatedQuote, SimulationResult, SimulationSuccess,
    SuccessfulQuote, SwapRequest, TxData,
};

// ============================================
// FIXTURES
// ============================================

pub const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
pub const WETH: Address = address!("4200000000000000000000000000000000000006");
pub const ROUTER: Address = address!("00000000000000000000000000000000000000d0");
pub const SWAPPER: Address = address!("00000000000000000000000000000000000000aa");

/// Base, 500 USDC in, WETH out
pub fn exact_in_request() -> SwapRequest {
    SwapRequest::exact_in(8453, USDC, WETH, U256::from(500_000_000u64), SWAPPER)
}

pub fn successful_quote(provider: &str, output: U256) -> SuccessfulQuote {
    successful_quote_via(provider, output, ROUTER)
}

pub fn successful_quote_via(provider: &str, output: U256, router: Address) -> SuccessfulQuote {
    let input_amount = U256::from(500_000_000u64);
    SuccessfulQuote {
        provider: provider.to_string(),
        output_amount: output,
        input_amount,
        network_fee: U256::from(21_000_000_000u64),
        tx_data: TxData::new(router, Bytes::from(vec![0x12, 0x34, 0x56, 0x78])),
        approval: Some(Approval {
            token: USDC,
            spender: router,
            amount: input_amount,
        }),
        route: None,
        pricing: None,
    }
}

pub fn sample_quote(provider: &str, output: U256) -> Quote {
    Quote::Successful(successful_quote(provider, output))
}

pub fn sample_simulated(provider: &str, quoted: U256, realized: U256, gas_used: u64) -> SimulatedQuote {
    SimulatedQuote::new(
        sample_quote(provider, quoted),
        SimulationResult::Success(SimulationSuccess {
            output_amount: realized,
            gas_used,
            latency_ms: 12,
            block_number: 19_000_000,
            per_call_results: vec![],
        }),
    )
}

pub fn failed_simulated(provider: &str) -> SimulatedQuote {
    SimulatedQuote::new(
        Quote::failed(provider, QuoteError::DeadlineExceeded { deadline_ms: 8_000 }),
        SimulationResult::Failure {
            error: SimulationError::QuoteNotSuccessful,
        },
    )
}

/// Formatted log output captured through an injected dispatcher
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Dispatcher writing every event, debug included, into this capture
    pub fn dispatch(&self) -> Dispatch {
        let writer = self.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .with_filter(LevelFilter::DEBUG),
        );
        Dispatch::new(subscriber)
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

// ============================================
// PROVIDER
// ============================================

pub struct MockProvider {
    id: String,
    capabilities: Capabilities,
    output: U256,
    router: Address,
    fail_first: u32,
    always_fail: bool,
    hang: bool,
    calls: AtomicU32,
    created: Instant,
    attempts_at: Mutex<Vec<Duration>>,
}

impl MockProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            capabilities: Capabilities::new([
                Capability::ExactIn,
                Capability::TargetOut,
                Capability::IntegratorFee,
                Capability::IntegratorSurplus,
            ]),
            output: U256::from(900_000u64),
            router: ROUTER,
            fail_first: 0,
            always_fail: false,
            hang: false,
            calls: AtomicU32::new(0),
            created: Instant::now(),
            attempts_at: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = Capabilities::new(capabilities);
        self
    }

    pub fn with_output(mut self, output: U256) -> Self {
        self.output = output;
        self
    }

    pub fn with_router(mut self, router: Address) -> Self {
        self.router = router;
        self
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn pending_forever(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each attempt started, relative to construction
    pub fn attempt_offsets(&self) -> Vec<Duration> {
        self.attempts_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    async fn fetch_quote(
        &self,
        _request: &SwapRequest,
        _options: &AggregationOptions,
    ) -> Result<SuccessfulQuote, ProviderError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempts_at.lock().unwrap().push(self.created.elapsed());

        if self.hang {
            futures::future::pending::<()>().await;
        }
        if self.always_fail || attempt <= self.fail_first {
            return Err(ProviderError::new("mock upstream unavailable")
                .with_response(503, r#"{"error":"unavailable"}"#));
        }
        Ok(successful_quote_via("mock", self.output, self.router))
    }
}

// ============================================
// CHAIN CLIENT
// ============================================

const BASE_BALANCE: u64 = 1_000;

pub struct MockChainClient {
    chain_id: u64,
    routes: HashMap<Address, (U256, u64)>,
    reverting: HashSet<Address>,
    allowance: U256,
    batches: Mutex<Vec<SimulateCallsRequest>>,
    views: Mutex<Vec<Address>>,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            routes: HashMap::new(),
            reverting: HashSet::new(),
            allowance: U256::ZERO,
            batches: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }

    /// Swaps through `router` deliver `output` and burn `gas`
    pub fn with_route(mut self, router: Address, output: U256, gas: u64) -> Self {
        self.routes.insert(router, (output, gas));
        self
    }

    pub fn with_reverting_route(mut self, router: Address) -> Self {
        self.reverting.insert(router);
        self
    }

    pub fn with_allowance(mut self, allowance: U256) -> Self {
        self.allowance = allowance;
        self
    }

    pub fn simulated_batches(&self) -> Vec<SimulateCallsRequest> {
        self.batches.lock().unwrap().clone()
    }

    /// Targets of every view call, in order
    pub fn view_calls(&self) -> Vec<Address> {
        self.views.lock().unwrap().clone()
    }

    fn is_probe(data: &Bytes) -> bool {
        data.starts_with(&IERC20::balanceOfCall::SELECTOR)
            || data.starts_with(&IMulticall3::getEthBalanceCall::SELECTOR)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn simulate_calls(&self, request: SimulateCallsRequest) -> eyre::Result<SimulateCallsOutcome> {
        self.batches.lock().unwrap().push(request.clone());

        let base = U256::from(BASE_BALANCE);
        let mut delivered = U256::ZERO;
        let mut results = Vec::with_capacity(request.calls.len());

        for call in &request.calls {
            let result = if self.reverting.contains(&call.to) {
                CallResult {
                    status: CallStatus::Failure,
                    gas_used: 30_000,
                    return_data: Bytes::from(vec![0x08, 0xc3, 0x79, 0xa0]),
                    error: Some("execution reverted".to_string()),
                }
            } else if let Some((output, gas)) = self.routes.get(&call.to) {
                delivered += *output;
                CallResult {
                    status: CallStatus::Success,
                    gas_used: *gas,
                    return_data: Bytes::new(),
                    error: None,
                }
            } else if Self::is_probe(&call.data) {
                CallResult {
                    status: CallStatus::Success,
                    gas_used: 2_600,
                    return_data: word(base + delivered),
                    error: None,
                }
            } else {
                CallResult {
                    status: CallStatus::Success,
                    gas_used: 46_000,
                    return_data: word(U256::from(1u64)),
                    error: None,
                }
            };
            results.push(result);
        }

        let asset_changes = if request.trace_asset_changes {
            let token = request
                .calls
                .iter()
                .find(|c| c.data.starts_with(&IERC20::balanceOfCall::SELECTOR))
                .map(|c| c.to)
                .unwrap_or(NATIVE_TOKEN);
            vec![AssetChange {
                token,
                pre: base,
                post: base + delivered,
            }]
        } else {
            vec![]
        };

        Ok(SimulateCallsOutcome {
            block_number: 19_000_000,
            results,
            asset_changes,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        self.views.lock().unwrap().push(to);
        if data.starts_with(&IERC20::allowanceCall::SELECTOR) {
            return Ok(word(self.allowance));
        }
        Err(eyre::eyre!("unexpected view call to {}", to))
    }
}

// ============================================
// WALLET
// ============================================

pub struct MockWallet {
    chain_id: u64,
    /// Number of pending polls before an atomic batch settles; `None` = no EIP-5792
    atomic: Option<usize>,
    batch_code: u64,
    failing_receipt: Option<usize>,
    sent: Mutex<Vec<TxData>>,
    batches: Mutex<Vec<Vec<TxData>>>,
    polls: AtomicUsize,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            atomic: None,
            batch_code: 200,
            failing_receipt: None,
            sent: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn with_atomic_batches(mut self, pending_polls: usize) -> Self {
        self.atomic = Some(pending_polls);
        self
    }

    pub fn with_batch_code(mut self, code: u64) -> Self {
        self.batch_code = code;
        self
    }

    pub fn with_failing_receipt(mut self, index: usize) -> Self {
        self.failing_receipt = Some(index);
        self
    }

    /// Hash assigned to the `index`-th transaction
    pub fn hash_for(index: usize) -> B256 {
        B256::from(U256::from(index as u64 + 1))
    }

    pub fn sent(&self) -> Vec<TxData> {
        self.sent.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<TxData>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        SWAPPER
    }

    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(self.chain_id)
    }

    async fn supports_atomic_batch(&self, _chain_id: u64) -> eyre::Result<bool> {
        Ok(self.atomic.is_some())
    }

    async fn send_calls(&self, _chain_id: u64, calls: &[TxData]) -> eyre::Result<String> {
        self.batches.lock().unwrap().push(calls.to_vec());
        Ok("batch-1".to_string())
    }

    async fn calls_status(&self, _batch_id: &str) -> eyre::Result<BatchStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.atomic.unwrap_or(0) {
            return Ok(BatchStatus {
                state: BatchState::Pending,
                receipts: vec![],
            });
        }

        let calls = self.batches.lock().unwrap().last().map(Vec::len).unwrap_or(0);
        let state = BatchState::from_code(self.batch_code);
        let receipts = if state == BatchState::Confirmed {
            (0..calls)
                .map(|i| Receipt {
                    transaction_hash: Self::hash_for(i),
                    success: true,
                    block_number: Some(19_000_001),
                })
                .collect()
        } else {
            vec![]
        };
        Ok(BatchStatus { state, receipts })
    }

    async fn send_transaction(&self, tx: &TxData) -> eyre::Result<B256> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx.clone());
        Ok(Self::hash_for(sent.len() - 1))
    }

    async fn wait_for_receipt(&self, hash: B256) -> eyre::Result<Receipt> {
        let success = self.failing_receipt.map_or(true, |i| hash != Self::hash_for(i));
        Ok(Receipt {
            transaction_hash: hash,
            success,
            block_number: Some(19_000_001),
        })
    }
}
