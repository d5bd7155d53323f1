//! The Executor
//!
//! This module handles turning a selected quote into settled on-chain state:
//! - Building the approval/swap calls (`calls`)
//! - Signing and submitting through a wallet (`wallet`)
//! - Driving atomic (EIP-5792) or sequential submission to a terminal state
//!
//! ⚠️  WARNING: This module interacts with real funds!
//! Nothing here is retried. Every failure after broadcast is surfaced as an error.

mod calls;
mod wallet;

pub use calls::{AllowanceMode, CallBuilder};
pub use wallet::{BatchState, BatchStatus, Receipt, RpcWallet, Wallet};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::ExecutionError;
use crate::telemetry::Telemetry;
use crate::types::{BuiltCall, SimulatedQuote, SwapRequest, TxData};

/// Where an execution is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    CheckingBatchCapability,
    Atomic,
    Sequential,
    Settled,
    Failed,
}

/// How the calls reached the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionMode {
    Atomic,
    Sequential,
}

/// Result of a settled execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    /// Receipt hash of the final call
    pub hash: B256,
    pub mode: SubmissionMode,
}

/// A finished execution together with every state it passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub path: Vec<ExecutionState>,
    pub result: Result<Settlement, ExecutionError>,
}

impl ExecutionReport {
    /// `Settled` or `Failed`
    pub fn terminal_state(&self) -> ExecutionState {
        self.path.last().copied().unwrap_or(ExecutionState::Idle)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    poll_interval: Duration,
    batch_timeout: Duration,
    telemetry: Telemetry,
}

impl ExecutionEngine {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_timeout: Duration::from_secs(120),
            telemetry,
        }
    }

    pub fn with_batch_polling(mut self, poll_interval: Duration, batch_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.batch_timeout = batch_timeout;
        self
    }

    /// Submit built calls for a quote that passed simulation
    pub async fn execute(
        &self,
        wallet: &dyn Wallet,
        request: &SwapRequest,
        quote: &SimulatedQuote,
        calls: &[BuiltCall],
    ) -> Result<Settlement, ExecutionError> {
        self.execute_with_report(wallet, request, quote, calls).await.result
    }

    /// Like `execute`, also reporting the state path
    pub async fn execute_with_report(
        &self,
        wallet: &dyn Wallet,
        request: &SwapRequest,
        quote: &SimulatedQuote,
        calls: &[BuiltCall],
    ) -> ExecutionReport {
        let mut path = vec![ExecutionState::Idle];

        let result = self
            .telemetry
            .instrument(self.drive(&mut path, wallet, request, quote, calls))
            .await;
        let terminal = if result.is_ok() {
            ExecutionState::Settled
        } else {
            ExecutionState::Failed
        };
        transition(&mut path, terminal);

        match &result {
            Ok(settlement) => info!(hash = ?settlement.hash, mode = ?settlement.mode, "swap settled"),
            Err(e) => warn!("execution failed: {}", e),
        }
        ExecutionReport { path, result }
    }

    async fn drive(
        &self,
        path: &mut Vec<ExecutionState>,
        wallet: &dyn Wallet,
        request: &SwapRequest,
        quote: &SimulatedQuote,
        calls: &[BuiltCall],
    ) -> Result<Settlement, ExecutionError> {
        // ============================================
        // PRECONDITIONS (nothing sent yet)
        // ============================================

        if !quote.is_successful() {
            return Err(ExecutionError::QuoteNotSimulated {
                provider: quote.provider().to_string(),
            });
        }
        if calls.is_empty() {
            return Err(ExecutionError::NoCalls);
        }

        let active = wallet.chain_id().await.map_err(wallet_error)?;
        if active != request.chain_id() {
            return Err(ExecutionError::ChainMismatch {
                expected: request.chain_id(),
                actual: active,
            });
        }

        transition(path, ExecutionState::CheckingBatchCapability);
        let atomic = wallet
            .supports_atomic_batch(active)
            .await
            .map_err(wallet_error)?;

        let txs: Vec<TxData> = calls.iter().map(|c| c.tx.clone()).collect();
        if atomic {
            transition(path, ExecutionState::Atomic);
            self.submit_atomic(wallet, active, &txs).await
        } else {
            transition(path, ExecutionState::Sequential);
            submit_sequential(wallet, &txs).await
        }
    }

    async fn submit_atomic(
        &self,
        wallet: &dyn Wallet,
        chain_id: u64,
        txs: &[TxData],
    ) -> Result<Settlement, ExecutionError> {
        let batch_id = wallet.send_calls(chain_id, txs).await.map_err(wallet_error)?;
        info!(%batch_id, calls = txs.len(), "atomic batch submitted");

        let started = Instant::now();
        loop {
            let status = wallet.calls_status(&batch_id).await.map_err(wallet_error)?;
            match status.state {
                BatchState::Pending => {
                    if started.elapsed() >= self.batch_timeout {
                        return Err(ExecutionError::BatchTimeout {
                            batch_id,
                            timeout_ms: self.batch_timeout.as_millis() as u64,
                        });
                    }
                    sleep(self.poll_interval).await;
                }
                BatchState::Confirmed => {
                    let last = status.receipts.last().ok_or_else(|| ExecutionError::BatchFailed {
                        batch_id: batch_id.clone(),
                        status: "confirmed without receipts".to_string(),
                    })?;
                    if let Some(failed) = status.receipts.iter().find(|r| !r.success) {
                        return Err(ExecutionError::BatchFailed {
                            batch_id,
                            status: format!("receipt {} reverted", failed.transaction_hash),
                        });
                    }
                    return Ok(Settlement {
                        hash: last.transaction_hash,
                        mode: SubmissionMode::Atomic,
                    });
                }
                BatchState::Failed(code) => {
                    return Err(ExecutionError::BatchFailed {
                        batch_id,
                        status: code.to_string(),
                    });
                }
            }
        }
    }
}

/// One transaction at a time, each gated on the previous receipt
async fn submit_sequential(wallet: &dyn Wallet, txs: &[TxData]) -> Result<Settlement, ExecutionError> {
    let mut last = None;
    for (index, tx) in txs.iter().enumerate() {
        let hash = wallet.send_transaction(tx).await.map_err(wallet_error)?;
        let receipt = wallet.wait_for_receipt(hash).await.map_err(wallet_error)?;
        if !receipt.success {
            return Err(ExecutionError::TransactionFailed { index, hash });
        }
        debug!(index, ?hash, "transaction confirmed");
        last = Some(hash);
    }
    last.map(|hash| Settlement {
        hash,
        mode: SubmissionMode::Sequential,
    })
    .ok_or(ExecutionError::NoCalls)
}

fn transition(path: &mut Vec<ExecutionState>, next: ExecutionState) {
    debug!(from = ?path.last(), to = ?next, "execution state");
    path.push(next);
}

fn wallet_error(e: eyre::Report) -> ExecutionError {
    ExecutionError::Wallet(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exact_in_request, failed_simulated, sample_simulated, MockWallet};
    use crate::types::CallKind;
    use alloy_primitives::{Address, Bytes, U256};

    fn calls(n: usize) -> Vec<BuiltCall> {
        (0..n)
            .map(|i| BuiltCall {
                kind: if i + 1 == n { CallKind::Swap } else { CallKind::Approval },
                tx: TxData::new(Address::repeat_byte(i as u8 + 1), Bytes::new()),
            })
            .collect()
    }

    fn winner() -> SimulatedQuote {
        sample_simulated("a", U256::from(900_000u64), U256::from(900_001u64), 150_000)
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Telemetry::default())
            .with_batch_polling(Duration::from_millis(100), Duration::from_secs(5))
    }

    use ExecutionState::*;

    #[tokio::test]
    async fn test_chain_mismatch_sends_nothing() {
        let wallet = MockWallet::new(1);
        let report = engine()
            .execute_with_report(&wallet, &exact_in_request(), &winner(), &calls(2))
            .await;

        assert_eq!(
            report.result,
            Err(ExecutionError::ChainMismatch { expected: 8453, actual: 1 })
        );
        assert_eq!(report.path, vec![Idle, Failed]);
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unsimulated_quote_rejected() {
        let wallet = MockWallet::new(8453);
        let result = engine()
            .execute(&wallet, &exact_in_request(), &failed_simulated("a"), &calls(1))
            .await;

        assert!(matches!(result, Err(ExecutionError::QuoteNotSimulated { .. })));
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_atomic_batch_returns_last_receipt() {
        let wallet = MockWallet::new(8453).with_atomic_batches(2);
        let settlement = engine()
            .execute(&wallet, &exact_in_request(), &winner(), &calls(2))
            .await
            .unwrap();

        assert_eq!(settlement.mode, SubmissionMode::Atomic);
        assert_eq!(settlement.hash, MockWallet::hash_for(1));
        assert_eq!(wallet.batches().len(), 1);
        assert_eq!(wallet.batches()[0].len(), 2);
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_status_is_error() {
        let wallet = MockWallet::new(8453).with_atomic_batches(0).with_batch_code(500);
        let report = engine()
            .execute_with_report(&wallet, &exact_in_request(), &winner(), &calls(2))
            .await;
        assert!(matches!(report.result, Err(ExecutionError::BatchFailed { ref status, .. }) if status == "500"));
        assert_eq!(report.path, vec![Idle, CheckingBatchCapability, Atomic, Failed]);
        assert_eq!(report.terminal_state(), Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_paths_by_submission_mode() {
        let atomic = engine()
            .execute_with_report(&MockWallet::new(8453).with_atomic_batches(1), &exact_in_request(), &winner(), &calls(2))
            .await;
        assert_eq!(atomic.path, vec![Idle, CheckingBatchCapability, Atomic, Settled]);

        let sequential = engine()
            .execute_with_report(&MockWallet::new(8453), &exact_in_request(), &winner(), &calls(2))
            .await;
        assert_eq!(sequential.path, vec![Idle, CheckingBatchCapability, Sequential, Settled]);
        assert_eq!(sequential.terminal_state(), Settled);
    }

    #[tokio::test]
    async fn test_sequential_in_order() {
        let wallet = MockWallet::new(8453);
        let settlement = engine()
            .execute(&wallet, &exact_in_request(), &winner(), &calls(2))
            .await
            .unwrap();

        assert_eq!(settlement.mode, SubmissionMode::Sequential);
        let sent: Vec<Address> = wallet.sent().iter().map(|tx| tx.to).collect();
        assert_eq!(sent, vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
        assert_eq!(settlement.hash, MockWallet::hash_for(1));
    }

    #[tokio::test]
    async fn test_sequential_aborts_on_failed_receipt() {
        let wallet = MockWallet::new(8453).with_failing_receipt(0);
        let result = engine().execute(&wallet, &exact_in_request(), &winner(), &calls(2)).await;

        assert_eq!(
            result,
            Err(ExecutionError::TransactionFailed { index: 0, hash: MockWallet::hash_for(0) })
        );
        assert_eq!(wallet.sent().len(), 1);
    }
}
