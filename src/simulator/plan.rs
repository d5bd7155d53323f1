//! Call planning and outcome extraction
//!
//! Turns a quote into the ordered batch the chain client simulates, then
//! reads the realized output back out of whatever that batch produced.

use alloy_primitives::{Address, Bytes, I256, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::chain::{IMulticall3, SimulateCallsOutcome, IERC20};
use crate::errors::{SimulationError, SimulationRevert};
use crate::tokens::{MULTICALL3, NATIVE_TOKEN};
use crate::types::{CallResult, SuccessfulQuote, SwapRequest, TxData};

/// Where the realized output is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceMode {
    /// Client-side asset-change ledger for the swapper
    AssetChanges,
    /// Balance probes bracketing the swap, read for the beneficiary
    BalanceDiff,
}

/// The batch for one quote, with the positions that matter afterwards
#[derive(Debug, Clone)]
pub struct CallPlan {
    pub calls: Vec<TxData>,
    pub swap_index: usize,
    pub mode: TraceMode,
    /// (before, after) balance probe positions in `BalanceDiff` mode
    pub probes: Option<(usize, usize)>,
    /// Ledger key for the output asset in `AssetChanges` mode
    pub output_asset: Address,
}

impl CallPlan {
    pub fn build(request: &SwapRequest, quote: &SuccessfulQuote, mode: TraceMode) -> Self {
        let mut calls = Vec::with_capacity(4);

        if !request.is_native_input() {
            let spender = quote
                .approval
                .as_ref()
                .map(|a| a.spender)
                .unwrap_or(quote.tx_data.to);
            calls.push(approve_call(request.input_token(), spender, quote.input_amount));
        }

        let output_asset = if request.is_native_output() {
            NATIVE_TOKEN
        } else {
            request.output_token()
        };

        match mode {
            TraceMode::AssetChanges => {
                let swap_index = calls.len();
                calls.push(quote.tx_data.clone());
                if !request.is_native_output() {
                    // touch the output token so the ledger picks it up
                    calls.push(balance_probe(request, request.swapper()));
                }
                Self {
                    calls,
                    swap_index,
                    mode,
                    probes: None,
                    output_asset,
                }
            }
            TraceMode::BalanceDiff => {
                let holder = request.beneficiary();
                let before = calls.len();
                calls.push(balance_probe(request, holder));
                let swap_index = calls.len();
                calls.push(quote.tx_data.clone());
                let after = calls.len();
                calls.push(balance_probe(request, holder));
                Self {
                    calls,
                    swap_index,
                    mode,
                    probes: Some((before, after)),
                    output_asset,
                }
            }
        }
    }

    /// First failing call in the batch, if any
    pub fn first_revert(&self, outcome: &SimulateCallsOutcome) -> Option<SimulationRevert> {
        outcome
            .results
            .iter()
            .enumerate()
            .find(|(_, r)| !r.is_success())
            .map(|(call_index, result)| SimulationRevert {
                call_index,
                call: self.calls[call_index].clone(),
                result: result.clone(),
                block_number: outcome.block_number,
            })
    }

    pub fn swap_result<'a>(&self, outcome: &'a SimulateCallsOutcome) -> Option<&'a CallResult> {
        outcome.results.get(self.swap_index)
    }

    /// Realized output; anything not strictly positive is a failure
    pub fn realized_output(&self, outcome: &SimulateCallsOutcome) -> Result<U256, SimulationError> {
        let (pre, post) = match (self.mode, self.probes) {
            (TraceMode::BalanceDiff, Some((before, after))) => {
                let read = |index: usize| {
                    outcome
                        .results
                        .get(index)
                        .and_then(decode_word)
                        .ok_or_else(|| SimulationError::Client {
                            message: format!("balance probe {index} returned no balance"),
                        })
                };
                (read(before)?, read(after)?)
            }
            _ => {
                let change = outcome.asset_change(&self.output_asset).ok_or_else(|| {
                    SimulationError::OutputNotTraced {
                        token: self.output_asset.to_string(),
                    }
                })?;
                (change.pre, change.post)
            }
        };

        if post <= pre {
            let delta = I256::from_raw(post).wrapping_sub(I256::from_raw(pre));
            return Err(SimulationError::NonPositiveOutput {
                delta: delta.to_string(),
            });
        }
        Ok(post - pre)
    }
}

fn approve_call(token: Address, spender: Address, amount: U256) -> TxData {
    TxData::new(token, IERC20::approveCall { spender, amount }.abi_encode().into())
}

/// Balance read of the output asset for `holder`
fn balance_probe(request: &SwapRequest, holder: Address) -> TxData {
    if request.is_native_output() {
        TxData::new(
            MULTICALL3,
            IMulticall3::getEthBalanceCall { addr: holder }.abi_encode().into(),
        )
    } else {
        let data: Bytes = IERC20::balanceOfCall { account: holder }.abi_encode().into();
        TxData::new(request.output_token(), data)
    }
}

fn decode_word(result: &CallResult) -> Option<U256> {
    (result.is_success() && result.return_data.len() == 32)
        .then(|| U256::from_be_slice(&result.return_data))
}
