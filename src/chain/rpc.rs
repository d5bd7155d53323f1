//! JSON-RPC chain client
//!
//! Batches run through `eth_simulateV1`. Asset changes are traced by
//! bracketing the batch with balance probes for the simulating account: a
//! `balanceOf` on every call target and a Multicall3 `getEthBalance` for
//! the native asset. Probes that fail or return something other than a
//! single word are not tokens and are dropped from the ledger.

use alloy_primitives::{Address, Bytes, U256, U64};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use super::{AssetChange, ChainClient, IMulticall3, SimulateCallsOutcome, SimulateCallsRequest, IERC20};
use crate::tokens::{MULTICALL3, NATIVE_TOKEN};
use crate::types::{CallResult, CallStatus, TxData};

// ============================================
// eth_simulateV1 RESPONSE
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedBlock {
    number: U64,
    calls: Vec<SimulatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    status: U64,
    gas_used: U64,
    #[serde(default)]
    return_data: Bytes,
    #[serde(default)]
    error: Option<SimulatedCallError>,
}

#[derive(Debug, Deserialize)]
struct SimulatedCallError {
    message: String,
}

impl From<SimulatedCall> for CallResult {
    fn from(call: SimulatedCall) -> Self {
        let status = if call.status == U64::from(1u64) {
            CallStatus::Success
        } else {
            CallStatus::Failure
        };
        CallResult {
            status,
            gas_used: call.gas_used.to::<u64>(),
            return_data: call.return_data,
            error: call.error.map(|e| e.message),
        }
    }
}

// ============================================
// CLIENT
// ============================================

pub struct RpcChainClient {
    provider: DynProvider,
    chain_id: u64,
}

impl RpcChainClient {
    /// Connect over HTTP. The chain id is taken on trust from configuration.
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?).erased();
        Ok(Self { provider, chain_id })
    }

    /// Probes reading `account`'s balance of every call target plus native
    fn balance_probes(account: Address, calls: &[TxData]) -> (Vec<Address>, Vec<TxData>) {
        let mut tokens: Vec<Address> = Vec::new();
        for call in calls {
            if call.to != MULTICALL3 && !tokens.contains(&call.to) {
                tokens.push(call.to);
            }
        }

        let balance_of: Bytes = IERC20::balanceOfCall { account }.abi_encode().into();
        let mut probes: Vec<TxData> = tokens
            .iter()
            .map(|token| TxData::new(*token, balance_of.clone()))
            .collect();

        tokens.push(NATIVE_TOKEN);
        probes.push(TxData::new(
            MULTICALL3,
            IMulticall3::getEthBalanceCall { addr: account }.abi_encode().into(),
        ));

        (tokens, probes)
    }

    fn word(result: &CallResult) -> Option<U256> {
        if !result.is_success() || result.return_data.len() != 32 {
            return None;
        }
        Some(U256::from_be_slice(&result.return_data))
    }

    fn payload(request: &SimulateCallsRequest, calls: &[TxData]) -> Value {
        let calls: Vec<Value> = calls
            .iter()
            .map(|c| {
                json!({
                    "from": request.account,
                    "to": c.to,
                    "data": c.data,
                    "value": format!("0x{:x}", c.value),
                })
            })
            .collect();

        let mut block = json!({ "calls": calls });
        if let Some(balance) = request.balance_override {
            let mut overrides = serde_json::Map::new();
            overrides.insert(
                request.account.to_string(),
                json!({ "balance": format!("0x{:x}", balance) }),
            );
            block["stateOverrides"] = Value::Object(overrides);
        }

        json!({
            "blockStateCalls": [block],
            "validation": false,
            "traceTransfers": false,
        })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn simulate_calls(&self, request: SimulateCallsRequest) -> Result<SimulateCallsOutcome> {
        let (tokens, probes) = if request.trace_asset_changes {
            Self::balance_probes(request.account, &request.calls)
        } else {
            (Vec::new(), Vec::new())
        };

        let mut batch = probes.clone();
        batch.extend(request.calls.iter().cloned());
        batch.extend(probes.iter().cloned());

        let params = (Self::payload(&request, &batch), "latest");
        let blocks: Vec<SimulatedBlock> = self
            .provider
            .raw_request("eth_simulateV1".into(), params)
            .await
            .map_err(|e| eyre!("eth_simulateV1 failed: {}", e))?;

        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("eth_simulateV1 returned no blocks"))?;

        if block.calls.len() != batch.len() {
            return Err(eyre!(
                "eth_simulateV1 returned {} results for {} calls",
                block.calls.len(),
                batch.len()
            ));
        }

        let mut results: Vec<CallResult> = block.calls.into_iter().map(CallResult::from).collect();
        let post: Vec<CallResult> = results.split_off(probes.len() + request.calls.len());
        let calls: Vec<CallResult> = results.split_off(probes.len());
        let pre = results;

        let asset_changes: Vec<AssetChange> = tokens
            .into_iter()
            .zip(pre.iter().zip(post.iter()))
            .filter_map(|(token, (before, after))| {
                let change = AssetChange {
                    token,
                    pre: Self::word(before)?,
                    post: Self::word(after)?,
                };
                trace!(?token, pre = %change.pre, post = %change.post, "asset change");
                Some(change)
            })
            .collect();

        Ok(SimulateCallsOutcome {
            block_number: block.number.to::<u64>(),
            results: calls,
            asset_changes,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default().to(to).input(data.into());
        self.provider
            .call(tx)
            .await
            .map_err(|e| eyre!("eth_call to {} failed: {}", to, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes_cover_targets_and_native() {
        let account = Address::repeat_byte(7);
        let token = Address::repeat_byte(1);
        let router = Address::repeat_byte(2);
        let calls = vec![
            TxData::new(token, Bytes::new()),
            TxData::new(router, Bytes::new()),
            TxData::new(token, Bytes::new()),
        ];

        let (tokens, probes) = RpcChainClient::balance_probes(account, &calls);
        assert_eq!(tokens, vec![token, router, NATIVE_TOKEN]);
        assert_eq!(probes.len(), 3);
        assert_eq!(probes[2].to, MULTICALL3);
    }

    #[test]
    fn test_simulated_call_conversion() {
        let raw = r#"{"status":"0x0","gasUsed":"0x5208","returnData":"0x08c379a0","error":{"message":"execution reverted","code":3}}"#;
        let call: SimulatedCall = serde_json::from_str(raw).unwrap();
        let result = CallResult::from(call);
        assert_eq!(result.status, CallStatus::Failure);
        assert_eq!(result.gas_used, 21_000);
        assert_eq!(result.error.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn test_word_rejects_non_balance_returns() {
        let ok = CallResult {
            status: CallStatus::Success,
            gas_used: 0,
            return_data: Bytes::from(U256::from(42u64).to_be_bytes::<32>().to_vec()),
            error: None,
        };
        assert_eq!(RpcChainClient::word(&ok), Some(U256::from(42u64)));

        let empty = CallResult { return_data: Bytes::new(), ..ok };
        assert_eq!(RpcChainClient::word(&empty), None);
    }

    #[test]
    fn test_payload_overrides_sender_balance() {
        let request = SimulateCallsRequest {
            account: Address::repeat_byte(7),
            calls: vec![],
            balance_override: Some(U256::from(16u64)),
            trace_asset_changes: false,
        };
        let payload = RpcChainClient::payload(&request, &[]);
        let overrides = &payload["blockStateCalls"][0]["stateOverrides"];
        assert_eq!(overrides[Address::repeat_byte(7).to_string()]["balance"], "0x10");
        assert_eq!(payload["validation"], false);
    }
}
