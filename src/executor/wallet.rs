//! Wallet - transaction signing and submission
//!
//! The `Wallet` trait is the write side of a chain: EIP-5792 batch calls
//! when the wallet supports them, plain signed transactions otherwise.
//! `RpcWallet` implements it with a local private key and a JSON-RPC node.
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::Encodable2718;
use alloy_primitives::{Address, TxKind, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{eyre, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::types::TxData;

// ============================================
// WALLET CONTRACT
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Lifecycle of an EIP-5792 call bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Confirmed,
    /// Terminal non-success, with the wallet's status code
    Failed(u64),
}

impl BatchState {
    /// 1xx pending, 2xx confirmed, anything else terminal failure
    pub fn from_code(code: u64) -> Self {
        match code {
            100..=199 => BatchState::Pending,
            200..=299 => BatchState::Confirmed,
            other => BatchState::Failed(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatus {
    pub state: BatchState,
    pub receipts: Vec<Receipt>,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Address;

    /// Chain the wallet is currently connected to
    async fn chain_id(&self) -> Result<u64>;

    async fn supports_atomic_batch(&self, chain_id: u64) -> Result<bool>;

    /// Submit calls as one atomic unit; returns the batch id
    async fn send_calls(&self, chain_id: u64, calls: &[TxData]) -> Result<String>;

    async fn calls_status(&self, batch_id: &str) -> Result<BatchStatus>;

    async fn send_transaction(&self, tx: &TxData) -> Result<B256>;

    async fn wait_for_receipt(&self, hash: B256) -> Result<Receipt>;
}

// ============================================
// JSON-RPC WALLET
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallsStatus {
    status: u64,
    #[serde(default)]
    receipts: Vec<RawReceipt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: alloy_primitives::U64,
    #[serde(default)]
    block_number: Option<alloy_primitives::U64>,
}

/// Local-key wallet backed by a JSON-RPC node
pub struct RpcWallet {
    provider: DynProvider,
    signer: PrivateKeySigner,
    next_nonce: Mutex<Option<u64>>,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcWallet {
    pub fn new(rpc_url: &str, private_key: &str) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim().trim_start_matches("0x"))
            .map_err(|e| eyre!("invalid private key: {}", e))?;
        let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?).erased();
        info!("✓ Wallet loaded: {:?}", signer.address());

        Ok(Self {
            provider,
            signer,
            next_nonce: Mutex::new(None),
            receipt_poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(180),
        })
    }

    /// Load the key from `PRIVATE_KEY`
    pub fn from_env(rpc_url: &str) -> Result<Self> {
        let key = std::env::var("PRIVATE_KEY").map_err(|_| eyre!("PRIVATE_KEY not set"))?;
        Self::new(rpc_url, &key)
    }

    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }

    /// Take the next nonce, syncing from the node on first use
    async fn take_nonce(&self) -> Result<u64> {
        let mut guard = self.next_nonce.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => {
                let n = self.provider.get_transaction_count(self.signer.address()).pending().await?;
                debug!("Synced nonce: {}", n);
                n
            }
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    async fn reset_nonce(&self) {
        *self.next_nonce.lock().await = None;
    }

    fn hex_chain_id(chain_id: u64) -> String {
        format!("0x{:x}", chain_id)
    }
}

#[async_trait]
impl Wallet for RpcWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn supports_atomic_batch(&self, chain_id: u64) -> Result<bool> {
        let params = (self.address(), vec![Self::hex_chain_id(chain_id)]);
        let capabilities: Value = match self
            .provider
            .raw_request("wallet_getCapabilities".into(), params)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                // nodes without EIP-5792 reject the method outright
                debug!("wallet_getCapabilities unavailable: {}", e);
                return Ok(false);
            }
        };
        Ok(atomic_supported(&capabilities, chain_id))
    }

    async fn send_calls(&self, chain_id: u64, calls: &[TxData]) -> Result<String> {
        let calls: Vec<Value> = calls
            .iter()
            .map(|c| json!({ "to": c.to, "data": c.data, "value": format!("0x{:x}", c.value) }))
            .collect();
        let params = [json!({
            "version": "2.0.0",
            "chainId": Self::hex_chain_id(chain_id),
            "from": self.address(),
            "atomicRequired": true,
            "calls": calls,
        })];

        let response: Value = self
            .provider
            .raw_request("wallet_sendCalls".into(), params)
            .await
            .map_err(|e| eyre!("wallet_sendCalls failed: {}", e))?;

        // EIP-5792 v1 returned the id directly; v2 wraps it
        response
            .as_str()
            .or_else(|| response.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| eyre!("wallet_sendCalls returned no batch id: {}", response))
    }

    async fn calls_status(&self, batch_id: &str) -> Result<BatchStatus> {
        let raw: RawCallsStatus = self
            .provider
            .raw_request("wallet_getCallsStatus".into(), [batch_id.to_string()])
            .await
            .map_err(|e| eyre!("wallet_getCallsStatus failed: {}", e))?;

        Ok(BatchStatus {
            state: BatchState::from_code(raw.status),
            receipts: raw
                .receipts
                .into_iter()
                .map(|r| Receipt {
                    transaction_hash: r.transaction_hash,
                    success: r.status == alloy_primitives::U64::from(1u64),
                    block_number: r.block_number.map(|n| n.to::<u64>()),
                })
                .collect(),
        })
    }

    async fn send_transaction(&self, call: &TxData) -> Result<B256> {
        let chain_id = self.chain_id().await?;
        let request = TransactionRequest::default()
            .from(self.address())
            .to(call.to)
            .value(call.value)
            .input(call.data.clone().into());

        let gas_limit = self.provider.estimate_gas(request).await?;
        let fees = self.provider.estimate_eip1559_fees().await?;
        let nonce = self.take_nonce().await?;

        let tx = TxEip1559 {
            chain_id,
            nonce,
            // 20% headroom over the estimate
            gas_limit: gas_limit.saturating_mul(6) / 5,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(call.to),
            value: call.value,
            input: call.data.clone(),
            access_list: Default::default(),
        };

        let signature = self
            .signer
            .sign_hash(&tx.signature_hash())
            .await
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;
        let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
        let raw = envelope.encoded_2718();

        let pending = match self.provider.send_raw_transaction(&raw).await {
            Ok(p) => p,
            Err(e) => {
                self.reset_nonce().await;
                return Err(eyre!("send_raw_transaction failed: {}", e));
            }
        };

        let hash = *pending.tx_hash();
        debug!(?hash, nonce, to = %call.to, "transaction sent");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<Receipt> {
        let started = Instant::now();
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(hash).await? {
                return Ok(Receipt {
                    transaction_hash: hash,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                });
            }
            if started.elapsed() > self.receipt_timeout {
                return Err(eyre!("no receipt for {} after {:?}", hash, self.receipt_timeout));
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}

/// Read atomic support for `chain_id` out of a `wallet_getCapabilities` response
fn atomic_supported(capabilities: &Value, chain_id: u64) -> bool {
    let Some(chain) = capabilities
        .get(RpcWallet::hex_chain_id(chain_id))
        .or_else(|| capabilities.get(chain_id.to_string()))
    else {
        return false;
    };

    let status = chain.pointer("/atomic/status").and_then(Value::as_str);
    let legacy = chain.pointer("/atomicBatch/supported").and_then(Value::as_bool);
    matches!(status, Some("supported") | Some("ready")) || legacy == Some(true)
}
