//! Chain access
//!
//! `ChainClient` is the read side of a chain: what-if batch simulation and
//! plain view calls. Clients are keyed by chain id in a `ChainRegistry`
//! that is built once and shared read-only by the simulator and the call
//! builder.

pub mod rpc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::sol;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ExecutionError;
use crate::types::{CallResult, TxData};

pub use rpc::RpcChainClient;

// ============================================
// CONTRACT INTERFACES
// ============================================

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }

    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        function getEthBalance(address addr) external view returns (uint256 balance);
    }
}

// ============================================
// SIMULATION TYPES
// ============================================

/// A what-if batch executed in order, in one block, from one account
#[derive(Debug, Clone)]
pub struct SimulateCallsRequest {
    pub account: Address,
    pub calls: Vec<TxData>,
    /// Native balance forced on `account` for the duration of the batch
    pub balance_override: Option<U256>,
    /// Report per-token balance changes of `account` across the batch
    pub trace_asset_changes: bool,
}

/// Balance of one asset held by the simulating account, before and after
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetChange {
    /// Native asset is reported under `tokens::NATIVE_TOKEN`
    pub token: Address,
    pub pre: U256,
    pub post: U256,
}

#[derive(Debug, Clone)]
pub struct SimulateCallsOutcome {
    pub block_number: u64,
    /// One entry per requested call, same order
    pub results: Vec<CallResult>,
    pub asset_changes: Vec<AssetChange>,
}

impl SimulateCallsOutcome {
    pub fn asset_change(&self, token: &Address) -> Option<&AssetChange> {
        self.asset_changes.iter().find(|c| c.token == *token)
    }
}

// ============================================
// CLIENT CONTRACT
// ============================================

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn simulate_calls(&self, request: SimulateCallsRequest) -> eyre::Result<SimulateCallsOutcome>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes>;
}

/// Chain clients keyed by chain id
#[derive(Clone, Default)]
pub struct ChainRegistry {
    clients: HashMap<u64, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.clients.insert(client.chain_id(), client);
        self
    }

    pub fn get(&self, chain_id: u64) -> Result<Arc<dyn ChainClient>, ExecutionError> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(ExecutionError::NoClientForChain(chain_id))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.clients.keys().copied()
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<u64> = self.chain_ids().collect();
        ids.sort_unstable();
        f.debug_struct("ChainRegistry").field("chains", &ids).finish()
    }
}
