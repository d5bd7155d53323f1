//! Call builder
//!
//! Turns a winning quote into the calls a wallet submits: an optional
//! ERC-20 approval followed by the swap itself.

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::chain::{ChainRegistry, IERC20};
use crate::errors::ExecutionError;
use crate::types::{BuiltCall, CallKind, SuccessfulQuote, SwapRequest, TxData};

/// How much spend authority an approval grants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowanceMode {
    /// Exactly the quote's input amount
    #[default]
    Exact,
    /// `type(uint256).max`
    Unlimited,
}

impl AllowanceMode {
    pub fn amount(&self, input_amount: U256) -> U256 {
        match self {
            AllowanceMode::Exact => input_amount,
            AllowanceMode::Unlimited => U256::MAX,
        }
    }
}

impl std::fmt::Display for AllowanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllowanceMode::Exact => write!(f, "exact"),
            AllowanceMode::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl FromStr for AllowanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(AllowanceMode::Exact),
            "unlimited" | "max" => Ok(AllowanceMode::Unlimited),
            other => Err(format!("unknown allowance mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallBuilder {
    chains: ChainRegistry,
}

impl CallBuilder {
    pub fn new(chains: ChainRegistry) -> Self {
        Self { chains }
    }

    /// `[approval?, swap]`.
    ///
    /// Without `force`, the current allowance is read first and the approval
    /// is left out when it already covers the input amount.
    pub async fn build_calls(
        &self,
        quote: &SuccessfulQuote,
        request: &SwapRequest,
        mode: AllowanceMode,
        force: bool,
    ) -> Result<Vec<BuiltCall>, ExecutionError> {
        let swap = BuiltCall {
            kind: CallKind::Swap,
            tx: quote.tx_data.clone(),
        };

        let Some(approval) = &quote.approval else {
            return Ok(vec![swap]);
        };

        if !force {
            let client = self.chains.get(request.chain_id())?;
            let data = IERC20::allowanceCall {
                owner: request.swapper(),
                spender: approval.spender,
            }
            .abi_encode();
            let raw = client
                .call(approval.token, data.into())
                .await
                .map_err(|e| ExecutionError::AllowanceRead(e.to_string()))?;
            let current = IERC20::allowanceCall::abi_decode_returns(&raw)
                .map_err(|e| ExecutionError::AllowanceRead(e.to_string()))?;

            if current >= quote.input_amount {
                debug!(token = %approval.token, allowance = %current, "allowance sufficient, skipping approval");
                return Ok(vec![swap]);
            }
        }

        let approve = IERC20::approveCall {
            spender: approval.spender,
            amount: mode.amount(quote.input_amount),
        }
        .abi_encode();

        Ok(vec![
            BuiltCall {
                kind: CallKind::Approval,
                tx: TxData::new(approval.token, approve.into()),
            },
            swap,
        ])
    }
}
