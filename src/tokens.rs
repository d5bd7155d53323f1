//! Token definitions
//!
//! Well-known addresses the pipeline needs to reason about: the native-token
//! sentinel, the Multicall3 deployment used for native balance probes, and a
//! small table of common tokens for the CLI.

use alloy_primitives::{address, Address, U256};

/// Sentinel providers use for the chain's native token
pub const NATIVE_TOKEN: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Multicall3, deployed at the same address on every supported chain
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Native balance granted to the swapper during simulation (2^128 wei)
pub const SIMULATION_BALANCE: U256 = U256::from_limbs([0, 0, 1, 0]);

/// True for the native sentinel and for the zero address
pub fn is_native(token: &Address) -> bool {
    *token == NATIVE_TOKEN || *token == Address::ZERO
}

/// A token we know by name
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub chain_id: u64,
}

// ============================================
// KNOWN TOKENS
// ============================================

pub const ETHEREUM: u64 = 1;
pub const BASE: u64 = 8453;
pub const ARBITRUM: u64 = 42161;

pub fn known_tokens() -> Vec<Token> {
    vec![
        // Ethereum
        Token { symbol: "WETH", address: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), decimals: 18, chain_id: ETHEREUM },
        Token { symbol: "USDC", address: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), decimals: 6, chain_id: ETHEREUM },
        Token { symbol: "USDT", address: address!("dAC17F958D2ee523a2206206994597C13D831ec7"), decimals: 6, chain_id: ETHEREUM },
        Token { symbol: "DAI", address: address!("6B175474E89094C44Da98b954EedeAC495271d0F"), decimals: 18, chain_id: ETHEREUM },
        // Base
        Token { symbol: "WETH", address: address!("4200000000000000000000000000000000000006"), decimals: 18, chain_id: BASE },
        Token { symbol: "USDC", address: address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), decimals: 6, chain_id: BASE },
        // Arbitrum
        Token { symbol: "WETH", address: address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"), decimals: 18, chain_id: ARBITRUM },
        Token { symbol: "USDC", address: address!("af88d065e77c8cC2239327C5EDb3A432268e5831"), decimals: 6, chain_id: ARBITRUM },
    ]
}

/// Resolve `ETH`, a known symbol, or a hex address on the given chain
pub fn resolve(chain_id: u64, symbol_or_address: &str) -> Option<Address> {
    if symbol_or_address.eq_ignore_ascii_case("ETH") {
        return Some(NATIVE_TOKEN);
    }
    if let Ok(address) = symbol_or_address.parse::<Address>() {
        return Some(address);
    }
    known_tokens()
        .into_iter()
        .find(|t| t.chain_id == chain_id && t.symbol.eq_ignore_ascii_case(symbol_or_address))
        .map(|t| t.address)
}

/// Get token symbol from address
pub fn get_symbol(chain_id: u64, address: &Address) -> String {
    if is_native(address) {
        return "ETH".to_string();
    }
    known_tokens()
        .into_iter()
        .find(|t| t.chain_id == chain_id && t.address == *address)
        .map(|t| t.symbol.to_string())
        .unwrap_or_else(|| format!("{:?}", address)[..10].to_string())
}
