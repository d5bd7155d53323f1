//! Configuration
//!
//! `AggregationOptions` is the per-request tuning surface consumed by the
//! fetcher and orchestrator. `Settings` is the process-level configuration
//! loaded from the environment (or a TOML file) by the binary.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::executor::AllowanceMode;
use crate::strategy::SelectionStrategy;

// ============================================
// LIMITS
// ============================================

pub const DEFAULT_DEADLINE_MS: u64 = 8_000;
pub const MIN_DEADLINE_MS: u64 = 10;
pub const MAX_DEADLINE_MS: u64 = 120_000;

pub const DEFAULT_NUM_RETRIES: u32 = 1;
pub const MAX_NUM_RETRIES: u32 = 10;

pub const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 100;
pub const MIN_INITIAL_RETRY_DELAY_MS: u64 = 5;
pub const MAX_INITIAL_RETRY_DELAY_MS: u64 = 10_000;

/// 100% in basis points
pub const MAX_BPS: u16 = 10_000;

// ============================================
// AGGREGATION OPTIONS
// ============================================

/// Per-request tuning for the fetch pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationOptions {
    pub deadline_ms: u64,
    pub num_retries: u32,
    pub initial_retry_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrator_fee_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrator_swap_fee_bps: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrator_surplus_bps: Option<u16>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
            num_retries: DEFAULT_NUM_RETRIES,
            initial_retry_delay_ms: DEFAULT_INITIAL_RETRY_DELAY_MS,
            integrator_fee_address: None,
            integrator_swap_fee_bps: None,
            integrator_surplus_bps: None,
        }
    }
}

impl AggregationOptions {
    /// Copy with every timing knob clamped into its safe range
    pub fn sanitized(&self) -> Self {
        Self {
            deadline_ms: self.deadline_ms.clamp(MIN_DEADLINE_MS, MAX_DEADLINE_MS),
            num_retries: self.num_retries.min(MAX_NUM_RETRIES),
            initial_retry_delay_ms: self
                .initial_retry_delay_ms
                .clamp(MIN_INITIAL_RETRY_DELAY_MS, MAX_INITIAL_RETRY_DELAY_MS),
            ..self.clone()
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn has_integrator_fee(&self) -> bool {
        self.integrator_swap_fee_bps.unwrap_or(0) > 0
    }

    pub fn has_integrator_surplus(&self) -> bool {
        self.integrator_surplus_bps.unwrap_or(0) > 0
    }

    /// Fee and surplus shares need somewhere to go, and cannot exceed 100%
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, bps) in [
            ("integratorSwapFeeBps", self.integrator_swap_fee_bps),
            ("integratorSurplusBps", self.integrator_surplus_bps),
        ] {
            if bps.unwrap_or(0) > MAX_BPS {
                return Err(ConfigError::InconsistentIntegratorOptions(format!(
                    "{name} must be at most {MAX_BPS}"
                )));
            }
        }

        if (self.has_integrator_fee() || self.has_integrator_surplus())
            && self.integrator_fee_address.is_none()
        {
            return Err(ConfigError::InconsistentIntegratorOptions(
                "fee or surplus share set without integratorFeeAddress".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================
// PROCESS SETTINGS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub options: AggregationOptions,

    /// Remote aggregator to delegate to (proxy mode)
    pub proxy_endpoint: Option<String>,

    /// Chain id (as a string) -> RPC URL
    pub rpc_urls: BTreeMap<String, String>,

    /// fastest | bestPrice | estimatedGas | priority
    pub selection_strategy: String,

    pub allowance_mode: AllowanceMode,

    /// Read output from bracketing balance probes instead of asset-change tracing
    pub balance_diff_simulation: bool,

    pub batch_poll_interval_ms: u64,
    pub batch_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            options: AggregationOptions::default(),
            proxy_endpoint: None,
            rpc_urls: BTreeMap::new(),
            selection_strategy: "bestPrice".to_string(),
            allowance_mode: AllowanceMode::Exact,
            balance_diff_simulation: false,
            batch_poll_interval_ms: 1_000,
            batch_timeout_ms: 120_000,
        }
    }
}

impl Settings {
    /// Load settings from environment variables and .env file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let options = AggregationOptions {
            deadline_ms: env::var("DEADLINE_MS")
                .unwrap_or_else(|_| DEFAULT_DEADLINE_MS.to_string())
                .parse()
                .unwrap_or(DEFAULT_DEADLINE_MS),
            num_retries: env::var("NUM_RETRIES")
                .unwrap_or_else(|_| DEFAULT_NUM_RETRIES.to_string())
                .parse()
                .unwrap_or(DEFAULT_NUM_RETRIES),
            initial_retry_delay_ms: env::var("INITIAL_RETRY_DELAY_MS")
                .unwrap_or_else(|_| DEFAULT_INITIAL_RETRY_DELAY_MS.to_string())
                .parse()
                .unwrap_or(DEFAULT_INITIAL_RETRY_DELAY_MS),
            integrator_fee_address: parse_optional("INTEGRATOR_FEE_ADDRESS", env::var("INTEGRATOR_FEE_ADDRESS").ok())?,
            integrator_swap_fee_bps: parse_optional("INTEGRATOR_SWAP_FEE_BPS", env::var("INTEGRATOR_SWAP_FEE_BPS").ok())?,
            integrator_surplus_bps: parse_optional("INTEGRATOR_SURPLUS_BPS", env::var("INTEGRATOR_SURPLUS_BPS").ok())?,
        };

        Ok(Self {
            options: options.sanitized(),
            proxy_endpoint: env::var("PROXY_ENDPOINT").ok().filter(|s| !s.is_empty()),
            rpc_urls: env::var("RPC_URLS")
                .map(|s| Self::parse_rpc_urls(&s))
                .unwrap_or_default(),
            selection_strategy: env::var("SELECTION_STRATEGY")
                .unwrap_or(defaults.selection_strategy),
            allowance_mode: env::var("ALLOWANCE_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.allowance_mode),
            balance_diff_simulation: env::var("BALANCE_DIFF_SIMULATION")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            batch_poll_interval_ms: env::var("BATCH_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| defaults.batch_poll_interval_ms.to_string())
                .parse()
                .unwrap_or(defaults.batch_poll_interval_ms),
            batch_timeout_ms: env::var("BATCH_TIMEOUT_MS")
                .unwrap_or_else(|_| defaults.batch_timeout_ms.to_string())
                .parse()
                .unwrap_or(defaults.batch_timeout_ms),
        })
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut settings: Self = toml::from_str(&content)?;
        settings.options = settings.options.sanitized();
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `8453=https://...,1=https://...`
    fn parse_rpc_urls(raw: &str) -> BTreeMap<String, String> {
        raw.split(',')
            .filter_map(|entry| {
                let (chain, url) = entry.split_once('=')?;
                Some((chain.trim().to_string(), url.trim().to_string()))
            })
            .collect()
    }

    /// RPC endpoints keyed by numeric chain id
    pub fn rpc_endpoints(&self) -> Result<Vec<(u64, String)>, ConfigError> {
        self.rpc_urls
            .iter()
            .map(|(chain, url)| {
                let chain_id = chain.parse::<u64>().map_err(|_| ConfigError::InvalidSetting {
                    field: "rpc_urls".to_string(),
                    message: format!("chain id {chain:?} is not a number"),
                })?;
                Ok((chain_id, url.clone()))
            })
            .collect()
    }

    pub fn strategy(&self) -> Result<SelectionStrategy, ConfigError> {
        self.selection_strategy
            .parse()
            .map_err(|e: crate::errors::StrategyError| ConfigError::InvalidSetting {
                field: "selection_strategy".to_string(),
                message: e.to_string(),
            })
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms.max(1))
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Validate settings before wiring anything up
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        self.strategy()?;

        for (chain_id, url) in self.rpc_endpoints()? {
            if !url.contains("://") || url.contains("YOUR_API_KEY") {
                return Err(ConfigError::InvalidSetting {
                    field: format!("rpc_urls.{chain_id}"),
                    message: format!("{url:?} is not a usable RPC URL"),
                });
            }
        }

        if let Some(endpoint) = &self.proxy_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidSetting {
                    field: "proxy_endpoint".to_string(),
                    message: format!("{endpoint:?} is not an http(s) URL"),
                });
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              SWAPSCOUT - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Mode:              {:^40} ║",
            if self.proxy_endpoint.is_some() { "PROXY" } else { "LOCAL PROVIDERS" }
        );
        println!("║ Strategy:          {:^40} ║", self.selection_strategy);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FETCHING                                                   ║");
        println!("║ • Deadline:        {:>37} ms ║", self.options.deadline_ms);
        println!("║ • Retries:         {:>40} ║", self.options.num_retries);
        println!("║ • Initial Backoff: {:>37} ms ║", self.options.initial_retry_delay_ms);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ INTEGRATOR                                                 ║");
        println!("║ • Fee:             {:>36} bps ║", self.options.integrator_swap_fee_bps.unwrap_or(0));
        println!("║ • Surplus:         {:>36} bps ║", self.options.integrator_surplus_bps.unwrap_or(0));
        println!("║ • Fee Address:     {:^40} ║",
            if self.options.integrator_fee_address.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CHAINS                                                     ║");
        for chain in self.rpc_urls.keys() {
            println!("║ • Chain {:<10} {:^40} ║", chain, "✓ RPC");
        }
        println!("║ • Simulation:      {:^40} ║",
            if self.balance_diff_simulation { "balance diff" } else { "asset changes" }
        );
        println!("║ • Allowance:       {:^40} ║", self.allowance_mode);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Unset stays `None`; set but unparseable is an error, never a silent `None`
fn parse_optional<T>(field: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidSetting {
            field: field.to_string(),
            message: e.to_string(),
        })
    })
    .transpose()
}

// ============================================
// TESTS
// ============================================
