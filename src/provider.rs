//! Quote provider contract
//!
//! Provider adapters (HTTP clients for individual aggregators) live outside
//! this crate. The core only sees this trait: an identifier, a declared
//! capability set, and one fetch operation. The roster is a runtime list,
//! so adding a provider never touches the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::AggregationOptions;
use crate::errors::ProviderError;
use crate::types::{SuccessfulQuote, SwapAmount, SwapRequest};

/// Something a provider may or may not support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    ExactIn,
    TargetOut,
    IntegratorFee,
    IntegratorSurplus,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ExactIn => write!(f, "exactIn"),
            Capability::TargetOut => write!(f, "targetOut"),
            Capability::IntegratorFee => write!(f, "integratorFee"),
            Capability::IntegratorSurplus => write!(f, "integratorSurplus"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    /// What a request demands of a provider: the swap mode, plus
    /// integrator fee/surplus support when those options are non-zero
    pub fn required_for(request: &SwapRequest, options: &AggregationOptions) -> Self {
        let mut required = BTreeSet::new();
        required.insert(match request.amount() {
            SwapAmount::ExactIn { .. } => Capability::ExactIn,
            SwapAmount::TargetOut { .. } => Capability::TargetOut,
        });
        if options.has_integrator_fee() {
            required.insert(Capability::IntegratorFee);
        }
        if options.has_integrator_surplus() {
            required.insert(Capability::IntegratorSurplus);
        }
        Self(required)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_superset(&self, other: &Capabilities) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// A quote-providing service
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Stable identifier, used as `Quote::provider`
    fn id(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Fetch one quote. Errors carry the upstream response when there is one.
    async fn fetch_quote(
        &self,
        request: &SwapRequest,
        options: &AggregationOptions,
    ) -> Result<SuccessfulQuote, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    fn request() -> SwapRequest {
        SwapRequest::target_out(1, Address::ZERO, Address::repeat_byte(1), U256::from(5u64), Address::repeat_byte(2))
    }

    #[test]
    fn test_required_capabilities_follow_mode_and_fees() {
        let plain = Capabilities::required_for(&request(), &AggregationOptions::default());
        assert_eq!(plain, Capabilities::new([Capability::TargetOut]));

        let options = AggregationOptions {
            integrator_fee_address: Some(Address::repeat_byte(9)),
            integrator_swap_fee_bps: Some(25),
            integrator_surplus_bps: Some(0),
            ..Default::default()
        };
        let with_fee = Capabilities::required_for(&request(), &options);
        assert!(with_fee.contains(Capability::IntegratorFee));
        assert!(!with_fee.contains(Capability::IntegratorSurplus));
    }

    #[test]
    fn test_superset() {
        let all = Capabilities::new([Capability::ExactIn, Capability::IntegratorFee]);
        assert!(all.is_superset(&Capabilities::new([Capability::ExactIn])));
        assert!(!all.is_superset(&Capabilities::new([Capability::TargetOut])));
        assert_eq!(all.to_string(), "{exactIn, integratorFee}");
    }
}
