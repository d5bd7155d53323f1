//! Orchestrator
//!
//! Picks the providers able to serve a request and launches one retrying
//! fetch per candidate, each in its own task, each optionally followed by a
//! transform (simulation, usually).

use std::sync::Arc;
use tracing::{debug, info};

use super::fetcher::fetch_with_retry;
use super::set::{QuoteSet, Transform};
use crate::config::AggregationOptions;
use crate::errors::ConfigError;
use crate::provider::{Capabilities, QuoteProvider};
use crate::telemetry::Telemetry;
use crate::types::SwapRequest;

#[derive(Clone)]
pub struct Orchestrator {
    providers: Vec<Arc<dyn QuoteProvider>>,
    telemetry: Telemetry,
}

impl Orchestrator {
    pub fn new(providers: Vec<Arc<dyn QuoteProvider>>, telemetry: Telemetry) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(Self { providers, telemetry })
    }

    pub fn providers(&self) -> &[Arc<dyn QuoteProvider>] {
        &self.providers
    }

    /// Providers whose declared capabilities cover the request, in configured order
    pub fn candidates(
        &self,
        request: &SwapRequest,
        options: &AggregationOptions,
    ) -> Result<Vec<Arc<dyn QuoteProvider>>, ConfigError> {
        let required = Capabilities::required_for(request, options);
        let candidates: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.capabilities().is_superset(&required))
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(ConfigError::NoCapableProviders { required });
        }
        Ok(candidates)
    }

    /// Launch every candidate fetch and hand back the pending results.
    ///
    /// Errors are raised here, before any task is spawned. Must be called
    /// from within a tokio runtime.
    pub fn fetch_quotes<T>(
        &self,
        request: &SwapRequest,
        options: &AggregationOptions,
        transform: Transform<T>,
    ) -> Result<QuoteSet<T>, ConfigError>
    where
        T: Send + 'static,
    {
        options.validate()?;
        let candidates = self.candidates(request, options)?;

        info!(
            chain_id = request.chain_id(),
            candidates = candidates.len(),
            of = self.providers.len(),
            "fetching quotes"
        );

        let request = Arc::new(request.clone());
        let options = options.sanitized();

        let tasks = candidates
            .into_iter()
            .map(|provider| {
                let request = request.clone();
                let options = options.clone();
                let transform = transform.clone();
                let telemetry = self.telemetry.child("fetch");
                tokio::spawn(telemetry.instrument(async move {
                    let quote = fetch_with_retry(provider, request, &options).await;
                    debug!(provider = quote.provider(), ok = quote.is_successful(), "quote settled");
                    transform(quote).await
                }))
            })
            .collect();

        Ok(QuoteSet::from_tasks(tasks))
    }
}
