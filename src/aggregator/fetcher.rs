//! Retrying fetcher
//!
//! Wraps a single provider call in an exponential-backoff attempt loop and
//! races the whole loop against a deadline timer. Whatever happens, the
//! caller gets a `Quote` back: provider errors, deadline expiry and task
//! failures all come out as `Quote::Failed`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::instrument::WithSubscriber;
use tracing::{debug, warn, Instrument};

use crate::config::AggregationOptions;
use crate::errors::{ProviderError, QuoteError};
use crate::provider::QuoteProvider;
use crate::types::{Quote, SuccessfulQuote, SwapRequest};

/// Attempt budget and backoff schedule derived from sanitized options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &AggregationOptions) -> Self {
        Self {
            attempts: options.num_retries + 1,
            initial_delay: Duration::from_millis(options.initial_retry_delay_ms),
        }
    }

    /// Sleep after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX))
    }
}

/// Fetch one provider's quote under the retry and deadline rules.
///
/// The attempt loop runs in its own task. If the deadline fires first the
/// task is detached, not aborted: an attempt already in flight finishes in
/// the background and is discarded, and no new attempt starts after expiry.
/// The task inherits the caller's span and subscriber.
pub async fn fetch_with_retry(
    provider: Arc<dyn QuoteProvider>,
    request: Arc<SwapRequest>,
    options: &AggregationOptions,
) -> Quote {
    let options = Arc::new(options.sanitized());
    let provider_id = provider.id().to_string();
    let expired = Arc::new(AtomicBool::new(false));

    let attempts = tokio::spawn(
        attempt_loop(provider, request, options.clone(), expired.clone())
            .in_current_span()
            .with_current_subscriber(),
    );

    tokio::select! {
        joined = attempts => match joined {
            Ok(Ok(mut quote)) => {
                quote.provider = provider_id;
                Quote::Successful(quote)
            }
            Ok(Err(e)) => {
                warn!(provider = %provider_id, "quote failed: {}", e);
                Quote::failed(provider_id, QuoteError::from(e))
            }
            Err(e) => {
                warn!(provider = %provider_id, "quote task aborted: {}", e);
                Quote::failed(provider_id, QuoteError::TaskAborted { message: e.to_string() })
            }
        },
        _ = sleep(options.deadline()) => {
            expired.store(true, Ordering::SeqCst);
            warn!(provider = %provider_id, deadline_ms = options.deadline_ms, "quote deadline exceeded");
            Quote::failed(provider_id, QuoteError::DeadlineExceeded { deadline_ms: options.deadline_ms })
        }
    }
}

async fn attempt_loop(
    provider: Arc<dyn QuoteProvider>,
    request: Arc<SwapRequest>,
    options: Arc<AggregationOptions>,
    expired: Arc<AtomicBool>,
) -> Result<SuccessfulQuote, ProviderError> {
    let policy = RetryPolicy::from_options(&options);
    let mut attempt = 1;

    loop {
        if expired.load(Ordering::SeqCst) {
            return Err(ProviderError::new("deadline passed before next attempt"));
        }

        match provider.fetch_quote(&request, &options).await {
            Ok(quote) => {
                debug!(provider = provider.id(), attempt, "quote received");
                return Ok(quote);
            }
            Err(e) if attempt < policy.attempts => {
                let delay = policy.delay_after(attempt);
                debug!(
                    provider = provider.id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {}",
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
