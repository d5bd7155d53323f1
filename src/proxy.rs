//! Proxy delegate
//!
//! Forwards the whole fetch-and-simulate step to a remote aggregator and
//! reads simulated quotes back as they arrive, one NDJSON record per line.
//! The remote end is expected to write `codec::encode_stream` output.

use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::{debug, warn};

use crate::aggregator::QuoteSet;
use crate::codec::{self, CONTENT_TYPE};
use crate::config::AggregationOptions;
use crate::errors::AggregatorError;
use crate::types::{SimulatedQuote, SwapRequest};

/// Body POSTed to the remote aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub request: SwapRequest,
    pub options: AggregationOptions,
}

#[derive(Debug, Clone)]
pub struct ProxyDelegate {
    http: reqwest::Client,
    endpoint: String,
}

impl ProxyDelegate {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit the request and stream results back in completion order.
    ///
    /// A malformed record ends the set; everything decoded before it is kept.
    pub async fn fetch(
        &self,
        request: &SwapRequest,
        options: &AggregationOptions,
    ) -> Result<QuoteSet<SimulatedQuote>, AggregatorError> {
        let body = ProxyRequest {
            request: request.clone(),
            options: options.clone(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|e| AggregatorError::Proxy(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AggregatorError::Proxy(format!("{}: {}", status, text)));
        }
        debug!(endpoint = %self.endpoint, "proxy stream opened");

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));

        let results = codec::decode_stream::<SimulatedQuote, _, _>(bytes).scan((), |_, record| {
            future::ready(match record {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("dropping rest of proxy stream: {}", e);
                    None
                }
            })
        });

        Ok(QuoteSet::from_stream(results))
    }
}
