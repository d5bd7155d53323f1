//! Telemetry context
//!
//! A parent span plus an optional dispatcher, threaded through the pipeline
//! so embedders can route one aggregator's events to their own subscriber
//! without touching the global default.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use tracing::dispatcher::{self, Dispatch};
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::Span;

#[derive(Debug, Clone)]
pub struct Telemetry {
    span: Span,
    dispatch: Option<Dispatch>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(tracing::info_span!("swapscout"))
    }
}

impl Telemetry {
    pub fn new(span: Span) -> Self {
        Self { span, dispatch: None }
    }

    /// Send this context's events to `dispatch` instead of the global subscriber
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.span = dispatcher::with_default(&dispatch, || tracing::info_span!("swapscout"));
        self.dispatch = Some(dispatch);
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Context for one pipeline stage, parented on this one
    pub fn child(&self, stage: &'static str) -> Self {
        let make = || tracing::debug_span!(parent: &self.span, "stage", stage);
        let span = match &self.dispatch {
            Some(d) => dispatcher::with_default(d, make),
            None => make(),
        };
        Self {
            span,
            dispatch: self.dispatch.clone(),
        }
    }

    /// Run `fut` inside this context's span (and dispatcher, when set)
    pub fn instrument<'a, F>(&self, fut: F) -> BoxFuture<'a, F::Output>
    where
        F: Future + Send + 'a,
        F::Output: Send,
    {
        let fut = fut.instrument(self.span.clone());
        match &self.dispatch {
            Some(d) => fut.with_subscriber(d.clone()).boxed(),
            None => fut.boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LogCapture;

    #[tokio::test]
    async fn test_instrument_routes_to_injected_dispatch() {
        let capture = LogCapture::default();
        let telemetry = Telemetry::default().with_dispatch(capture.dispatch());

        Telemetry::instrument(&telemetry.child("fetch"), async { tracing::info!("inside the stage") }).await;

        let out = capture.output();
        assert!(out.contains("inside the stage"));
        assert!(out.contains("fetch"));
    }
}
