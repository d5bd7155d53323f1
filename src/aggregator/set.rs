//! Independently-resolving quote results
//!
//! A `QuoteSet` is what the orchestrator hands back: one pending result per
//! candidate provider, each tagged with the provider's position in the
//! candidate list. Consumers either drain it in completion order or collect
//! it in request order.
//!
//! Results come from detached tokio tasks. Dropping a set (or stopping
//! early, as `fastest` does) drops the `JoinHandle`s without aborting the
//! tasks, so unfinished provider calls run to completion in the background
//! and their results are discarded.

use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesUnordered, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::types::Quote;

/// A result paired with the position of the provider that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indexed<T> {
    pub index: usize,
    pub result: T,
}

/// Post-processing applied to each quote inside its provider task
pub type Transform<T> = Arc<dyn Fn(Quote) -> BoxFuture<'static, T> + Send + Sync>;

/// The transform that leaves quotes untouched
pub fn identity() -> Transform<Quote> {
    Arc::new(|quote| Box::pin(async move { quote }))
}

pub struct QuoteSet<T> {
    results: BoxStream<'static, Indexed<T>>,
    expected: Option<usize>,
}

impl<T: Send + 'static> QuoteSet<T> {
    /// Wrap spawned provider tasks, in candidate order
    pub fn from_tasks(tasks: Vec<JoinHandle<T>>) -> Self {
        let expected = tasks.len();
        let pending: FuturesUnordered<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, handle)| async move { (index, handle.await) })
            .collect();

        let results = pending
            .filter_map(|(index, joined)| async move {
                match joined {
                    Ok(result) => Some(Indexed { index, result }),
                    Err(e) => {
                        warn!(index, "quote task died before producing a result: {}", e);
                        None
                    }
                }
            })
            .boxed();

        Self {
            results,
            expected: Some(expected),
        }
    }

    /// Wrap results arriving from elsewhere (e.g. a proxy response body)
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Indexed<T>> + Send + 'static,
    {
        Self {
            results: stream.boxed(),
            expected: None,
        }
    }

    /// Number of results this set will produce, when known up front
    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn map<U, F>(self, mut f: F) -> QuoteSet<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        QuoteSet {
            results: self
                .results
                .map(move |item| Indexed {
                    index: item.index,
                    result: f(item.result),
                })
                .boxed(),
            expected: self.expected,
        }
    }

    /// Results in completion order
    pub fn into_stream(self) -> BoxStream<'static, Indexed<T>> {
        self.results
    }

    /// Wait for everything, then return results in request order
    pub async fn collect_indexed(self) -> Vec<Indexed<T>> {
        let mut all: Vec<Indexed<T>> = self.results.collect().await;
        all.sort_by_key(|item| item.index);
        all
    }

    pub async fn collect(self) -> Vec<T> {
        self.collect_indexed()
            .await
            .into_iter()
            .map(|item| item.result)
            .collect()
    }
}
