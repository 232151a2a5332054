//! The subscription stream and its operator set.
//!
//! [`Emissions`] is the carrier every component hands out: a stream of
//! `StreamResult<T>` items from one subscription. Operators transform it
//! in place, terminals consume it, and [`Emissions::consume`] drives it
//! through a handler under a selectable [`Delivery`] policy.
//!
//! Failures are terminal. An `Err` item is the last meaningful thing a
//! pipeline yields; operators pass it through untouched and terminals
//! stop on it. Nothing in this module retries.
//!
//! # Example
//!
//! ```ignore
//! let sum = countdown(5, step)
//!     .subscribe()
//!     .filter(|v| v % 2 == 0)
//!     .map(|v| v * v)
//!     .fold(0, |acc, v| acc + v)
//!     .await?;
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::cancel::CancelToken;
use crate::error::{StreamError, StreamResult};

mod deliver;
mod flatten;

pub use deliver::Delivery;

/// Anything that can hand out a fresh emission stream.
///
/// Cold sources start a new script run per call; hot channels register a
/// new queue; state cells replay their current value first. The caller
/// cannot tell which from the stream alone, and the operators do not care.
pub trait Observable<T> {
    /// Open a new subscription.
    fn subscribe(&self) -> Emissions<T>;
}

/// The value stream of one subscription.
///
/// `Emissions` is `Unpin`, so it can be polled directly, driven by
/// `futures::StreamExt`, or passed to the operators below.
pub struct Emissions<T> {
    inner: BoxStream<'static, StreamResult<T>>,
}

impl<T> Stream for Emissions<T> {
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl<T: Send + 'static> Emissions<T> {
    /// Wrap a raw stream. Components call this from their `subscribe`.
    pub(crate) fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = StreamResult<T>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A subscription that fails immediately with `error`.
    pub(crate) fn failed(error: StreamError) -> Self {
        Self::new(stream::iter(std::iter::once(Err(error))))
    }

    // ===== Intermediate operators =====

    /// Keep only values matching the predicate. Failures pass through.
    pub fn filter<P>(self, mut predicate: P) -> Emissions<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Emissions::new(self.inner.filter_map(move |item| {
            let keep = match &item {
                Ok(value) => predicate(value),
                Err(_) => true,
            };
            futures::future::ready(keep.then_some(item))
        }))
    }

    /// Transform each value.
    pub fn map<U, F>(self, mut transform: F) -> Emissions<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Emissions::new(self.inner.map(move |item| item.map(&mut transform)))
    }

    /// Observe each value without consuming it.
    pub fn on_each<F>(self, mut observe: F) -> Emissions<T>
    where
        F: FnMut(&T) + Send + 'static,
    {
        Emissions::new(self.inner.map(move |item| {
            if let Ok(value) = &item {
                observe(value);
            }
            item
        }))
    }

    /// End the subscription when `token` cancels, surfacing the teardown
    /// as one final [`StreamError::Cancelled`] item.
    ///
    /// Cancellation wins a tie against a ready value.
    pub fn until_cancelled(self, token: CancelToken) -> Emissions<T> {
        Emissions::new(stream::unfold(
            (self.inner, token, false),
            |(mut inner, token, done)| async move {
                if done {
                    return None;
                }
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    item = inner.next() => Some(item),
                };
                match next {
                    None => Some((Err(StreamError::Cancelled), (inner, token, true))),
                    Some(Some(item)) => Some((item, (inner, token, false))),
                    Some(None) => None,
                }
            },
        ))
    }

    // ===== Flattening =====

    /// Map each value to a nested sequence and drain every nested run to
    /// completion before pulling the next outer value.
    ///
    /// The outer producer is held at its emission point while a nested
    /// run is in flight.
    pub fn flatten_concat<U, S, F>(self, mut make: F) -> Emissions<U>
    where
        U: Send + 'static,
        S: Observable<U>,
        F: FnMut(T) -> S + Send + 'static,
    {
        Emissions::new(flatten::ConcatFlatten::new(
            self,
            Box::new(move |value| make(value).subscribe()),
        ))
    }

    /// Map each value to a nested sequence and run all nested
    /// subscriptions concurrently, ordering output by emission time.
    ///
    /// The outer sequence is pulled eagerly. Intra-instant order between
    /// different nested runs is not specified.
    pub fn flatten_merge<U, S, F>(self, mut make: F) -> Emissions<U>
    where
        U: Send + 'static,
        S: Observable<U>,
        F: FnMut(T) -> S + Send + 'static,
    {
        let merged = self
            .inner
            .map(move |item| match item {
                Ok(value) => make(value).subscribe(),
                Err(error) => Emissions::failed(error),
            })
            .flatten_unordered(None)
            .scan(false, |failed, item| {
                if *failed {
                    return futures::future::ready(None);
                }
                *failed = item.is_err();
                futures::future::ready(Some(item))
            });
        Emissions::new(merged)
    }

    /// Map each value to a nested sequence, keeping only the most recent
    /// one: a new outer value drops the in-flight nested run mid-script.
    ///
    /// When an outer value and a nested emission become ready in the same
    /// instant, the outer value wins and the nested emission is abandoned.
    pub fn flatten_latest<U, S, F>(self, mut make: F) -> Emissions<U>
    where
        U: Send + 'static,
        S: Observable<U>,
        F: FnMut(T) -> S + Send + 'static,
    {
        Emissions::new(flatten::LatestFlatten::new(
            self,
            Box::new(move |value| make(value).subscribe()),
        ))
    }

    // ===== Terminal operators =====

    /// Count the values matching the predicate.
    pub async fn count_where<P>(mut self, mut predicate: P) -> StreamResult<usize>
    where
        P: FnMut(&T) -> bool,
    {
        let mut count = 0;
        while let Some(item) = self.next().await {
            let value = item?;
            if predicate(&value) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Combine all values left to right.
    ///
    /// Fails with [`StreamError::EmptyReduction`] when the subscription
    /// completes without emitting.
    pub async fn reduce<F>(mut self, mut combine: F) -> StreamResult<T>
    where
        F: FnMut(T, T) -> T,
    {
        let mut accumulator: Option<T> = None;
        while let Some(item) = self.next().await {
            let value = item?;
            accumulator = Some(match accumulator.take() {
                Some(previous) => combine(previous, value),
                None => value,
            });
        }
        accumulator.ok_or(StreamError::EmptyReduction)
    }

    /// Combine all values onto a seed. An empty subscription returns the
    /// seed unchanged.
    pub async fn fold<A, F>(mut self, seed: A, mut combine: F) -> StreamResult<A>
    where
        F: FnMut(A, T) -> A,
    {
        let mut accumulator = seed;
        while let Some(item) = self.next().await {
            accumulator = combine(accumulator, item?);
        }
        Ok(accumulator)
    }

    /// Collect every value, stopping at the first failure.
    pub async fn collect_values(mut self) -> StreamResult<Vec<T>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    /// Drive the subscription to completion, handing each value to `sink`.
    pub async fn collect_each<F>(mut self, mut sink: F) -> StreamResult<()>
    where
        F: FnMut(T),
    {
        while let Some(item) = self.next().await {
            sink(item?);
        }
        Ok(())
    }
}
