//! Poll machines for the ordered flattening strategies.
//!
//! Concat and latest need precise control over when the outer subscription
//! is pulled relative to the nested one, so both are written as explicit
//! `Stream` state machines instead of combinator stacks. Merge has no such
//! ordering constraint and lives on `flatten_unordered` in the parent
//! module.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};

use super::Emissions;
use crate::error::StreamResult;

/// Nested-sequence factory with the source type erased.
type Make<T, U> = Box<dyn FnMut(T) -> Emissions<U> + Send>;

/// One nested run at a time, drained to completion before the outer
/// subscription is polled again.
pub(super) struct ConcatFlatten<T, U> {
    outer: Emissions<T>,
    make: Make<T, U>,
    inner: Option<Emissions<U>>,
    done: bool,
}

impl<T, U> ConcatFlatten<T, U> {
    pub(super) fn new(outer: Emissions<T>, make: Make<T, U>) -> Self {
        Self {
            outer,
            make,
            inner: None,
            done: false,
        }
    }
}

impl<T, U> Stream for ConcatFlatten<T, U> {
    type Item = StreamResult<U>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(inner) = this.inner.as_mut() {
                match inner.poll_next_unpin(cx) {
                    Poll::Ready(Some(item)) => {
                        if item.is_err() {
                            this.done = true;
                        }
                        return Poll::Ready(Some(item));
                    }
                    Poll::Ready(None) => this.inner = None,
                    Poll::Pending => return Poll::Pending,
                }
            }

            // No nested run in flight, pull the outer subscription.
            match this.outer.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    this.inner = Some((this.make)(value));
                }
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Only the most recently started nested run contributes output.
///
/// The outer subscription gets first claim on every poll cycle, so a
/// replacement lands before a superseded run can slip another value out.
/// Dropping the previous subscription abandons it mid-script.
pub(super) struct LatestFlatten<T, U> {
    outer: Emissions<T>,
    make: Make<T, U>,
    inner: Option<Emissions<U>>,
    outer_done: bool,
    done: bool,
}

impl<T, U> LatestFlatten<T, U> {
    pub(super) fn new(outer: Emissions<T>, make: Make<T, U>) -> Self {
        Self {
            outer,
            make,
            inner: None,
            outer_done: false,
            done: false,
        }
    }
}

impl<T, U> Stream for LatestFlatten<T, U> {
    type Item = StreamResult<U>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        if !this.outer_done {
            loop {
                match this.outer.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(value))) => {
                        this.inner = Some((this.make)(value));
                    }
                    Poll::Ready(Some(Err(error))) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Ready(None) => {
                        this.outer_done = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }

        if let Some(inner) = this.inner.as_mut() {
            match inner.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => {
                    if item.is_err() {
                        this.done = true;
                    }
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => this.inner = None,
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.outer_done && this.inner.is_none() {
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StreamError;
    use crate::source::ColdSource;
    use std::time::Duration;

    const GAP: Duration = Duration::from_millis(250);

    /// emit 1, pause, emit 2
    fn outer() -> ColdSource<i64> {
        ColdSource::new(|script| {
            script.emit(1);
            script.pause(GAP);
            script.emit(2);
        })
    }

    /// emit v+1, pause, emit v+2
    fn nested(value: i64) -> ColdSource<i64> {
        ColdSource::new(move |script| {
            script.emit(value + 1);
            script.pause(GAP);
            script.emit(value + 2);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concat_drains_each_nested_run_completely() {
        let values = outer()
            .subscribe()
            .flatten_concat(nested)
            .collect_values()
            .await;
        assert_eq!(values, Ok(vec![2, 3, 3, 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concat_holds_the_outer_producer() {
        let started = tokio::time::Instant::now();
        let values = outer()
            .subscribe()
            .flatten_concat(nested)
            .collect_values()
            .await
            .expect("collect");
        assert_eq!(values.len(), 4);
        // outer pause only starts after the first nested run is drained
        assert_eq!(started.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_abandons_the_superseded_run() {
        let values = outer()
            .subscribe()
            .flatten_latest(nested)
            .collect_values()
            .await;
        // the first run's trailing value is dropped when outer emits 2
        assert_eq!(values, Ok(vec![2, 3, 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_runs_nested_subscriptions_concurrently() {
        let started = tokio::time::Instant::now();
        let mut values = outer()
            .subscribe()
            .flatten_merge(nested)
            .collect_values()
            .await
            .expect("collect");

        // all four values arrive, ending when the second run completes
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(values.first(), Some(&2));
        assert_eq!(values.last(), Some(&4));
        values.sort_unstable();
        assert_eq!(values, vec![2, 3, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_failure_terminates_concat() {
        let failing = ColdSource::new(|script| {
            script.emit(1);
            script.emit_with(|| Err(StreamError::production("outer died")));
        });

        let result = failing
            .subscribe()
            .flatten_concat(nested)
            .collect_values()
            .await;
        assert_eq!(result, Err(StreamError::production("outer died")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_failure_terminates_latest() {
        let single = ColdSource::new(|script| script.emit(1));
        let result = single
            .subscribe()
            .flatten_latest(|_| {
                ColdSource::<i64>::new(|script| {
                    script.emit_with(|| Err(StreamError::production("nested died")))
                })
            })
            .collect_values()
            .await;
        assert_eq!(result, Err(StreamError::production("nested died")));
    }
}
