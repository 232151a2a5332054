//! Cold scripted sources.
//!
//! A [`ColdSource`] holds an immutable script of emit and pause steps and
//! interprets it from the top for every subscriber. Nothing runs until a
//! subscription is polled, two subscriptions never share a cursor, and
//! dropping a subscription mid-pause abandons the rest of the script along
//! with its pending timer.
//!
//! Scripts are cheap value lists, so re-executing one per subscription is
//! the intended cost model. Side effects belong in the consumer, not in
//! the script.
//!
//! # Example
//!
//! ```ignore
//! let source = ColdSource::new(|script| {
//!     script.emit(1);
//!     script.pause(Duration::from_millis(250));
//!     script.emit(2);
//! });
//!
//! let values = source.subscribe().collect_values().await?;
//! assert_eq!(values, vec![1, 2]);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{sleep, Sleep};

use crate::emissions::{Emissions, Observable};
use crate::error::StreamResult;

/// One step of a cold script.
enum Step<T> {
    /// Suspend the subscription for the duration.
    Pause(Duration),
    /// Yield a value to the subscriber.
    Emit(Produce<T>),
}

/// How an emitted value is obtained.
enum Produce<T> {
    /// A pre-built value, cloned per subscription.
    Value(T),
    /// A computation run at emission time. A failure ends the
    /// subscription after the error is surfaced.
    Try(Arc<dyn Fn() -> StreamResult<T> + Send + Sync>),
}

/// Builder handed to the script closure of [`ColdSource::new`].
pub struct Script<T> {
    steps: Vec<Step<T>>,
}

impl<T> Script<T> {
    /// Append an emission of a fixed value.
    pub fn emit(&mut self, value: T) {
        self.steps.push(Step::Emit(Produce::Value(value)));
    }

    /// Append an emission computed at subscription time.
    ///
    /// The producer runs once per subscription per step; returning an
    /// error terminates that subscription.
    pub fn emit_with<F>(&mut self, produce: F)
    where
        F: Fn() -> StreamResult<T> + Send + Sync + 'static,
    {
        self.steps.push(Step::Emit(Produce::Try(Arc::new(produce))));
    }

    /// Append a timed pause.
    pub fn pause(&mut self, duration: Duration) {
        self.steps.push(Step::Pause(duration));
    }
}

/// A cold, scripted producer. Cloning shares the script, not a cursor.
pub struct ColdSource<T> {
    steps: Arc<[Step<T>]>,
}

impl<T> ColdSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build a source from a script closure.
    pub fn new<F>(build: F) -> Self
    where
        F: FnOnce(&mut Script<T>),
    {
        let mut script = Script { steps: Vec::new() };
        build(&mut script);
        Self {
            steps: script.steps.into(),
        }
    }

    /// Start one independent run of the script.
    pub fn subscribe(&self) -> Emissions<T> {
        Emissions::new(ScriptStream {
            steps: Arc::clone(&self.steps),
            next: 0,
            pause: None,
        })
    }
}

impl<T> Clone for ColdSource<T> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
        }
    }
}

impl<T> Observable<T> for ColdSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self) -> Emissions<T> {
        ColdSource::subscribe(self)
    }
}

/// Pull-driven interpreter for one subscription.
///
/// The producer is synchronous with respect to its subscriber: an
/// emission is handed over only when the subscriber polls it through.
struct ScriptStream<T> {
    steps: Arc<[Step<T>]>,
    next: usize,
    pause: Option<Pin<Box<Sleep>>>,
}

impl<T: Clone> Stream for ScriptStream<T> {
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(pause) = this.pause.as_mut() {
                match pause.as_mut().poll(cx) {
                    Poll::Ready(()) => this.pause = None,
                    Poll::Pending => return Poll::Pending,
                }
            }

            match this.steps.get(this.next) {
                None => return Poll::Ready(None),
                Some(Step::Pause(duration)) => {
                    this.next += 1;
                    this.pause = Some(Box::pin(sleep(*duration)));
                }
                Some(Step::Emit(produce)) => {
                    this.next += 1;
                    let item = match produce {
                        Produce::Value(value) => Ok(value.clone()),
                        Produce::Try(producer) => producer(),
                    };
                    if item.is_err() {
                        // skip the rest of the script
                        this.next = this.steps.len();
                    }
                    return Poll::Ready(Some(item));
                }
            }
        }
    }
}
