//! Delivery policies for [`Emissions::consume`].
//!
//! The three decoupled policies share one shape: a relay task pulls the
//! subscription and feeds a hand-off structure sized by the policy, an
//! unbounded queue for `Buffer` and a single overwriting slot for
//! `Conflate`, while the handler drains it from the consuming task.
//! `Latest` needs no relay at all; it races the subscription against the
//! in-flight handler and restarts on every arrival.
//!
//! Every variant stops pulling the producer as soon as the consuming side
//! goes away. The relays race each upstream pull against consumer
//! teardown, so dropping a `consume` future mid-pause also drops the
//! subscription and its pending timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::StreamExt;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use super::Emissions;
use crate::error::StreamResult;

/// Queue discipline between a producer and the handler in
/// [`Emissions::consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No decoupling: the producer waits while the handler runs.
    Direct,
    /// Unbounded queue: the producer never waits and every value is
    /// handled in order.
    Buffer,
    /// Single slot: undelivered values are overwritten and the handler
    /// always picks up the newest one. The final value is never lost.
    Conflate,
    /// Restart: a new arrival aborts the in-flight handler and is
    /// processed instead. The producer is unaffected.
    Latest,
}

impl<T: Send + 'static> Emissions<T> {
    /// Drive the subscription through `handler` under `policy`.
    ///
    /// The handler processes one value at a time. Returns the first
    /// failure the pipeline surfaces, or `Ok(())` once the subscription
    /// and any outstanding handler work complete.
    pub async fn consume<F, Fut>(self, policy: Delivery, handler: F) -> StreamResult<()>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        match policy {
            Delivery::Direct => self.consume_direct(handler).await,
            Delivery::Buffer => self.consume_buffered(handler).await,
            Delivery::Conflate => self.consume_conflated(handler).await,
            Delivery::Latest => self.consume_latest(handler).await,
        }
    }

    async fn consume_direct<F, Fut>(mut self, mut handler: F) -> StreamResult<()>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        while let Some(item) = self.next().await {
            handler(item?).await;
        }
        Ok(())
    }

    async fn consume_buffered<F, Fut>(mut self, mut handler: F) -> StreamResult<()>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let relay = tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    // a dropped consumer ends production mid-pause
                    _ = tx.closed() => break,
                    item = self.next() => item,
                };
                match item {
                    Some(item) => {
                        if tx.send(item).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        let mut failure = None;
        while let Some(item) = rx.recv().await {
            match item {
                Ok(value) => handler(value).await,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        drop(rx);
        let _ = relay.await;

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn consume_conflated<F, Fut>(mut self, mut handler: F) -> StreamResult<()>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let slot = Arc::new(Slot::new());

        let feed = slot.clone();
        let relay = tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    // a dropped guard ends production mid-pause
                    _ = feed.consumer_closed() => break,
                    item = self.next() => item,
                };
                match item {
                    Some(item) => {
                        if !feed.put(item) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            feed.finish();
        });

        // Dropping the guard tells the relay to stop, even if this future
        // is abandoned mid-await.
        let guard = SlotGuard(slot.clone());
        let result = loop {
            match slot.take().await {
                Some(Ok(value)) => handler(value).await,
                Some(Err(error)) => break Err(error),
                None => break Ok(()),
            }
        };

        drop(guard);
        let _ = relay.await;
        result
    }

    async fn consume_latest<F, Fut>(mut self, mut handler: F) -> StreamResult<()>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut in_flight: Option<Pin<Box<Fut>>> = None;
        let mut upstream_open = true;

        loop {
            if !upstream_open && in_flight.is_none() {
                return Ok(());
            }

            tokio::select! {
                biased;

                item = self.next(), if upstream_open => {
                    match item {
                        Some(Ok(value)) => {
                            if in_flight.is_some() {
                                debug!("latest delivery restarting on new value");
                            }
                            in_flight = Some(Box::pin(handler(value)));
                        }
                        Some(Err(error)) => return Err(error),
                        None => upstream_open = false,
                    }
                }

                _ = async {
                    match in_flight.as_mut() {
                        Some(work) => work.as_mut().await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                }
            }
        }
    }
}

/// Single-value hand-off with overwrite semantics.
struct Slot<T> {
    state: Mutex<SlotState<T>>,
    /// Wakes the consumer when a value or completion lands.
    notify: Notify,
    /// Wakes the relay when the consumer goes away.
    closed: Notify,
}

struct SlotState<T> {
    pending: Option<StreamResult<T>>,
    producer_done: bool,
    consumer_gone: bool,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                producer_done: false,
                consumer_gone: false,
            }),
            notify: Notify::new(),
            closed: Notify::new(),
        }
    }

    /// Overwrite the pending item. Returns false once the consumer is
    /// gone.
    fn put(&self, item: StreamResult<T>) -> bool {
        {
            let mut state = self.lock();
            if state.consumer_gone {
                return false;
            }
            if state.pending.is_some() {
                debug!("conflating an undelivered value");
            }
            state.pending = Some(item);
        }
        self.notify.notify_one();
        true
    }

    fn finish(&self) {
        self.lock().producer_done = true;
        self.notify.notify_one();
    }

    /// Take the newest pending item, waiting if none is ready. `None`
    /// means the producer finished and nothing is left.
    async fn take(&self) -> Option<StreamResult<T>> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.pending.take() {
                    return Some(item);
                }
                if state.producer_done {
                    return None;
                }
            }
            // notify_one stores a permit, so a put between the unlock
            // above and this await is not missed
            self.notify.notified().await;
        }
    }

    /// Completes once the consuming side has dropped its guard.
    async fn consumer_closed(&self) {
        loop {
            if self.lock().consumer_gone {
                return;
            }
            // same permit scheme as `take`: a close between the check
            // above and this await is not missed
            self.closed.notified().await;
        }
    }

    fn close_consumer(&self) {
        self.lock().consumer_gone = true;
        self.closed.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct SlotGuard<T>(Arc<Slot<T>>);

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        self.0.close_consumer();
    }
}
