//! Hot broadcast channel.
//!
//! [`Broadcast`] delivers each published value to every live subscriber
//! through an unbounded per-subscriber queue. Publishing never waits: a
//! slow subscriber only grows its own queue, and a value published while
//! no subscriber is attached is dropped on the floor.
//!
//! Dropping one subscription affects neither the publisher nor the other
//! subscribers. Subscription streams end when every handle to the channel
//! is gone.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::emissions::{Emissions, Observable};
use crate::error::StreamResult;

/// Multi-subscriber live channel. Cloning shares the channel.
pub struct Broadcast<T> {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<StreamResult<T>>>>>,
}

impl<T> Broadcast<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Deliver `value` to every live subscriber.
    ///
    /// Returns the number of queues the value landed in. Zero means
    /// nobody was listening and the value is gone.
    pub fn publish(&self, value: T) -> usize {
        let mut senders = self.lock_senders();
        senders.retain(|tx| tx.send(Ok(value.clone())).is_ok());
        let delivered = senders.len();
        if delivered == 0 {
            debug!("broadcast value dropped, no subscribers attached");
        }
        delivered
    }

    /// Register a fresh queue and return its subscription.
    ///
    /// The subscriber sees every value published from this point on.
    pub fn subscribe(&self) -> Emissions<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_senders().push(tx);
        Emissions::new(QueueStream { rx })
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut senders = self.lock_senders();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    fn lock_senders(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<StreamResult<T>>>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + 'static> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            senders: Arc::clone(&self.senders),
        }
    }
}

impl<T> Observable<T> for Broadcast<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self) -> Emissions<T> {
        Broadcast::subscribe(self)
    }
}

/// One subscriber's private queue.
struct QueueStream<T> {
    rx: mpsc::UnboundedReceiver<StreamResult<T>>,
}

impl<T> Stream for QueueStream<T> {
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
