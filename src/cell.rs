//! Observable single-value state.
//!
//! [`StateCell`] keeps exactly one current value. Reads are synchronous,
//! writes replace the value and wake subscribers, and a subscription
//! always yields the current value before any later write. Bursts of
//! writes conflate: a subscriber observes the newest value, not
//! necessarily every intermediate one.

use tokio::sync::watch;

use crate::emissions::{Emissions, Observable};

/// A replaceable value cell with replay-one subscription semantics.
///
/// The cell is single-writer by convention; the owner mutates it through
/// [`StateCell::write`] or [`StateCell::update`].
pub struct StateCell<T> {
    tx: watch::Sender<T>,
    // retaining one receiver keeps writes valid with zero subscribers
    _keep: watch::Receiver<T>,
}

impl<T> StateCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, keep) = watch::channel(initial);
        Self { tx, _keep: keep }
    }

    /// The current value.
    pub fn read(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value and wake subscribers.
    pub fn write(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Read-modify-write in one step.
    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.tx.send_modify(|current| {
            let next = apply(current);
            *current = next;
        });
    }

    /// Subscribe: the value current at first poll, then every observed
    /// write.
    pub fn subscribe(&self) -> Emissions<T> {
        let rx = self.tx.subscribe();
        Emissions::new(futures::stream::unfold(
            (false, rx),
            |(started, mut rx)| async move {
                if !started {
                    let value = rx.borrow_and_update().clone();
                    return Some((Ok(value), (true, rx)));
                }
                match rx.changed().await {
                    Ok(()) => {
                        let value = rx.borrow_and_update().clone();
                        Some((Ok(value), (true, rx)))
                    }
                    // cell dropped, nothing more will ever arrive
                    Err(_) => None,
                }
            },
        ))
    }
}

impl<T> Observable<T> for StateCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self) -> Emissions<T> {
        StateCell::subscribe(self)
    }
}
