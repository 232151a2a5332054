//! Owner and lifetime scope for the stream demos.
//!
//! [`Coordinator`] owns the counter cell, both broadcast channels and every
//! background consumption task. Construction attaches the notification
//! subscriber pair, publishes the one-shot hot payload and spawns one
//! fire-and-forget task per pipeline demo, each tied to the coordinator's
//! cancel scope. [`Coordinator::shutdown`] cancels the scope and waits for
//! the tasks to wind down; dropping without a shutdown still cancels.
//!
//! # Example
//!
//! ```ignore
//! let dispatchers = Arc::new(DefaultDispatchers::from_current()?);
//! let coordinator = Coordinator::new(dispatchers);
//! coordinator.say_hello();
//! coordinator.increment_counter();
//! coordinator.shutdown().await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcast;
use crate::cancel::Canceller;
use crate::cell::StateCell;
use crate::dispatch::Dispatchers;
use crate::emissions::Delivery;
use crate::error::StreamResult;
use crate::sequences::{self, COUNTDOWN_START, COUNTDOWN_STEP, PAIR_GAP};

/// Greeting script published by [`Coordinator::say_hello`].
pub const GREETINGS: [&str; 5] = [
    "Good Morning!",
    "Guten Morgen!",
    "Ohayo Gozaimasu!",
    "Sabah Alkhayr!",
    "Selamat Pagi!",
];

/// Pause between greeting publications.
pub const GREETING_GAP: Duration = Duration::from_millis(500);

/// One-shot payload for the notification channel.
pub const HOT_PAYLOAD: &str = "HOT! THE FLOW IS SO HOT!";

const FIRST_SUBSCRIBER_DELAY: Duration = Duration::from_millis(200);
const SECOND_SUBSCRIBER_DELAY: Duration = Duration::from_millis(300);
const EATING_TIME: Duration = Duration::from_millis(300);

/// Owns the demo sources and every task consuming them.
///
/// All tasks run under one cancel scope. The counter cell and the greeting
/// channel are exposed for external subscription; everything else talks to
/// the log.
pub struct Coordinator {
    dispatchers: Arc<dyn Dispatchers>,
    counter: StateCell<u64>,
    greetings: Broadcast<String>,
    notifications: Broadcast<String>,
    canceller: Canceller,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build the coordinator and start its background demos.
    ///
    /// The two notification subscribers attach before the initial publish,
    /// so the one-shot payload lands in both queues even though neither
    /// consumer has started draining yet.
    pub fn new(dispatchers: Arc<dyn Dispatchers>) -> Self {
        let coordinator = Self {
            dispatchers,
            counter: StateCell::new(0),
            greetings: Broadcast::new(),
            notifications: Broadcast::new(),
            canceller: Canceller::new(),
            tasks: Mutex::new(Vec::new()),
        };

        coordinator.spawn_notification_subscriber("first", FIRST_SUBSCRIBER_DELAY);
        coordinator.spawn_notification_subscriber("second", SECOND_SUBSCRIBER_DELAY);
        coordinator.trigger_notification();

        let main = coordinator.dispatchers.main();
        let io = coordinator.dispatchers.io();
        let compute = coordinator.dispatchers.compute();
        coordinator.spawn_demo(&main, countdown_demo());
        coordinator.spawn_demo(&main, operator_chain_demo());
        coordinator.spawn_demo(&compute, terminal_aggregation_demo());
        coordinator.spawn_demo(&main, flatten_concat_demo());
        coordinator.spawn_demo(&main, flatten_merge_demo());
        coordinator.spawn_demo(&main, flatten_latest_demo());
        coordinator.spawn_demo(&io, meal_service_demo(Delivery::Buffer));
        coordinator.spawn_demo(&io, meal_service_demo(Delivery::Conflate));
        coordinator.spawn_demo(&io, meal_service_demo(Delivery::Latest));

        coordinator
    }

    // ===== Operations =====

    /// Add one to the counter cell and return the new value.
    pub fn increment_counter(&self) -> u64 {
        self.counter.update(|count| count + 1);
        let value = self.counter.read();
        debug!(stage = "counter", value, "counter incremented");
        value
    }

    /// Publish the greeting script in the background, one value per
    /// [`GREETING_GAP`]. Only subscribers attached during the run see any
    /// of it.
    pub fn say_hello(&self) {
        let greetings = self.greetings.clone();
        let token = self.canceller.token();
        let handle = self.dispatchers.main().spawn(async move {
            let script = async {
                for greeting in GREETINGS {
                    let delivered = greetings.publish(greeting.to_string());
                    debug!(stage = "greetings", greeting, delivered, "greeting published");
                    sleep(GREETING_GAP).await;
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!(stage = "greetings", "greeting run cancelled"),
                _ = script => debug!(stage = "greetings", "greeting run complete"),
            }
        });
        self.lock_tasks().push(handle);
    }

    /// Publish the one-shot hot payload, returning how many subscribers
    /// received it. Zero means the value was dropped on the floor.
    pub fn trigger_notification(&self) -> usize {
        let delivered = self.notifications.publish(HOT_PAYLOAD.to_string());
        debug!(stage = "hot", delivered, "notification published");
        delivered
    }

    /// Counter cell, for synchronous reads and UI subscriptions.
    pub fn counter(&self) -> &StateCell<u64> {
        &self.counter
    }

    /// Greeting channel, for toast subscriptions.
    pub fn greetings(&self) -> &Broadcast<String> {
        &self.greetings
    }

    /// Notification channel.
    pub fn notifications(&self) -> &Broadcast<String> {
        &self.notifications
    }

    /// Cancel the scope and wait for every background task to finish.
    ///
    /// Production stops at each task's next suspension point; nothing
    /// outlives the drain.
    pub async fn shutdown(&self) {
        self.canceller.cancel();
        let drained: Vec<JoinHandle<()>> = {
            let mut tasks = self.lock_tasks();
            tasks.drain(..).collect()
        };
        debug!(stage = "lifecycle", tasks = drained.len(), "draining background tasks");
        for task in drained {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    warn!(stage = "lifecycle", %error, "background task failed");
                }
            }
        }
        debug!(stage = "lifecycle", "coordinator stopped");
    }

    // ===== Internals =====

    fn spawn_notification_subscriber(&self, name: &'static str, delay: Duration) {
        let subscription = self.notifications.subscribe();
        let token = self.canceller.token();
        let handle = self.dispatchers.io().spawn(async move {
            let outcome = subscription
                .until_cancelled(token)
                .consume(Delivery::Direct, move |payload| async move {
                    sleep(delay).await;
                    info!(stage = "hot", subscriber = name, payload = %payload, "notification received");
                })
                .await;
            log_outcome("hot-subscriber", outcome);
        });
        self.lock_tasks().push(handle);
    }

    fn spawn_demo<F>(&self, runtime: &Handle, demo: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.canceller.token();
        let handle = runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = demo => {}
            }
        });
        self.lock_tasks().push(handle);
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ===== Consumption demos =====

/// Log every countdown tick.
async fn countdown_demo() {
    let outcome = sequences::countdown(COUNTDOWN_START, COUNTDOWN_STEP)
        .subscribe()
        .collect_each(|value| info!(stage = "countdown", value, "tick"))
        .await;
    log_outcome("countdown", outcome);
}

/// Square the even ticks.
async fn operator_chain_demo() {
    let outcome = sequences::countdown(COUNTDOWN_START, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 == 0)
        .map(|value| value * value)
        .on_each(|square| debug!(stage = "operators", square = *square, "passing downstream"))
        .collect_each(|square| info!(stage = "operators", square, "even square"))
        .await;
    log_outcome("operators", outcome);
}

/// Count, reduce and fold over full countdown runs.
async fn terminal_aggregation_demo() {
    let even_count = sequences::countdown(COUNTDOWN_START, COUNTDOWN_STEP)
        .subscribe()
        .count_where(|value| value % 2 == 0)
        .await;
    log_terminal("count", even_count);

    let odd_sum = sequences::countdown(COUNTDOWN_START, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 != 0)
        .reduce(|total, value| total + value)
        .await;
    log_terminal("reduce", odd_sum);

    let seeded_sum = sequences::countdown(COUNTDOWN_START, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 != 0)
        .fold(100, |total, value| total + value)
        .await;
    log_terminal("fold", seeded_sum);
}

async fn flatten_concat_demo() {
    let outcome = sequences::pair(PAIR_GAP)
        .subscribe()
        .flatten_concat(|value| sequences::successors(value, PAIR_GAP))
        .collect_each(|value| info!(stage = "flatten-concat", value, "emission"))
        .await;
    log_outcome("flatten-concat", outcome);
}

async fn flatten_merge_demo() {
    let outcome = sequences::pair(PAIR_GAP)
        .subscribe()
        .flatten_merge(|value| sequences::successors(value, PAIR_GAP))
        .collect_each(|value| info!(stage = "flatten-merge", value, "emission"))
        .await;
    log_outcome("flatten-merge", outcome);
}

async fn flatten_latest_demo() {
    let outcome = sequences::pair(PAIR_GAP)
        .subscribe()
        .flatten_latest(|value| sequences::successors(value, PAIR_GAP))
        .collect_each(|value| info!(stage = "flatten-latest", value, "emission"))
        .await;
    log_outcome("flatten-latest", outcome);
}

/// Serve three courses to a slow eater under `policy`.
async fn meal_service_demo(policy: Delivery) {
    let stage = meal_stage(policy);
    let outcome = sequences::meal_courses()
        .subscribe()
        .on_each(move |course| info!(stage, course = *course, "serving"))
        .consume(policy, move |course| async move {
            info!(stage, course, "now eating");
            sleep(EATING_TIME).await;
            info!(stage, course, "finished eating");
        })
        .await;
    log_outcome(stage, outcome);
}

fn meal_stage(policy: Delivery) -> &'static str {
    match policy {
        Delivery::Direct => "meals-direct",
        Delivery::Buffer => "meals-buffer",
        Delivery::Conflate => "meals-conflate",
        Delivery::Latest => "meals-latest",
    }
}

fn log_outcome(stage: &'static str, outcome: StreamResult<()>) {
    match outcome {
        Ok(()) => debug!(stage, "run complete"),
        Err(error) if error.is_cancellation() => debug!(stage, "run cancelled"),
        Err(error) => warn!(stage, %error, "run failed"),
    }
}

fn log_terminal<T: fmt::Debug>(stage: &'static str, outcome: StreamResult<T>) {
    match outcome {
        Ok(value) => info!(stage, result = ?value, "terminal result"),
        Err(error) if error.is_cancellation() => debug!(stage, "run cancelled"),
        Err(error) => warn!(stage, %error, "terminal failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TestDispatchers;
    use futures::StreamExt;

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(TestDispatchers))
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_counter_is_read_back() {
        let coordinator = coordinator();
        assert_eq!(coordinator.counter().read(), 0);

        coordinator.increment_counter();
        coordinator.increment_counter();
        assert_eq!(coordinator.increment_counter(), 3);
        assert_eq!(coordinator.counter().read(), 3);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_notification_counts_live_subscribers() {
        let coordinator = coordinator();

        // Two internal subscribers plus this one.
        let mut outside = coordinator.notifications().subscribe();
        assert_eq!(coordinator.trigger_notification(), 3);
        assert_eq!(outside.next().await, Some(Ok(HOT_PAYLOAD.to_string())));

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_detaches_internal_subscribers() {
        let coordinator = coordinator();
        coordinator.shutdown().await;

        // The subscriber tasks are gone, so a publish reaches no one.
        assert_eq!(coordinator.trigger_notification(), 0);

        // A second shutdown finds nothing left to drain.
        coordinator.shutdown().await;
    }
}
