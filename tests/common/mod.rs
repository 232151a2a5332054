//! Common test utilities for integration tests.
//!
//! The tests in this suite run under `#[tokio::test(start_paused = true)]`,
//! so every timed pause in a script resolves against tokio's virtual clock
//! and elapsed milliseconds are exact. [`Recorder`] captures `(at, value)`
//! pairs against that clock, which lets a test assert a full delivery
//! schedule rather than just the values.
//!
//! # Example
//!
//! ```ignore
//! let recorder = Recorder::new();
//! let sink = recorder.clone();
//! source.subscribe().collect_each(move |v| sink.record(v)).await?;
//! assert_eq!(recorder.entries(), vec![(0, 5), (250, 4)]);
//! ```

use std::sync::{Arc, Mutex};

use tokio::time::Instant;

/// Timestamped value log for virtual-time assertions.
///
/// Clones share the log; the timestamps count milliseconds since the
/// recorder was created.
#[derive(Clone)]
pub struct Recorder<T> {
    started: Instant,
    entries: Arc<Mutex<Vec<(u64, T)>>>,
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Log `value` at the current virtual time.
    pub fn record(&self, value: T) {
        let at = self.started.elapsed().as_millis() as u64;
        self.entries.lock().unwrap().push((at, value));
    }

    /// Every `(elapsed_ms, value)` pair recorded so far.
    pub fn entries(&self) -> Vec<(u64, T)> {
        self.entries.lock().unwrap().clone()
    }

    /// The recorded values without their timestamps.
    #[allow(dead_code)]
    pub fn values(&self) -> Vec<T> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, value)| value.clone())
            .collect()
    }
}

impl<T: Clone> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}
