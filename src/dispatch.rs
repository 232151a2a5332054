//! Named execution contexts for stream consumers.
//!
//! Tasks in this crate never reach for an ambient global; they receive a
//! [`Dispatchers`] implementation and pick a context by role: `main` for
//! UI-affine work, `io` for waiting-heavy consumers, `compute` for
//! CPU-bound transforms. Tests swap in [`TestDispatchers`], which maps
//! every role onto the current runtime so a single paused clock governs
//! all pipeline tasks.

use std::io;

use tokio::runtime::{Builder, Handle, Runtime};

/// Provides the three named execution contexts.
pub trait Dispatchers: Send + Sync {
    /// Context for UI-affine consumers.
    fn main(&self) -> Handle;

    /// Context for waiting-heavy consumers.
    fn io(&self) -> Handle;

    /// Context for CPU-bound transforms.
    fn compute(&self) -> Handle;
}

/// Production dispatchers.
///
/// The caller's runtime drives `main`; two owned runtimes with named
/// worker threads drive `io` and `compute`. The owned runtimes are shut
/// down in the background on drop, so a `DefaultDispatchers` can be
/// dropped from inside an async context without blocking it.
pub struct DefaultDispatchers {
    main: Handle,
    io: Handle,
    compute: Handle,
    owned: Vec<Runtime>,
}

impl DefaultDispatchers {
    /// Build dispatchers around an existing main runtime handle.
    pub fn new(main: Handle) -> io::Result<Self> {
        let io_runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("runnel-io")
            .enable_all()
            .build()?;
        let compute_runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("runnel-compute")
            .enable_all()
            .build()?;

        Ok(Self {
            main,
            io: io_runtime.handle().clone(),
            compute: compute_runtime.handle().clone(),
            owned: vec![io_runtime, compute_runtime],
        })
    }

    /// Build dispatchers from inside a running runtime, which becomes the
    /// `main` context.
    pub fn from_current() -> io::Result<Self> {
        let main = Handle::try_current()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Self::new(main)
    }
}

impl Dispatchers for DefaultDispatchers {
    fn main(&self) -> Handle {
        self.main.clone()
    }

    fn io(&self) -> Handle {
        self.io.clone()
    }

    fn compute(&self) -> Handle {
        self.compute.clone()
    }
}

impl Drop for DefaultDispatchers {
    fn drop(&mut self) {
        for runtime in self.owned.drain(..) {
            runtime.shutdown_background();
        }
    }
}

/// Test dispatchers: every role resolves to the current runtime.
///
/// Combined with `#[tokio::test(start_paused = true)]` this puts all
/// pipeline tasks under one virtual clock, which makes timed scripts
/// deterministic. Must be used from within a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestDispatchers;

impl Dispatchers for TestDispatchers {
    fn main(&self) -> Handle {
        Handle::current()
    }

    fn io(&self) -> Handle {
        Handle::current()
    }

    fn compute(&self) -> Handle {
        Handle::current()
    }
}
