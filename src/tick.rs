//! Single-step advance of the endpoint's cooperative event loop.
//!
//! The accept task and every per-connection task run on a current-thread
//! tokio runtime that only makes progress while the main thread is inside
//! `tick()`. Every other component asks for a tick; nothing else touches
//! the runtime directly.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio::time;

/// How long one tick lets the loop run. Long enough for ready tasks and
/// ready I/O to be polled, short enough that the host never notices.
const TICK_QUANTUM: Duration = Duration::from_millis(1);

/// Owns the event loop and doles it out one quantum at a time.
#[derive(Debug)]
pub struct TickDriver {
    rt: Runtime,
}

impl TickDriver {
    /// Build the current-thread runtime the endpoint runs on.
    ///
    /// A current-thread flavor is deliberate: every task the endpoint
    /// spawns executes on whichever thread calls `tick()`, which is the
    /// host's main thread. That is what keeps the cooperative model honest.
    pub fn new() -> crate::Result<TickDriver> {
        let rt = Builder::new_current_thread().enable_all().build()?;
        Ok(TickDriver { rt })
    }

    /// Advance the loop by one non-blocking quantum.
    ///
    /// Runs all already-runnable tasks and already-ready I/O handlers, then
    /// returns. Never waits for new I/O to arrive: the deadline is the
    /// quantum, not readiness. Task failures are contained by the runtime
    /// and surface through the owning `JoinHandle`, never out of here.
    pub fn tick(&self) {
        self.rt.block_on(async { time::sleep(TICK_QUANTUM).await });
    }

    /// Run a future to completion on the loop. Used for the short-lived
    /// setup and teardown paths (bind, drain) that must not race a tick.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.rt.block_on(future)
    }

    /// Spawn a task onto the loop. The task advances only during ticks.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.rt.spawn(future)
    }
}
