//! Marshals work from I/O tasks onto the host's main thread.
//!
//! The host scripting API is legal to call only on the main thread, while
//! the accept and connection tasks run on the endpoint's cooperative event
//! loop. The bridge is the one crossing point: an I/O task enqueues a job
//! and awaits its completion slot, and the main thread drains the queue
//! between ticks, running each job against the host.
//!
//! Jobs are plain `FnOnce` closures. They cannot await, so a job can never
//! re-enter the bridge and deadlock against its own drain.

use crate::cmd::CommandError;
use crate::host::Host;

use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::debug;

/// Work item executed on the main thread.
type Job = Box<dyn FnOnce(&mut dyn Host) -> Result<Value, CommandError> + Send>;

/// One queued unit of main-thread work: the callable plus the completion
/// slot its result or error is delivered through.
struct PendingJob {
    work: Job,
    complete: oneshot::Sender<Result<Value, CommandError>>,
}

/// How many jobs may sit in the queue before submitters are backpressured.
/// Each accepted connection contributes at most one job, so this is far
/// above anything a loopback automation client produces.
const QUEUE_DEPTH: usize = 256;

/// The drain half of the bridge. Owned by the main thread.
pub struct MainThreadBridge {
    queue: mpsc::Receiver<PendingJob>,
}

/// The submit half of the bridge. Cloned into every connection task.
#[derive(Clone)]
pub struct BridgeHandle {
    jobs: mpsc::Sender<PendingJob>,

    /// How long a submitter waits for its completion slot before giving up
    /// and reporting the main thread unresponsive. The job itself is not
    /// cancelled; the single-threaded host model forbids that.
    wait: Duration,
}

/// Create a connected bridge pair.
pub fn channel(wait: Duration) -> (BridgeHandle, MainThreadBridge) {
    let (jobs, queue) = mpsc::channel(QUEUE_DEPTH);
    (BridgeHandle { jobs, wait }, MainThreadBridge { queue })
}

impl BridgeHandle {
    /// Schedule `work` onto the main thread and wait for its result.
    ///
    /// Jobs run in submission order. On timeout the caller gets
    /// `CommandError::MainThreadTimeout` while the job stays queued and
    /// will still run to completion on a later drain.
    pub async fn execute_on_main<F>(&self, work: F) -> Result<Value, CommandError>
    where
        F: FnOnce(&mut dyn Host) -> Result<Value, CommandError> + Send + 'static,
    {
        let (complete, slot) = oneshot::channel();
        let job = PendingJob {
            work: Box::new(work),
            complete,
        };

        if self.jobs.send(job).await.is_err() {
            // The drain half is gone, which only happens while the whole
            // endpoint is being torn down.
            return Err(CommandError::MainThreadTimeout);
        }

        match time::timeout(self.wait, slot).await {
            Ok(Ok(result)) => result,
            Ok(Err(_dropped)) => Err(CommandError::MainThreadTimeout),
            Err(_elapsed) => {
                debug!(wait = ?self.wait, "gave up waiting for the main thread");
                Err(CommandError::MainThreadTimeout)
            }
        }
    }
}

impl MainThreadBridge {
    /// Run every queued job against `host`, in submission order.
    ///
    /// Must only be called from the main thread; `host` being `&mut` and
    /// not `Send`-bounded keeps the compiler on our side here. Returns the
    /// number of jobs executed.
    pub fn drain(&mut self, host: &mut dyn Host) -> usize {
        let mut executed = 0;
        while let Ok(job) = self.queue.try_recv() {
            let result = (job.work)(host);
            // The submitter may have timed out and dropped its slot. The
            // job still ran, which is the documented contract.
            let _ = job.complete.send(result);
            executed += 1;
        }
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DemoHost;
    use serde_json::json;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let (handle, mut bridge) = channel(Duration::from_secs(5));
        let mut host = DemoHost::new();

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.execute_on_main(|_| Ok(json!(1))).await }
        });
        let second = tokio::spawn({
            let handle = handle.clone();
            async move { handle.execute_on_main(|_| Ok(json!(2))).await }
        });

        // Drain until both submissions have passed through the queue.
        let mut executed = 0;
        while executed < 2 {
            executed += bridge.drain(&mut host);
            tokio::task::yield_now().await;
        }

        assert_eq!(first.await.unwrap().unwrap(), json!(1));
        assert_eq!(second.await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_times_out_when_nothing_drains() {
        let (handle, _bridge) = channel(Duration::from_millis(50));

        let err = handle
            .execute_on_main(|_| Ok(json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::MainThreadTimeout));
    }
}
