//! Keep-alive driver for headless operation.
//!
//! With a UI present, the host's own main-thread timer calls
//! [`Endpoint::pump`] on every fire and nothing here loops. Without one
//! the host would run its startup script and exit, so [`Endpoint::run`]
//! takes over the main thread: it alternates a pump with a short sleep
//! until an exit request propagates out, keeping the listener live and
//! the process alive.

use crate::lifecycle::Endpoint;
use crate::host::Host;
use crate::shutdown::ExitCause;

use tracing::{debug, info};

/// Why the keep-alive loop returned control to the embedding binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A client issued the shutdown command.
    ShutdownRequested,

    /// An interrupt or terminate signal arrived.
    SignalReceived,
}

impl From<ExitCause> for ExitReason {
    fn from(cause: ExitCause) -> ExitReason {
        match cause {
            ExitCause::Shutdown => ExitReason::ShutdownRequested,
            ExitCause::Signal => ExitReason::SignalReceived,
        }
    }
}

impl Endpoint {
    /// One main-thread beat: drain queued bridge jobs against `host`,
    /// then advance the event loop by one tick.
    ///
    /// This is the operation a UI-mode host wires to its recurring timer.
    /// Returns the exit reason once a shutdown request or signal has been
    /// observed; the caller then stops the endpoint and unwinds.
    pub fn pump(&mut self, host: &mut dyn Host) -> Option<ExitReason> {
        let executed = self.bridge.drain(host);
        if executed > 0 {
            debug!(executed, "drained main-thread jobs");
        }
        self.tick.tick();
        self.exit.requested().map(ExitReason::from)
    }

    /// Drive the endpoint until an exit request arrives.
    ///
    /// Guarantees a pump at least every tick period so the listener makes
    /// progress, then performs an orderly stop before returning. The
    /// caller owns actually terminating the process; an exit request
    /// never unwinds through host code.
    pub fn run(&mut self, host: &mut dyn Host) -> ExitReason {
        info!(period = ?self.config().tick_period(), "keep-alive loop driving the event loop");

        loop {
            if let Some(reason) = self.pump(host) {
                info!(?reason, "exit requested");
                // Jobs that were queued behind the exit request still run,
                // and one more tick lets their replies flush before the
                // listener goes away.
                self.bridge.drain(host);
                self.tick.tick();
                self.stop();
                return reason;
            }
            std::thread::sleep(self.config().tick_period());
        }
    }
}
