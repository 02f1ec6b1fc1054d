use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Listen for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value
/// is ever sent. Once a value has been sent via the broadcast channel, the
/// server should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal
/// has been received. Callers may query for whether the shutdown signal has
/// been received or not.
#[derive(Debug)]
pub(crate) struct Shutdown {
    /// `true` if the shutdown signal has been received.
    is_shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub(crate) async fn recv(&mut self) {
        // If the shutdown signal has already been received, return
        // immediately.
        if self.is_shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        self.is_shutdown = true;
    }
}

/// Why the process was asked to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// A client issued the shutdown command.
    Shutdown,

    /// The process received an interrupt or terminate signal.
    Signal,
}

/// Process-wide exit request, shared between the per-connection tasks, the
/// signal watcher and the keep-alive driver.
///
/// This is the orderly-shutdown sentinel: setting it never unwinds through
/// handler code. The keep-alive driver observes it between ticks, stops the
/// server instance and returns control to the embedding binary, which is
/// the only place the process actually terminates.
#[derive(Debug, Clone, Default)]
pub struct ExitFlag {
    cause: Arc<AtomicU8>,
}

const EXIT_NONE: u8 = 0;
const EXIT_SHUTDOWN: u8 = 1;
const EXIT_SIGNAL: u8 = 2;

impl ExitFlag {
    pub fn new() -> ExitFlag {
        ExitFlag::default()
    }

    /// Record an exit request. The first cause wins; later requests are
    /// ignored so the reported reason stays stable.
    pub fn request(&self, cause: ExitCause) {
        let encoded = match cause {
            ExitCause::Shutdown => EXIT_SHUTDOWN,
            ExitCause::Signal => EXIT_SIGNAL,
        };
        let _ = self.cause.compare_exchange(
            EXIT_NONE,
            encoded,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn requested(&self) -> Option<ExitCause> {
        match self.cause.load(Ordering::Acquire) {
            EXIT_SHUTDOWN => Some(ExitCause::Shutdown),
            EXIT_SIGNAL => Some(ExitCause::Signal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_exit_cause_wins() {
        let flag = ExitFlag::new();
        assert_eq!(flag.requested(), None);

        flag.request(ExitCause::Shutdown);
        flag.request(ExitCause::Signal);
        assert_eq!(flag.requested(), Some(ExitCause::Shutdown));
    }
}
