//! Process-scoped glue that owns the endpoint's moving parts.
//!
//! An [`Endpoint`] bundles the event loop, the main-thread bridge, the
//! command table and the server instance, and routes all external control
//! through `start`, `stop` and `force_cleanup`. The embedding binary
//! creates exactly one and keeps it for the life of the process.

use crate::bridge::{self, BridgeHandle, MainThreadBridge};
use crate::cmd::{CommandFn, HandlerTable};
use crate::config::Config;
use crate::server::{ServeContext, ServerInstance, ServerState};
use crate::shutdown::{ExitCause, ExitFlag};
use crate::tick::TickDriver;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// The in-process command endpoint.
///
/// Owns the cooperative event loop and everything scheduled on it. The
/// thread that calls [`Endpoint::pump`] or [`Endpoint::run`] is the
/// endpoint's main thread: every command executes there, against the host
/// the caller passes in.
pub struct Endpoint {
    config: Config,
    pub(crate) tick: TickDriver,
    pub(crate) bridge: MainThreadBridge,
    bridge_handle: BridgeHandle,
    pub(crate) exit: ExitFlag,
    table: HandlerTable,
    server: ServerInstance,
}

impl Endpoint {
    /// Build an endpoint with the built-in command set.
    pub fn new(config: Config) -> crate::Result<Endpoint> {
        Endpoint::with_table(config, HandlerTable::builtin())
    }

    /// Build an endpoint with a custom command table. The table should
    /// normally start from [`HandlerTable::builtin`].
    pub fn with_table(config: Config, table: HandlerTable) -> crate::Result<Endpoint> {
        let tick = TickDriver::new()?;
        let (bridge_handle, bridge) = bridge::channel(config.bridge_timeout());
        Ok(Endpoint {
            config,
            tick,
            bridge,
            bridge_handle,
            exit: ExitFlag::new(),
            table,
            server: ServerInstance::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        self.server.state()
    }

    /// The bound listening address, once running. Resolves a configured
    /// port of 0 to the concrete ephemeral port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Handle other threads can use to request an orderly exit, the same
    /// way the shutdown command does.
    pub fn exit_flag(&self) -> ExitFlag {
        self.exit.clone()
    }

    /// Register a provider command. Only allowed while the server is
    /// stopped; the table is read-only once it is running. Returns
    /// `false` when the name is already taken.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        run: CommandFn,
    ) -> crate::Result<bool> {
        if self.server.state() != ServerState::Stopped {
            return Err("command registration is only allowed before the server starts".into());
        }
        Ok(self.table.register(name, run))
    }

    /// Merge a provider command table. Same rules as `register_handler`.
    pub fn register_providers(&mut self, providers: HandlerTable) -> crate::Result<()> {
        if self.server.state() != ServerState::Stopped {
            return Err("command registration is only allowed before the server starts".into());
        }
        self.table.merge(providers);
        Ok(())
    }

    /// Bind the configured port and start accepting connections.
    pub fn start(&mut self) -> crate::Result<()> {
        let ctx = ServeContext {
            table: Arc::new(self.table.clone()),
            bridge: self.bridge_handle.clone(),
            exit: self.exit.clone(),
            io_timeout: self.config.io_timeout(),
        };
        self.server.start(&self.tick, self.config.port, ctx)
    }

    /// Stop accepting and release the port.
    pub fn stop(&mut self) {
        self.server.stop(&self.tick);
    }

    /// Best-effort release for exit paths. Unlike `stop` this never waits
    /// on in-flight connections.
    pub fn force_cleanup(&mut self) {
        self.server.force_cleanup();
    }

    /// Watch for interrupt and terminate signals and convert them into an
    /// exit request, so the keep-alive loop unwinds and the port is
    /// released even on an uncommanded shutdown.
    pub fn install_signal_watcher(&self) {
        let exit = self.exit.clone();
        self.tick.spawn(async move {
            let cause = wait_for_signal().await;
            info!(cause, "signal received, requesting exit");
            exit.request(ExitCause::Signal);
        });
    }
}

impl Drop for Endpoint {
    /// The process-exit hook: whichever way the embedding binary unwinds,
    /// dropping the endpoint aborts its tasks and releases the port.
    fn drop(&mut self) {
        self.force_cleanup();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "interrupt",
                _ = terminate.recv() => "terminate",
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            "interrupt"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "interrupt"
}
