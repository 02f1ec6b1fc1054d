//! Command endpoint server core.
//!
//! Owns the listening socket and its lifecycle. Accepts clients, hands each
//! accepted connection to the transport, marshals the decoded request over
//! the main-thread bridge into the command table, and writes the reply.

use crate::bridge::BridgeHandle;
use crate::cmd::{CommandError, HandlerTable};
use crate::connection::{Connection, ReadError, ReadOutcome};
use crate::protocol::Reply;
use crate::shutdown::{ExitCause, ExitFlag};
use crate::tick::TickDriver;
use crate::Shutdown;

use serde_json::json;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

/// Maximum number of concurrent connections the endpoint will accept.
///
/// When this limit is reached, the server will stop accepting connections
/// until an active connection terminates. Loopback automation traffic sits
/// nowhere near this, so it is hard coded.
const MAX_CONNECTIONS: usize = 250;

/// Listen backlog for the bound socket.
const LISTEN_BACKLOG: u32 = 128;

/// How long `stop` waits for in-flight connections to finish before the
/// listener state is torn down anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Ports currently bound by an endpoint in this process.
///
/// A second `start` on a live port, whether from re-running a startup
/// script or re-importing the embedding glue, must find the existing
/// instance and succeed without rebinding.
static BOUND_PORTS: Mutex<BTreeSet<u16>> = Mutex::new(BTreeSet::new());

/// Lifecycle states of a [`ServerInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// What the accept loop threads through to every connection task.
#[derive(Clone)]
pub(crate) struct ServeContext {
    pub(crate) table: Arc<HandlerTable>,
    pub(crate) bridge: BridgeHandle,
    pub(crate) exit: ExitFlag,
    pub(crate) io_timeout: Duration,
}

/// The per-process server singleton: the listening socket plus the task
/// and channel handles needed to tear it down again.
///
/// At most one instance is `Running` per process. All external control
/// flows through `start`, `stop` and `force_cleanup`.
pub struct ServerInstance {
    state: ServerState,

    /// Address actually bound, once running. Port 0 requests resolve to a
    /// concrete ephemeral port here.
    local_addr: Option<SocketAddr>,

    /// Broadcasts a shutdown signal to the accept loop and all active
    /// connections. Dropping the sender is the signal.
    notify_shutdown: Option<broadcast::Sender<()>>,

    /// Used as part of graceful shutdown to wait for client connections to
    /// complete processing. Every connection task holds a clone of the
    /// sender; once they all drop, the receiver completes with `None`.
    shutdown_complete_tx: Option<mpsc::Sender<()>>,
    shutdown_complete_rx: Option<mpsc::Receiver<()>>,

    accept_task: Option<JoinHandle<()>>,
}

/// Accept-loop state. Created by `start` and moved onto the event loop.
struct Listener {
    listener: TcpListener,

    ctx: ServeContext,

    /// A semaphore bounds concurrent connections. Before accepting, a
    /// permit is acquired; the connection task returns it on completion.
    limit_connections: Arc<Semaphore>,

    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

/// Per-connection handler. Reads the one request from `connection`,
/// dispatches it, and writes the one reply.
struct Handler {
    /// The TCP connection decorated with the JSON document transport.
    connection: Connection,

    table: Arc<HandlerTable>,
    bridge: BridgeHandle,
    exit: ExitFlag,
    io_timeout: Duration,

    /// Listen for shutdown notifications so a stopping server does not
    /// strand this task waiting on a silent peer.
    shutdown: Shutdown,

    /// Not used directly. When the `Handler` drops, the listener's
    /// shutdown-complete channel observes it.
    _shutdown_complete: mpsc::Sender<()>,
}

impl ServerInstance {
    pub(crate) fn new() -> ServerInstance {
        ServerInstance {
            state: ServerState::Stopped,
            local_addr: None,
            notify_shutdown: None,
            shutdown_complete_tx: None,
            shutdown_complete_rx: None,
            accept_task: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listening socket and spawn the accept loop.
    ///
    /// A no-op success when the instance is already live, or when another
    /// instance in this process already holds the requested port. A bind
    /// failure returns the instance to `Stopped` and surfaces the OS
    /// error.
    pub(crate) fn start(
        &mut self,
        tick: &TickDriver,
        port: u16,
        ctx: ServeContext,
    ) -> crate::Result<()> {
        if self.state != ServerState::Stopped {
            debug!(state = ?self.state, "start requested while not stopped; nothing to do");
            return Ok(());
        }
        if port != 0 && BOUND_PORTS.lock().unwrap().contains(&port) {
            info!(port, "endpoint already listening in this process; reusing it");
            return Ok(());
        }

        self.state = ServerState::Starting;

        let bound: crate::Result<(TcpListener, SocketAddr)> = tick.block_on(async {
            let listener = bind(port)?;
            let addr = listener.local_addr()?;
            Ok((listener, addr))
        });
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(err) => {
                self.state = ServerState::Stopped;
                error!(port, cause = %err, "failed to bind listening socket");
                return Err(err);
            }
        };

        BOUND_PORTS.lock().unwrap().insert(addr.port());
        self.local_addr = Some(addr);

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        let mut server = Listener {
            listener,
            ctx,
            limit_connections: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            notify_shutdown: notify_shutdown.clone(),
            shutdown_complete_tx: shutdown_complete_tx.clone(),
        };
        let shutdown = Shutdown::new(notify_shutdown.subscribe());

        let accept_task = tick.spawn(async move {
            if let Err(err) = server.run(shutdown).await {
                error!(cause = %err, "failed to accept");
            }
        });

        self.notify_shutdown = Some(notify_shutdown);
        self.shutdown_complete_tx = Some(shutdown_complete_tx);
        self.shutdown_complete_rx = Some(shutdown_complete_rx);
        self.accept_task = Some(accept_task);
        self.state = ServerState::Running;

        info!(%addr, "command endpoint listening");
        Ok(())
    }

    /// Stop accepting, close the listening socket and wait briefly for
    /// in-flight connections to finish. A no-op unless running.
    pub(crate) fn stop(&mut self, tick: &TickDriver) {
        if self.state != ServerState::Running {
            debug!(state = ?self.state, "stop requested while not running; nothing to do");
            return;
        }
        self.state = ServerState::Stopping;
        info!("stopping command endpoint");

        // Dropping the broadcast sender wakes every subscriber: the accept
        // loop returns (closing the listening socket with it) and idle
        // connection tasks give up on their peers.
        drop(self.notify_shutdown.take());
        drop(self.shutdown_complete_tx.take());

        if let Some(mut done) = self.shutdown_complete_rx.take() {
            let drained =
                tick.block_on(async { time::timeout(SHUTDOWN_GRACE, done.recv()).await.is_ok() });
            if !drained {
                warn!(grace = ?SHUTDOWN_GRACE, "grace period expired with connections in flight");
            }
        }
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }

        self.release_port();
        self.state = ServerState::Stopped;
    }

    /// Unconditional best-effort release of the socket and task handles.
    ///
    /// Safe to call from exit paths: it never enters the event loop, so
    /// the in-flight grace period is skipped.
    pub(crate) fn force_cleanup(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        drop(self.notify_shutdown.take());
        drop(self.shutdown_complete_tx.take());
        drop(self.shutdown_complete_rx.take());
        self.release_port();
        self.state = ServerState::Stopped;
    }

    fn release_port(&mut self) {
        if let Some(addr) = self.local_addr.take() {
            BOUND_PORTS.lock().unwrap().remove(&addr.port());
        }
    }
}

/// Create the listening socket with the endpoint's socket options applied.
///
/// Loopback only. On Unix, address reuse is enabled so a fresh instance
/// can rebind immediately after a previous one released the port. Windows
/// keeps its exclusive-bind default, where address reuse would instead
/// permit port hijacking.
fn bind(port: u16) -> crate::Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let socket = TcpSocket::new_v4()?;
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

impl Listener {
    /// Run the accept loop.
    ///
    /// Listens for inbound connections and spawns a task per connection.
    /// Returns `Err` only if accepting fails repeatedly; errors inside a
    /// connection task never propagate here.
    async fn run(&mut self, mut shutdown: Shutdown) -> crate::Result<()> {
        info!("accepting inbound connections");

        loop {
            // Wait for a permit to become available. The semaphore is
            // never closed, so `acquire_owned` cannot fail.
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            let socket = tokio::select! {
                res = self.accept() => res?,
                _ = shutdown.recv() => {
                    debug!("listener shutting down");
                    return Ok(());
                }
            };

            let mut handler = Handler {
                connection: Connection::new(socket),
                table: self.ctx.table.clone(),
                bridge: self.ctx.bridge.clone(),
                exit: self.ctx.exit.clone(),
                io_timeout: self.ctx.io_timeout,
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(async move {
                if let Err(err) = handler.run().await {
                    error!(cause = ?err, "connection error");
                }
                drop(permit);
            });
        }
    }

    /// Accept an inbound connection.
    ///
    /// Errors are handled by backing off and retrying, doubling the wait
    /// after each failure. Gives up once the backoff passes 64 seconds.
    async fn accept(&mut self) -> crate::Result<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(err.into());
                    }
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;

            backoff *= 2;
        }
    }
}

impl Handler {
    /// Process a single connection: one request in, one reply out.
    ///
    /// The shutdown command is recognized here, before dispatch, so its
    /// reply is flushed in full before the exit request is raised. No
    /// other place in the crate may raise it on behalf of a client.
    #[instrument(skip(self))]
    async fn run(&mut self) -> crate::Result<()> {
        let outcome = tokio::select! {
            res = time::timeout(self.io_timeout, self.connection.read_request()) => res,
            _ = self.shutdown.recv() => return Ok(()),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                debug!("timed out reading request");
                return Ok(());
            }
        };

        let request = match outcome {
            Ok(ReadOutcome::Request(request)) => request,
            Ok(ReadOutcome::Closed) => return Ok(()),
            Err(ReadError::Transport(err)) => {
                debug!(cause = %err, "transport failed before a reply could be sent");
                return Ok(());
            }
            Err(ReadError::Invalid(err)) => {
                let reply = Reply::error(CommandError::InvalidRequest(err.to_string()));
                return self.send(&reply).await;
            }
        };

        if let Some(message) = &request.message {
            info!(client_message = %message);
        }

        if request.is_shutdown() {
            let reply = Reply::success(json!({ "shutdown": "initiated" }));
            self.send(&reply).await?;
            // The reply is on the wire; now the process may come down.
            self.exit.request(ExitCause::Shutdown);
            return Ok(());
        }

        let (command, params) = match request.route() {
            Ok(route) => route,
            Err(err) => return self.send(&Reply::error(err)).await,
        };

        debug!(%command, "dispatching");

        let reply = match self.table.resolve(&command) {
            None => Reply::error(CommandError::UnknownCommand(command)),
            Some(run) => match self
                .bridge
                .execute_on_main(move |host| (&*run)(host, params))
                .await
            {
                Ok(result) => Reply::success(result),
                Err(err) => Reply::error(err),
            },
        };

        self.send(&reply).await
    }

    /// Write the reply, bounded by the I/O timeout. Write failures mean
    /// the peer is gone; they are logged and the connection is dropped.
    async fn send(&mut self, reply: &Reply) -> crate::Result<()> {
        match time::timeout(self.io_timeout, self.connection.write_reply(reply)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                debug!(cause = %err, "failed to write reply");
                Ok(())
            }
            Err(_elapsed) => {
                debug!("timed out writing reply");
                Ok(())
            }
        }
    }
}
