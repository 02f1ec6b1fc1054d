pub mod clients;
pub use clients::Client;

pub mod protocol;
pub use protocol::{Reply, Request};

pub mod connection;
pub use connection::Connection;

pub mod cmd;
pub use cmd::{CommandError, HandlerTable};

pub mod params;

pub mod bridge;
pub use bridge::{BridgeHandle, MainThreadBridge};

pub mod tick;
pub use tick::TickDriver;

pub mod shutdown;
pub use shutdown::{ExitCause, ExitFlag};
use shutdown::Shutdown;

pub mod keepalive;
pub use keepalive::ExitReason;

pub mod server;
pub use server::{ServerInstance, ServerState};

pub mod host;
pub use host::{DemoHost, Host};

pub mod config;
pub use config::Config;

pub mod lifecycle;
pub use lifecycle::Endpoint;

/// Default port that the command endpoint listens on.
///
/// Used if no port is configured.
pub const DEFAULT_PORT: u16 = 6688;

/// Error returned by most functions.
///
/// When writing a real application, one might want to consider a specialized
/// error handling crate or defining an error type as an `enum` of causes.
/// However, for this example, using a boxed `std::error::Error` is sufficient.
///
/// Errors that are part of the wire contract (the taxonomy a client can
/// observe in an error reply) are not boxed: they are the `CommandError`
/// enum in `cmd`, which keeps the variant names stable.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for scenelink operations.
/// This is defined as a convenience.
pub type Result<T> = std::result::Result<T, Error>;
