mod scene_info;
pub use scene_info::GetSceneInfo;

mod object_info;
pub use object_info::GetObjectInfo;

mod execute_code;
pub use execute_code::ExecuteCode;

mod screenshot;
pub use screenshot::GetViewportScreenshot;

use crate::host::{Host, HostError};
use crate::params::{ParamError, Params};

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A registered command implementation.
///
/// Command functions always run on the host's main thread, via the bridge.
/// They receive the decoded `params` object and must return a
/// JSON-serialisable value or a `CommandError`.
pub type CommandFn =
    Arc<dyn Fn(&mut dyn Host, Map<String, Value>) -> Result<Value, CommandError> + Send + Sync>;

/// Error a command produces instead of a result.
///
/// The variant names are the stable error taxonomy clients can rely on;
/// the rendered phrasing is not contractual.
#[derive(Debug)]
pub enum CommandError {
    /// The request document itself is unusable: malformed JSON, a
    /// non-object top level, or an oversized buffer.
    InvalidRequest(String),

    /// The `type` string is not in the handler table.
    UnknownCommand(String),

    /// A handler's preconditions on `params` are violated.
    InvalidParams(String),

    /// The referenced host entity does not exist.
    NotFound(String),

    /// The underlying host API raised; its message is forwarded verbatim.
    HostApi(String),

    /// The handler needs UI state that is absent in background mode.
    UnsupportedInBackground(String),

    /// The main thread did not produce a result within the bridge wait.
    MainThreadTimeout,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            CommandError::UnknownCommand(name) => {
                write!(f, "unknown command type: {}", name)
            }
            CommandError::InvalidParams(msg) => write!(f, "invalid params: {}", msg),
            CommandError::NotFound(msg) => msg.fmt(f),
            CommandError::HostApi(msg) => msg.fmt(f),
            CommandError::UnsupportedInBackground(msg) => msg.fmt(f),
            CommandError::MainThreadTimeout => {
                "main thread unresponsive: timed out waiting for result".fmt(f)
            }
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ParamError> for CommandError {
    fn from(err: ParamError) -> CommandError {
        CommandError::InvalidParams(err.to_string())
    }
}

impl From<HostError> for CommandError {
    fn from(err: HostError) -> CommandError {
        match err {
            HostError::NoViewport => CommandError::UnsupportedInBackground(
                "viewport capture is not available in background mode".into(),
            ),
            HostError::Script(msg) | HostError::Unsupported(msg) => CommandError::HostApi(msg),
        }
    }
}

/// Maps command type strings to their implementations.
///
/// Built at startup, extended by provider registration while the server is
/// still stopped, and read-only once it is running. Built-in names always
/// win conflicts.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, CommandFn>,
}

impl HandlerTable {
    /// An empty table. Mostly useful in tests.
    pub fn new() -> HandlerTable {
        HandlerTable::default()
    }

    /// The built-in command set.
    pub fn builtin() -> HandlerTable {
        let mut table = HandlerTable::new();
        table.register(
            "get_scene_info",
            Arc::new(|host: &mut dyn Host, params: Map<String, Value>| {
                GetSceneInfo::from_params(Params::new(params))?.apply(host)
            }),
        );
        table.register(
            "get_object_info",
            Arc::new(|host: &mut dyn Host, params: Map<String, Value>| {
                GetObjectInfo::from_params(Params::new(params))?.apply(host)
            }),
        );
        table.register(
            "execute_code",
            Arc::new(|host: &mut dyn Host, params: Map<String, Value>| {
                ExecuteCode::from_params(Params::new(params))?.apply(host)
            }),
        );
        table.register(
            "get_viewport_screenshot",
            Arc::new(|host: &mut dyn Host, params: Map<String, Value>| {
                GetViewportScreenshot::from_params(Params::new(params))?.apply(host)
            }),
        );
        table
    }

    /// Register a command under `name`.
    ///
    /// Returns `false` and leaves the table unchanged when the name is
    /// already taken: earlier registrations win, and the built-ins are
    /// registered first.
    pub fn register(&mut self, name: impl Into<String>, run: CommandFn) -> bool {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            warn!(%name, "ignoring conflicting command registration");
            return false;
        }
        self.handlers.insert(name, run);
        true
    }

    /// Merge a provider's table into this one, earlier names winning.
    pub fn merge(&mut self, other: HandlerTable) {
        for (name, run) in other.handlers {
            self.register(name, run);
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<CommandFn> {
        self.handlers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_win_registration_conflicts() {
        let mut table = HandlerTable::builtin();
        let replaced = table.register(
            "get_scene_info",
            Arc::new(|_: &mut dyn Host, _: Map<String, Value>| Ok(json!("impostor"))),
        );
        assert!(!replaced);

        let mut host = crate::host::DemoHost::new();
        let run = table.resolve("get_scene_info").unwrap();
        let value = (&*run)(&mut host, Map::new()).unwrap();
        assert_ne!(value, json!("impostor"));
    }

    #[test]
    fn provider_tables_extend_the_builtins() {
        let mut providers = HandlerTable::new();
        providers.register(
            "texture_search",
            Arc::new(|_: &mut dyn Host, _: Map<String, Value>| Ok(json!({ "hits": 0 }))),
        );

        let mut table = HandlerTable::builtin();
        table.merge(providers);
        assert!(table.resolve("texture_search").is_some());
        assert!(table.resolve("execute_code").is_some());
    }
}
