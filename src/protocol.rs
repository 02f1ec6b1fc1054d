//! Provides the types representing one decoded client request and one
//! outbound reply, as well as utilities for decoding a request from a byte
//! array.
//!
//! The wire format is a single UTF-8 JSON object per direction. A request
//! carries a `type` string naming the command and an optional `params`
//! object. Two legacy top-level keys are preserved: `code` (treated as an
//! `execute_code` request when no `type` is present) and `message` (echoed
//! into the server log).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Command type strings that request a graceful server shutdown.
const SHUTDOWN_COMMANDS: &[&str] = &["server_shutdown", "shutdown"];

/// Legacy sentinels accepted anywhere inside a top-level `code` payload,
/// with or without a call-style `()` around them.
const LEGACY_QUIT_SENTINELS: &[&str] = &["quit_blender", "server_shutdown", "shutdown"];

/// One decoded client message.
///
/// `command` is the `type` key of the JSON object. The legacy keys are kept
/// as-is so the routing layer can apply the compatibility rules without
/// re-inspecting raw JSON.
#[derive(Debug, Clone)]
pub struct Request {
    /// The `type` key. `None` for legacy payloads that only carry `code`
    /// or `message`.
    pub command: Option<String>,

    /// The `params` object. Defaults to empty when absent.
    pub params: Map<String, Value>,

    /// Legacy top-level `code` payload.
    pub code: Option<String>,

    /// Legacy top-level `message` payload.
    pub message: Option<String>,
}

/// Error encountered while decoding a request.
#[derive(Debug)]
pub enum Error {
    /// Not enough data has been received to form a complete JSON document.
    Incomplete,

    /// The accumulated buffer exceeded the transport cap.
    Oversized,

    /// The document decoded but its top level is not a JSON object.
    NotAnObject,

    /// The document decoded but a reserved key has the wrong shape.
    Invalid(String),

    /// The bytes do not decode as JSON at all.
    Json(serde_json::Error),
}

impl Request {
    /// Tries to decode one request from `src`.
    ///
    /// Returns `Err(Error::Incomplete)` when the buffer holds a valid JSON
    /// prefix that has not been fully received yet, which the transport
    /// treats as "read more". Any other error is terminal for the
    /// connection and is reported back to the peer.
    pub fn decode(src: &[u8]) -> Result<Request, Error> {
        let value: Value = match serde_json::from_slice(src) {
            Ok(value) => value,
            Err(err) if err.is_eof() => return Err(Error::Incomplete),
            Err(err) => return Err(Error::Json(err)),
        };

        let mut top = match value {
            Value::Object(map) => map,
            _ => return Err(Error::NotAnObject),
        };

        let command = match top.remove("type") {
            Some(Value::String(name)) => Some(name),
            Some(other) => {
                return Err(Error::Invalid(format!(
                    "`type` must be a string, got {}",
                    type_name(&other)
                )))
            }
            None => None,
        };

        let params = match top.remove("params") {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(Error::Invalid(format!(
                    "`params` must be an object, got {}",
                    type_name(&other)
                )))
            }
        };

        let code = top.remove("code").and_then(into_string);
        let message = top.remove("message").and_then(into_string);

        Ok(Request {
            command,
            params,
            code,
            message,
        })
    }

    /// Whether this request asks the server to shut down.
    ///
    /// Covers the `server_shutdown` command type, its `shutdown` alias and
    /// the legacy quit sentinels carried inside a top-level `code` payload.
    /// The per-connection driver is the only place that acts on this.
    pub fn is_shutdown(&self) -> bool {
        if let Some(command) = &self.command {
            if SHUTDOWN_COMMANDS.contains(&command.as_str()) {
                return true;
            }
        }
        if let Some(code) = &self.code {
            return LEGACY_QUIT_SENTINELS
                .iter()
                .any(|sentinel| code.contains(sentinel));
        }
        false
    }

    /// Resolve the command name and parameters to dispatch.
    ///
    /// Applies the legacy rule: a top-level `code` with no `type` is an
    /// `execute_code` request. A request with neither is malformed.
    pub fn route(mut self) -> Result<(String, Map<String, Value>), crate::cmd::CommandError> {
        use crate::cmd::CommandError;

        match self.command.take() {
            Some(command) if command.is_empty() => {
                Err(CommandError::InvalidRequest("empty command type".into()))
            }
            Some(command) => Ok((command, self.params)),
            None => match self.code.take() {
                Some(code) => {
                    let mut params = self.params;
                    params.insert("code".into(), Value::String(code));
                    Ok(("execute_code".into(), params))
                }
                None => Err(CommandError::InvalidRequest(
                    "missing command type".into(),
                )),
            },
        }
    }
}

/// One outbound message. Exactly one is written per accepted connection
/// that produced a decodable request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Success { result: Value },
    Error { message: String },
}

impl Reply {
    pub fn success(result: Value) -> Reply {
        Reply::Success { result }
    }

    pub fn error(message: impl fmt::Display) -> Reply {
        Reply::Error {
            message: message.to_string(),
        }
    }

    /// Convert into the inner result, turning an error reply into a
    /// `crate::Error` carrying the server message. Used by the client.
    pub fn into_result(self) -> crate::Result<Value> {
        match self {
            Reply::Success { result } => Ok(result),
            Reply::Error { message } => Err(message.into()),
        }
    }
}

fn into_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete => "stream ended early".fmt(f),
            Error::Oversized => "request exceeds the maximum size".fmt(f),
            Error::NotAnObject => "request must be a JSON object".fmt(f),
            Error::Invalid(msg) => msg.fmt(f),
            Error::Json(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_command_with_params() {
        let request =
            Request::decode(br#"{"type":"get_object_info","params":{"name":"Cube"}}"#).unwrap();
        assert_eq!(request.command.as_deref(), Some("get_object_info"));
        assert_eq!(request.params["name"], "Cube");
    }

    #[test]
    fn decode_partial_document_is_incomplete() {
        let err = Request::decode(br#"{"type":"get_scene_info""#).unwrap_err();
        assert!(matches!(err, Error::Incomplete));
    }

    #[test]
    fn decode_non_object_is_rejected() {
        let err = Request::decode(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, Error::NotAnObject));
    }

    #[test]
    fn legacy_code_routes_to_execute_code() {
        let request = Request::decode(br#"{"code":"print(1)"}"#).unwrap();
        let (command, params) = request.route().unwrap();
        assert_eq!(command, "execute_code");
        assert_eq!(params["code"], "print(1)");
    }

    #[test]
    fn shutdown_detection_covers_aliases_and_sentinels() {
        for payload in [
            br#"{"type":"server_shutdown"}"#.as_slice(),
            br#"{"type":"shutdown"}"#.as_slice(),
            br#"{"code":"quit_blender()"}"#.as_slice(),
            br#"{"code":"server_shutdown()"}"#.as_slice(),
            br#"{"code":"shutdown()"}"#.as_slice(),
            br#"{"code":"shutdown"}"#.as_slice(),
        ] {
            assert!(Request::decode(payload).unwrap().is_shutdown());
        }
        let normal = Request::decode(br#"{"type":"get_scene_info"}"#).unwrap();
        assert!(!normal.is_shutdown());
        let plain_code = Request::decode(br#"{"code":"print('A')"}"#).unwrap();
        assert!(!plain_code.is_shutdown());
    }
}
