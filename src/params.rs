use serde_json::{Map, Value};
use std::fmt;

/// Utility for extracting handler parameters.
///
/// Handler parameters arrive as a JSON object. A `Params` wraps that object
/// and provides typed accessors. Each command struct includes a
/// `from_params` method that uses a `Params` to extract its fields.
#[derive(Debug)]
pub(crate) struct Params {
    map: Map<String, Value>,
}

/// Error encountered while extracting a parameter.
///
/// All variants indicate the caller violated a handler's preconditions and
/// are reported as an `invalid_params` reply.
#[derive(Debug)]
pub(crate) enum ParamError {
    /// A required parameter is absent.
    Missing(&'static str),

    /// A parameter is present but has the wrong JSON type.
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
}

impl Params {
    pub(crate) fn new(map: Map<String, Value>) -> Params {
        Params { map }
    }

    /// Return the named parameter as a string. Absence is an error.
    pub(crate) fn required_str(&self, key: &'static str) -> Result<&str, ParamError> {
        match self.map.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ParamError::WrongType {
                key,
                expected: "a string",
            }),
            None => Err(ParamError::Missing(key)),
        }
    }

    /// Return the named parameter as a string, or `None` when absent.
    pub(crate) fn optional_str(&self, key: &'static str) -> Result<Option<&str>, ParamError> {
        match self.map.get(key) {
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(ParamError::WrongType {
                key,
                expected: "a string",
            }),
        }
    }

    /// Return the named parameter as an unsigned integer, or `None` when
    /// absent.
    pub(crate) fn optional_u32(&self, key: &'static str) -> Result<Option<u32>, ParamError> {
        match self.map.get(key) {
            Some(Value::Number(n)) => match n.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => Ok(Some(n)),
                None => Err(ParamError::WrongType {
                    key,
                    expected: "an unsigned integer",
                }),
            },
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(ParamError::WrongType {
                key,
                expected: "an unsigned integer",
            }),
        }
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Missing(key) => write!(f, "missing required parameter `{}`", key),
            ParamError::WrongType { key, expected } => {
                write!(f, "parameter `{}` must be {}", key, expected)
            }
        }
    }
}

impl std::error::Error for ParamError {}
