use crate::cmd::CommandError;
use crate::host::Host;
use crate::params::Params;

use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Execute a free-form source fragment in the host's scripting facility.
///
/// The fragment runs with top-level semantics, as if it were the host's
/// own startup script. Everything it writes to standard output is captured
/// and returned as `result`; errors raised by the fragment surface as an
/// error reply carrying the host's message.
///
/// This is the one command with sandbox-like behavior. No other command
/// routes through the scripting facility.
#[derive(Debug)]
pub struct ExecuteCode {
    code: String,
}

impl ExecuteCode {
    pub(crate) fn from_params(params: Params) -> Result<ExecuteCode, CommandError> {
        let code = params.required_str("code")?.to_string();
        Ok(ExecuteCode { code })
    }

    /// Apply the command against `host`. Called on the main thread, which
    /// is the only thread the scripting facility may run on.
    #[instrument(skip(self, host), fields(bytes = self.code.len()))]
    pub(crate) fn apply(self, host: &mut dyn Host) -> Result<Value, CommandError> {
        let output = host.run_code(&self.code)?;

        debug!(captured = output.len());

        Ok(json!({
            "executed": true,
            "result": output,
        }))
    }
}
