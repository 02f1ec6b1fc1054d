use crate::cmd::CommandError;
use crate::host::Host;
use crate::params::Params;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Capture the active viewport to an encoded image.
///
/// `max_size` bounds the larger edge of the capture; the host scales the
/// render down preserving aspect. With a `filepath` the image is written
/// to disk and the path echoed back; without one the encoded bytes are
/// returned inline, base64 encoded. Headless hosts have no viewport and
/// the command fails accordingly.
#[derive(Debug)]
pub struct GetViewportScreenshot {
    max_size: u32,
    filepath: Option<String>,
    format: String,
}

const DEFAULT_MAX_SIZE: u32 = 800;
const DEFAULT_FORMAT: &str = "png";

impl GetViewportScreenshot {
    pub(crate) fn from_params(params: Params) -> Result<GetViewportScreenshot, CommandError> {
        let max_size = params.optional_u32("max_size")?.unwrap_or(DEFAULT_MAX_SIZE);
        let filepath = params.optional_str("filepath")?.map(str::to_string);
        let format = params
            .optional_str("format")?
            .unwrap_or(DEFAULT_FORMAT)
            .to_string();
        Ok(GetViewportScreenshot {
            max_size,
            filepath,
            format,
        })
    }

    /// Apply the command against `host`. Called on the main thread.
    #[instrument(skip(self, host), fields(max_size = self.max_size))]
    pub(crate) fn apply(self, host: &mut dyn Host) -> Result<Value, CommandError> {
        let capture = host.capture_viewport(self.max_size, &self.format)?;

        debug!(
            width = capture.width,
            height = capture.height,
            bytes = capture.data.len(),
        );

        let mut info = json!({
            "width": capture.width,
            "height": capture.height,
            "format": capture.format,
        });

        match self.filepath {
            Some(path) => {
                std::fs::write(&path, &capture.data).map_err(|err| {
                    CommandError::HostApi(format!("failed to write {}: {}", path, err))
                })?;
                info["filepath"] = json!(path);
            }
            None => {
                info["data"] = json!(BASE64.encode(&capture.data));
            }
        }

        Ok(info)
    }
}
