use crate::cmd::CommandError;
use crate::host::Host;
use crate::params::Params;

use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Summarize the open scene.
///
/// Returns the scene name, total object and material counts, and a short
/// listing of the first objects. The listing is capped so a request
/// against a production-sized scene stays cheap to serialize.
#[derive(Debug)]
pub struct GetSceneInfo;

/// At most this many objects appear in the `objects` listing.
const MAX_LISTED_OBJECTS: usize = 10;

impl GetSceneInfo {
    pub(crate) fn from_params(_params: Params) -> Result<GetSceneInfo, CommandError> {
        Ok(GetSceneInfo)
    }

    /// Apply the command against `host`. Called on the main thread.
    #[instrument(skip(self, host))]
    pub(crate) fn apply(self, host: &mut dyn Host) -> Result<Value, CommandError> {
        let objects = host.objects();

        let listed: Vec<Value> = objects
            .iter()
            .take(MAX_LISTED_OBJECTS)
            .map(|object| {
                json!({
                    "name": object.name,
                    "type": object.kind,
                    "location": object.location,
                    "visible": object.visible,
                })
            })
            .collect();

        debug!(object_count = objects.len());

        Ok(json!({
            "name": host.scene_name(),
            "object_count": objects.len(),
            "objects": listed,
            "materials_count": host.material_count(),
        }))
    }
}
