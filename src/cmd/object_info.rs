use crate::cmd::CommandError;
use crate::host::Host;
use crate::params::Params;

use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Look up one object by name and report its full transform, visibility
/// and material assignments. Mesh-typed objects additionally report their
/// vertex, edge and polygon counts.
#[derive(Debug)]
pub struct GetObjectInfo {
    name: String,
}

impl GetObjectInfo {
    /// Extract the target object name. A missing `name` violates the
    /// command's preconditions.
    pub(crate) fn from_params(params: Params) -> Result<GetObjectInfo, CommandError> {
        let name = params.required_str("name")?.to_string();
        Ok(GetObjectInfo { name })
    }

    /// Apply the command against `host`. Called on the main thread.
    #[instrument(skip(self, host), fields(name = %self.name))]
    pub(crate) fn apply(self, host: &mut dyn Host) -> Result<Value, CommandError> {
        let object = host
            .object(&self.name)
            .ok_or_else(|| CommandError::NotFound(format!("object not found: {}", self.name)))?;

        let mut info = json!({
            "name": object.name,
            "type": object.kind,
            "location": object.location,
            "rotation_euler": object.rotation_euler,
            "scale": object.scale,
            "visible": object.visible,
            "materials": object.materials,
        });
        if let Some(mesh) = object.mesh {
            info["mesh"] = json!({
                "vertices": mesh.vertices,
                "edges": mesh.edges,
                "polygons": mesh.polygons,
            });
        }

        debug!(kind = ?object.kind);

        Ok(info)
    }
}
