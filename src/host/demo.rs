use crate::host::{script, Capture, Host, HostError, MeshStats, ObjectKind, SceneObject};

/// In-process host used by the binaries and the integration suite.
///
/// Carries a small scene graph seeded with the familiar default scene and
/// a script facility just rich enough to drive the endpoint end to end.
/// Stands in for the real application the endpoint would be embedded in.
#[derive(Debug)]
pub struct DemoHost {
    scene_name: String,
    objects: Vec<SceneObject>,
    materials: Vec<String>,
    background: bool,

    /// Native viewport resolution when a UI is present.
    viewport: (u32, u32),
}

impl DemoHost {
    /// A headless demo host with the default scene.
    pub fn new() -> DemoHost {
        DemoHost {
            scene_name: "Scene".into(),
            objects: default_scene(),
            materials: vec!["Material".into()],
            background: true,
            viewport: (1920, 1080),
        }
    }

    /// A demo host that pretends a UI is present, so viewport capture
    /// succeeds.
    pub fn with_ui() -> DemoHost {
        DemoHost {
            background: false,
            ..DemoHost::new()
        }
    }

    /// Add an object to the scene. Useful for seeding test fixtures.
    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }
}

impl Default for DemoHost {
    fn default() -> DemoHost {
        DemoHost::new()
    }
}

impl Host for DemoHost {
    fn scene_name(&self) -> String {
        self.scene_name.clone()
    }

    fn objects(&self) -> Vec<SceneObject> {
        self.objects.clone()
    }

    fn object(&self, name: &str) -> Option<SceneObject> {
        self.objects.iter().find(|o| o.name == name).cloned()
    }

    fn material_count(&self) -> usize {
        self.materials.len()
    }

    fn run_code(&mut self, code: &str) -> Result<String, HostError> {
        script::run(code)
    }

    fn capture_viewport(&mut self, max_size: u32, format: &str) -> Result<Capture, HostError> {
        if self.background {
            return Err(HostError::NoViewport);
        }

        let (width, height) = scale_to_max_edge(self.viewport, max_size);
        let data = encode_stub_image(width, height, format)?;

        Ok(Capture {
            width,
            height,
            format: format.to_string(),
            data,
        })
    }

    fn is_background(&self) -> bool {
        self.background
    }
}

/// The default scene: a cube, a camera and a light.
fn default_scene() -> Vec<SceneObject> {
    vec![
        SceneObject {
            name: "Cube".into(),
            kind: ObjectKind::Mesh,
            location: [0.0, 0.0, 0.0],
            rotation_euler: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
            visible: true,
            materials: vec!["Material".into()],
            mesh: Some(MeshStats {
                vertices: 8,
                edges: 12,
                polygons: 6,
            }),
        },
        SceneObject {
            name: "Camera".into(),
            kind: ObjectKind::Camera,
            location: [7.36, -6.93, 4.96],
            rotation_euler: [1.109, 0.0, 0.815],
            scale: [1.0, 1.0, 1.0],
            visible: true,
            materials: vec![],
            mesh: None,
        },
        SceneObject {
            name: "Light".into(),
            kind: ObjectKind::Light,
            location: [4.08, 1.01, 5.9],
            rotation_euler: [0.65, 0.055, 1.866],
            scale: [1.0, 1.0, 1.0],
            visible: true,
            materials: vec![],
            mesh: None,
        },
    ]
}

/// Scale `native` down so its larger edge is at most `max_size`,
/// preserving aspect. Never scales up.
fn scale_to_max_edge(native: (u32, u32), max_size: u32) -> (u32, u32) {
    let (w, h) = native;
    let edge = w.max(h);
    if max_size == 0 || edge <= max_size {
        return (w, h);
    }
    let factor = max_size as f64 / edge as f64;
    let scaled = |v: u32| ((v as f64 * factor).round() as u32).max(1);
    (scaled(w), scaled(h))
}

/// Produce a deterministic byte blob shaped like an encoded image. The
/// demo host does not rasterize anything; clients only care that bytes
/// round-trip.
fn encode_stub_image(width: u32, height: u32, format: &str) -> Result<Vec<u8>, HostError> {
    let mut data = match format {
        "png" => b"\x89PNG\r\n\x1a\n".to_vec(),
        "jpg" | "jpeg" => vec![0xff, 0xd8, 0xff],
        other => {
            return Err(HostError::Unsupported(format!(
                "unknown image format: {}",
                other
            )))
        }
    };
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scene_has_the_expected_shape() {
        let host = DemoHost::new();
        assert_eq!(host.objects().len(), 3);
        let cube = host.object("Cube").unwrap();
        assert_eq!(cube.kind, ObjectKind::Mesh);
        assert_eq!(cube.mesh.unwrap().vertices, 8);
        assert!(host.object("Sphere").is_none());
    }

    #[test]
    fn headless_capture_is_refused() {
        let mut host = DemoHost::new();
        let err = host.capture_viewport(800, "png").unwrap_err();
        assert!(matches!(err, HostError::NoViewport));
    }

    #[test]
    fn capture_clamps_the_larger_edge() {
        let mut host = DemoHost::with_ui();
        let capture = host.capture_viewport(800, "png").unwrap();
        assert_eq!((capture.width, capture.height), (800, 450));

        let native = host.capture_viewport(4000, "png").unwrap();
        assert_eq!((native.width, native.height), (1920, 1080));
    }
}
