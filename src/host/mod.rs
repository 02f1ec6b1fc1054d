//! The seam between the command endpoint and the application it lives in.
//!
//! The embedding application ("the host") owns a scene graph and a
//! scripting facility, both of which are legal to touch only on the main
//! thread. Commands reach the host exclusively through this trait, and the
//! bridge guarantees every call lands on the main thread.

mod script;

mod demo;
pub use demo::DemoHost;

use serde::Serialize;
use std::fmt;

/// Scene-graph object categories the endpoint reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Mesh,
    Camera,
    Light,
    Empty,
}

/// Vertex, edge and polygon counts of a mesh object.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MeshStats {
    pub vertices: usize,
    pub edges: usize,
    pub polygons: usize,
}

/// Snapshot of one scene object.
#[derive(Debug, Clone, Serialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    pub location: [f64; 3],
    pub rotation_euler: [f64; 3],
    pub scale: [f64; 3],
    pub visible: bool,
    pub materials: Vec<String>,

    /// Present only for mesh-typed objects.
    pub mesh: Option<MeshStats>,
}

/// One viewport capture, already encoded in the requested image format.
#[derive(Debug, Clone)]
pub struct Capture {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub data: Vec<u8>,
}

/// Error raised by the host API. Messages are forwarded to clients
/// verbatim.
#[derive(Debug)]
pub enum HostError {
    /// The scripting facility rejected or aborted the fragment.
    Script(String),

    /// There is no viewport to capture, the host is in background mode.
    NoViewport,

    /// The host cannot satisfy the request (unknown image format and the
    /// like).
    Unsupported(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Script(msg) => msg.fmt(f),
            HostError::NoViewport => "no viewport is available".fmt(f),
            HostError::Unsupported(msg) => msg.fmt(f),
        }
    }
}

impl std::error::Error for HostError {}

/// The host application's main-thread API.
///
/// Implementations are not required to be `Send`: a host lives on the main
/// thread and never crosses it. All methods are invoked via the bridge.
pub trait Host {
    /// Name of the open scene.
    fn scene_name(&self) -> String;

    /// Snapshot of every object in the scene, in scene order.
    fn objects(&self) -> Vec<SceneObject>;

    /// Look up one object by exact name.
    fn object(&self, name: &str) -> Option<SceneObject>;

    /// Number of materials in the open document.
    fn material_count(&self) -> usize;

    /// Execute a source fragment with top-level semantics and return what
    /// it wrote to standard output.
    fn run_code(&mut self, code: &str) -> Result<String, HostError>;

    /// Render the active viewport, largest edge clamped to `max_size`,
    /// encoded as `format`.
    fn capture_viewport(&mut self, max_size: u32, format: &str) -> Result<Capture, HostError>;

    /// Whether the host runs without a UI.
    fn is_background(&self) -> bool;
}
