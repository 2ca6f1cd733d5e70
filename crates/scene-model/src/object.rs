//! Object and camera references plus the traversal and sampling contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

use scenesync_common::clock::FrameClock;

/// Reference to a scene object. The name is also the renderer entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(pub String);

/// Reference to a scene camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraRef(pub String);

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl CameraRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CameraRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view of the host scene consumed by the scheduler.
pub trait SceneSource {
    /// All objects in the scene, in traversal order.
    fn objects(&self) -> Vec<ObjectRef>;

    /// Sub-frame division of an object. `0` means it follows the global schedule.
    fn subframe_division(&self, object: &ObjectRef) -> u32;

    /// Whether the object produces renderer entities at all.
    fn is_renderable(&self, object: &ObjectRef) -> bool;

    /// Cameras flagged for camera-loop rendering, in loop order.
    fn loop_cameras(&self) -> Vec<CameraRef>;

    /// Scene time cursor before export started.
    fn current_time(&self) -> f64 {
        0.0
    }

    /// Camera used when not in camera-loop mode.
    fn active_camera(&self) -> Option<CameraRef> {
        None
    }
}

/// One create-or-update payload for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    /// Renderer-side entity type (e.g. "Node", "GeomStaticMesh").
    pub plugin: String,

    /// Attribute values keyed by attribute name.
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntityPayload {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Marshals an object's state at a given scene time.
pub trait ObjectSampler {
    /// Payload for `object` at `clock`, or `None` when the object has nothing to send.
    fn sample(&self, object: &ObjectRef, clock: FrameClock) -> Option<EntityPayload>;
}
