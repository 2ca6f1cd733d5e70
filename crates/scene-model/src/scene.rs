//! JSON scene description.
//!
//! A scene file (`scene.json`) is a self-contained stand-in for a host
//! application: it lists objects with their sub-frame divisions and keyed
//! translations, cameras with their loop flag, and the export settings. It
//! implements [`SceneSource`] and [`ObjectSampler`] so the exporter can run
//! without a live host.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use scenesync_common::clock::FrameClock;

use crate::object::{CameraRef, EntityPayload, ObjectRef, ObjectSampler, SceneSource};
use crate::settings::ExportSettings;

/// Top-level scene file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Schema version.
    pub version: String,

    /// Human-readable scene name.
    pub name: String,

    /// Scene time cursor when export starts.
    #[serde(default = "default_current_frame")]
    pub current_frame: f64,

    /// Camera used outside camera-loop mode.
    #[serde(default)]
    pub active_camera: Option<String>,

    /// Export settings. A file without them takes the caller's defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportSettings>,

    /// Scene objects in traversal order.
    #[serde(default)]
    pub objects: Vec<SceneObject>,

    /// Scene cameras.
    #[serde(default)]
    pub cameras: Vec<SceneCamera>,
}

/// An object entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,

    /// Renderer entity type.
    #[serde(default = "default_object_plugin")]
    pub plugin: String,

    /// Sub-frame division; `0` follows the global schedule.
    #[serde(default)]
    pub subframes: u32,

    #[serde(default = "default_true")]
    pub renderable: bool,

    /// Keyed translations, sorted by frame on load.
    #[serde(default)]
    pub keyframes: Vec<TransformKey>,

    /// Static attributes copied into every payload.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A camera entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneCamera {
    pub name: String,

    /// Included in camera-loop rendering.
    #[serde(default, rename = "loop")]
    pub looped: bool,

    #[serde(default)]
    pub keyframes: Vec<TransformKey>,
}

/// A keyed translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformKey {
    pub frame: f64,
    pub translation: [f64; 3],
}

fn default_current_frame() -> f64 {
    1.0
}

fn default_object_plugin() -> String {
    "Node".to_string()
}

fn default_true() -> bool {
    true
}

impl SceneDescription {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            current_frame: default_current_frame(),
            active_camera: None,
            export: None,
            objects: vec![],
            cameras: vec![],
        }
    }

    /// Load a scene file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| SceneError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let mut scene: SceneDescription =
            serde_json::from_str(&json).map_err(|e| SceneError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        scene.sort_keyframes();

        let problems = scene.validate();
        if !problems.is_empty() {
            return Err(SceneError::ValidationError {
                message: problems.join("; "),
            });
        }

        tracing::debug!(
            path = %path.display(),
            objects = scene.objects.len(),
            cameras = scene.cameras.len(),
            "Loaded scene"
        );
        Ok(scene)
    }

    /// Write the scene as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SceneError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SceneError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| SceneError::IoError { path, source: e })
    }

    /// The scene's export settings, or [`ExportSettings::default`] if it has none.
    pub fn export_settings(&self) -> ExportSettings {
        self.export.clone().unwrap_or_default()
    }

    /// Report structural problems: duplicate names and unknown active camera.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];
        let mut seen = HashSet::new();

        for name in self
            .objects
            .iter()
            .map(|o| o.name.as_str())
            .chain(self.cameras.iter().map(|c| c.name.as_str()))
        {
            if name.is_empty() {
                errors.push("Entity with empty name".to_string());
            } else if !seen.insert(name) {
                errors.push(format!("Duplicate entity name: {name}"));
            }
        }

        if let Some(active) = &self.active_camera {
            if !self.cameras.iter().any(|c| &c.name == active) {
                errors.push(format!("Active camera not found: {active}"));
            }
        }

        errors
    }

    fn sort_keyframes(&mut self) {
        let by_frame = |a: &TransformKey, b: &TransformKey| a.frame.total_cmp(&b.frame);
        for object in &mut self.objects {
            object.keyframes.sort_by(by_frame);
        }
        for camera in &mut self.cameras {
            camera.keyframes.sort_by(by_frame);
        }
    }

    fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    fn camera(&self, name: &str) -> Option<&SceneCamera> {
        self.cameras.iter().find(|c| c.name == name)
    }
}

/// Linear interpolation over sorted keys, clamped at both ends.
pub fn interpolate_translation(keys: &[TransformKey], time: f64) -> Option<[f64; 3]> {
    let first = keys.first()?;
    let last = keys.last()?;
    if time <= first.frame {
        return Some(first.translation);
    }
    if time >= last.frame {
        return Some(last.translation);
    }

    let upper = keys.iter().position(|k| k.frame > time)?;
    let a = keys[upper - 1];
    let b = keys[upper];
    let span = b.frame - a.frame;
    if span <= f64::EPSILON {
        return Some(b.translation);
    }
    let t = (time - a.frame) / span;
    let mut out = [0.0; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = a.translation[i] + (b.translation[i] - a.translation[i]) * t;
    }
    Some(out)
}

impl SceneSource for SceneDescription {
    fn objects(&self) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .map(|o| ObjectRef::new(o.name.clone()))
            .collect()
    }

    fn subframe_division(&self, object: &ObjectRef) -> u32 {
        self.object(object.name()).map(|o| o.subframes).unwrap_or(0)
    }

    fn is_renderable(&self, object: &ObjectRef) -> bool {
        self.object(object.name())
            .map(|o| o.renderable)
            .unwrap_or(false)
    }

    fn loop_cameras(&self) -> Vec<CameraRef> {
        self.cameras
            .iter()
            .filter(|c| c.looped)
            .map(|c| CameraRef::new(c.name.clone()))
            .collect()
    }

    fn current_time(&self) -> f64 {
        self.current_frame
    }

    fn active_camera(&self) -> Option<CameraRef> {
        self.active_camera.clone().map(CameraRef::new)
    }
}

impl ObjectSampler for SceneDescription {
    fn sample(&self, object: &ObjectRef, clock: FrameClock) -> Option<EntityPayload> {
        let time = clock.to_float();

        if let Some(obj) = self.object(object.name()) {
            if !obj.renderable {
                return None;
            }
            let mut payload = EntityPayload::new(obj.plugin.clone());
            payload.attributes = obj.attributes.clone();
            if let Some(t) = interpolate_translation(&obj.keyframes, time) {
                payload = payload.with_attribute("translation", serde_json::json!(t));
            }
            return Some(payload);
        }

        let camera = self.camera(object.name())?;
        let mut payload = EntityPayload::new("CameraPhysical");
        if let Some(t) = interpolate_translation(&camera.keyframes, time) {
            payload = payload.with_attribute("translation", serde_json::json!(t));
        }
        Some(payload)
    }
}

/// Errors that can occur when reading or writing scene files.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid scene: {message}")]
    ValidationError { message: String },
}
