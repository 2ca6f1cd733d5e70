//! SceneSync Scene Exporter
//!
//! Connects the frame scheduler to a renderer link. For every clock the
//! scheduler emits, the exporter moves the renderer's time cursor, switches
//! the camera in camera-loop mode, sends a create-or-update for each object
//! the sampler can marshal, and closes the batch with one commit.

pub mod exporter;
pub mod target;

pub use exporter::*;
pub use target::*;
