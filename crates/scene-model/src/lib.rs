//! SceneSync Scene Model
//!
//! Defines the data contracts between the host scene and the exporter:
//! - **Objects:** Named references to scene objects and cameras
//! - **Traversal:** The [`SceneSource`] trait the scheduler queries
//! - **Sampling:** The [`ObjectSampler`] trait that marshals an object at a clock
//! - **Settings:** Animation range, frame step, and motion blur configuration
//! - **Description:** A JSON scene file implementing both traits
//!
//! Object names double as renderer entity ids.

pub mod object;
pub mod scene;
pub mod settings;

pub use object::*;
pub use scene::*;
pub use settings::*;
