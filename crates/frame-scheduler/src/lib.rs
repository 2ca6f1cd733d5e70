//! SceneSync Frame Scheduler
//!
//! Decides which instants of scene time must be exported, in what order,
//! and for which objects:
//!
//! - [`motion_blur`]: sample instants for one render frame
//! - [`subframes`]: objects that need their own export instant within a frame
//! - [`scheduler`]: the per-render-step state machine that merges both,
//!   skips instants already exported, and drives a caller callback
//!
//! The scheduler performs no I/O. Everything it emits goes through the
//! callback, and a `false` return is the single abort path.

pub mod motion_blur;
pub mod scheduler;
pub mod subframes;

pub use motion_blur::*;
pub use scheduler::*;
pub use subframes::*;
