//! SceneSync Common Utilities
//!
//! Shared infrastructure for all SceneSync crates:
//! - Error types and result aliases
//! - Frame clock for epsilon-tolerant scene time comparison
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
