//! SceneSync Render Protocol
//!
//! The link to the remote renderer:
//! - **Messages:** JSON wire messages in both directions
//! - **Codec:** newline-delimited framing
//! - **Images:** per-channel buffers filled by bucket and full-image updates
//! - **Client:** ordered outbound queue plus a background reader dispatching
//!   log, progress, image and abort events to [`RenderObserver`]s

pub mod client;
pub mod codec;
pub mod image;
pub mod message;
pub mod observer;

pub use client::{ClientOptions, RenderClient};
pub use image::{ImageChange, ImageStore, RenderImage};
pub use message::*;
pub use observer::RenderObserver;
