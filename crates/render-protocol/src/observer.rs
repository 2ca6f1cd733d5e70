//! Callbacks for out-of-band renderer events.

use crate::image::RenderImage;
use crate::message::{ChannelType, RendererLogLevel};

/// Receives renderer events from the client's reader task.
///
/// Methods run on the reader task, so they must return quickly; anything
/// slow belongs on a channel to another task. All methods default to no-ops.
pub trait RenderObserver: Send + Sync {
    /// A renderer log line, already cut at its first newline.
    fn on_log(&self, _level: RendererLogLevel, _message: &str) {}

    /// Overall render progress in `[0, 1]`.
    fn on_progress(&self, _fraction: f32) {}

    fn on_progress_message(&self, _text: &str) {}

    /// A channel received new pixels (bucket or progressive update).
    fn on_image_updated(&self, _channel: ChannelType) {}

    /// A channel finished; `image` is a private copy.
    fn on_image_ready(&self, _channel: ChannelType, _image: &RenderImage) {}

    /// The renderer aborted the job.
    fn on_aborted(&self) {}

    /// The renderer finished `last_rendered_frame` and waits for the next one.
    fn on_continue(&self, _last_rendered_frame: f64) {}
}
