//! The outbound half of a renderer link, as seen by the exporter.

use scenesync_common::clock::FrameClock;
use scenesync_common::error::SyncResult;
use scenesync_render_protocol::{RenderClient, RendererMode};
use scenesync_scene_model::{AnimationMode, EntityPayload};

/// Receives entity batches and commits.
///
/// Calls must not block on the renderer; the exporter runs them from inside
/// the scheduler's synchronous loop.
pub trait RenderTarget {
    /// Move the time cursor. Returns whether a message was sent.
    fn set_current_frame(&self, clock: FrameClock) -> SyncResult<bool>;

    /// Switch the active camera. Returns whether a message was sent.
    fn set_camera(&self, name: &str) -> SyncResult<bool>;

    fn create_or_update(&self, id: &str, payload: &EntityPayload) -> SyncResult<()>;

    /// Close the batch as time sample `clock`; returns the commit sequence if sent.
    fn commit(&self, clock: FrameClock) -> SyncResult<Option<u64>>;

    /// The renderer gave up on the job.
    fn is_aborted(&self) -> bool {
        false
    }
}

impl RenderTarget for RenderClient {
    fn set_current_frame(&self, clock: FrameClock) -> SyncResult<bool> {
        RenderClient::set_current_frame(self, clock)
    }

    fn set_camera(&self, name: &str) -> SyncResult<bool> {
        RenderClient::set_camera(self, name)
    }

    fn create_or_update(&self, id: &str, payload: &EntityPayload) -> SyncResult<()> {
        RenderClient::create_or_update(self, id, payload)
    }

    fn commit(&self, clock: FrameClock) -> SyncResult<Option<u64>> {
        RenderClient::commit(self, clock)
    }

    fn is_aborted(&self) -> bool {
        RenderClient::is_aborted(self)
    }
}

/// Renderer job type for an export mode.
pub fn renderer_mode(mode: AnimationMode) -> RendererMode {
    match mode {
        AnimationMode::SingleFrame => RendererMode::SingleFrame,
        AnimationMode::Animation | AnimationMode::CameraLoop => RendererMode::Animation,
    }
}
