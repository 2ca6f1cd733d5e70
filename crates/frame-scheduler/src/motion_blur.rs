//! Motion blur sample instants.

use scenesync_common::clock::FrameClock;
use scenesync_scene_model::MotionBlurInterval;

/// Computes the geometry sample instants for a render frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionBlurSampler {
    interval: MotionBlurInterval,
}

impl MotionBlurSampler {
    pub fn new(interval: MotionBlurInterval) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> &MotionBlurInterval {
        &self.interval
    }

    /// Samples per render frame, at least one.
    pub fn sample_count(&self) -> usize {
        self.interval.sample_count.max(1) as usize
    }

    /// Sample instants for `render_frame` in increasing order.
    pub fn sample_instants(&self, render_frame: f64) -> Vec<FrameClock> {
        sample_instants(render_frame, &self.interval)
    }
}

/// Ordered sample instants for `render_frame` over `interval`.
///
/// Always returns exactly `max(sample_count, 1)` clocks. One sample sits at
/// `render_frame + start_offset`; more samples are spread evenly over the
/// closed interval. A zero (or negative) duration collapses every sample onto
/// the start instant.
pub fn sample_instants(render_frame: f64, interval: &MotionBlurInterval) -> Vec<FrameClock> {
    let count = interval.sample_count.max(1) as usize;
    let start = render_frame + interval.start_offset;

    if count == 1 {
        return vec![FrameClock::from_float(start)];
    }

    let duration = interval.duration.max(0.0);
    let last = (count - 1) as f64;
    (0..count)
        .map(|i| FrameClock::from_float(start + duration * (i as f64 / last)))
        .collect()
}
