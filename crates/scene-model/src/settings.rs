//! Export settings: animation range, frame step, and motion blur.

use serde::{Deserialize, Serialize};

use scenesync_common::config::ExportDefaults;

/// How render frames are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    /// Only the scene's current frame is rendered.
    #[default]
    SingleFrame,
    /// Every `frame_step`-th frame in `[frame_start, frame_end]`.
    Animation,
    /// One pseudo-frame per loop camera; scene time does not advance.
    CameraLoop,
}

/// Export session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// First frame of the animation range.
    pub frame_start: i32,

    /// Last frame of the animation range (inclusive).
    pub frame_end: i32,

    /// Distance between rendered frames.
    pub frame_step: i32,

    /// Render mode.
    #[serde(default)]
    pub mode: AnimationMode,

    /// Motion blur configuration.
    #[serde(default)]
    pub motion_blur: MotionBlurSettings,
}

/// User-facing motion blur parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionBlurSettings {
    /// Whether motion blur is enabled.
    pub enabled: bool,

    /// Shutter interval length in frames.
    pub duration: f64,

    /// Center of the shutter interval relative to the render frame.
    pub interval_center: f64,

    /// Geometry samples exported per render frame.
    pub geom_samples: u32,
}

/// Sampling interval relative to a render frame's nominal time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionBlurInterval {
    /// Offset of the first sample from the render frame.
    pub start_offset: f64,

    /// Length of the interval; the last sample sits at `start_offset + duration`.
    pub duration: f64,

    /// Number of samples, at least one.
    pub sample_count: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            frame_start: 1,
            frame_end: 1,
            frame_step: 1,
            mode: AnimationMode::SingleFrame,
            motion_blur: MotionBlurSettings::default(),
        }
    }
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 1.0,
            interval_center: 0.0,
            geom_samples: 2,
        }
    }
}

impl ExportSettings {
    /// Settings seeded from the application's configured defaults.
    pub fn from_defaults(defaults: &ExportDefaults) -> Self {
        Self {
            frame_step: defaults.frame_step,
            motion_blur: MotionBlurSettings {
                geom_samples: defaults.geom_samples,
                ..MotionBlurSettings::default()
            },
            ..Self::default()
        }
    }
}

impl MotionBlurSettings {
    /// Resolve into a sampling interval.
    ///
    /// Disabled blur yields a single sample at the render frame.
    pub fn interval(&self) -> MotionBlurInterval {
        if !self.enabled {
            return MotionBlurInterval::single();
        }
        MotionBlurInterval {
            start_offset: self.interval_center - self.duration / 2.0,
            duration: self.duration,
            sample_count: self.geom_samples.max(1),
        }
    }
}

impl MotionBlurInterval {
    /// One sample exactly at the render frame.
    pub fn single() -> Self {
        Self {
            start_offset: 0.0,
            duration: 0.0,
            sample_count: 1,
        }
    }

    /// Distance between consecutive samples; zero for a single sample.
    pub fn sample_step(&self) -> f64 {
        if self.sample_count > 1 {
            self.duration / (self.sample_count - 1) as f64
        } else {
            0.0
        }
    }
}

impl Default for MotionBlurInterval {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_blur_is_single_sample() {
        let settings = MotionBlurSettings {
            enabled: false,
            duration: 0.5,
            interval_center: 0.25,
            geom_samples: 4,
        };
        assert_eq!(settings.interval(), MotionBlurInterval::single());
    }

    #[test]
    fn test_centered_interval() {
        let settings = MotionBlurSettings {
            enabled: true,
            duration: 0.5,
            interval_center: 0.0,
            geom_samples: 2,
        };
        let interval = settings.interval();
        assert!((interval.start_offset + 0.25).abs() < 1e-12);
        assert_eq!(interval.sample_count, 2);
        assert!((interval.sample_step() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_samples_clamped_to_one() {
        let settings = MotionBlurSettings {
            enabled: true,
            geom_samples: 0,
            ..MotionBlurSettings::default()
        };
        assert_eq!(settings.interval().sample_count, 1);
    }

    #[test]
    fn test_settings_mode_defaults_for_older_files() {
        let parsed: ExportSettings =
            serde_json::from_str(r#"{"frame_start":1,"frame_end":10,"frame_step":2}"#).unwrap();
        assert_eq!(parsed.mode, AnimationMode::SingleFrame);
        assert!(!parsed.motion_blur.enabled);
    }

    #[test]
    fn test_from_defaults_seeds_step_and_samples() {
        let defaults = ExportDefaults {
            frame_step: 5,
            geom_samples: 3,
        };
        let settings = ExportSettings::from_defaults(&defaults);
        assert_eq!(settings.frame_step, 5);
        assert_eq!(settings.motion_blur.geom_samples, 3);
        assert_eq!(settings.mode, AnimationMode::SingleFrame);
    }
}
