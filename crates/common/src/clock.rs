//! Scene time representation and session timing.
//!
//! Scene time is exported as a [`FrameClock`]: an integer frame plus a
//! fractional sub-frame. Two clocks closer than [`FRAME_EPSILON`] within the
//! same frame are the same instant, which keeps floating-point drift in
//! motion-blur sample spacing from producing phantom "new" instants.

use std::cmp::Ordering;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing sub-frame fractions.
pub const FRAME_EPSILON: f64 = 1e-4;

/// A point in scene time as `(frame, fraction)` with `fraction` in `[0, 1)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrameClock {
    frame: i32,
    fraction: f64,
}

impl FrameClock {
    /// Build a clock from a frame and an offset; the offset may exceed one frame.
    pub fn new(frame: i32, fraction: f64) -> Self {
        Self::from_float(frame as f64 + fraction)
    }

    /// Convert floating-point scene time into a clock.
    ///
    /// A fraction within epsilon of `1.0` is carried into the next frame so
    /// that `1.99999` and `2.0` resolve to the same clock. Non-finite input
    /// maps to frame zero.
    pub fn from_float(value: f64) -> Self {
        if !value.is_finite() {
            return Self::default();
        }

        let mut frame = value.floor();
        let mut fraction = value - frame;
        if 1.0 - fraction < FRAME_EPSILON {
            frame += 1.0;
            fraction = 0.0;
        }

        Self {
            frame: frame as i32,
            fraction,
        }
    }

    /// Scene time as a float.
    pub fn to_float(self) -> f64 {
        self.frame as f64 + self.fraction
    }

    /// Integer part.
    pub fn frame(self) -> i32 {
        self.frame
    }

    /// Fractional part in `[0, 1)`.
    pub fn fraction(self) -> f64 {
        self.fraction
    }

    /// Whether this clock lies between two whole frames.
    pub fn is_subframe(self) -> bool {
        self.fraction >= FRAME_EPSILON
    }

    /// Epsilon-tolerant comparison: integer part first, then fraction.
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.frame.cmp(&other.frame) {
            Ordering::Equal => {
                if (self.fraction - other.fraction).abs() < FRAME_EPSILON {
                    Ordering::Equal
                } else {
                    self.fraction
                        .partial_cmp(&other.fraction)
                        .unwrap_or(Ordering::Equal)
                }
            }
            ord => ord,
        }
    }
}

impl PartialEq for FrameClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialOrd for FrameClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl From<f64> for FrameClock {
    fn from(value: f64) -> Self {
        Self::from_float(value)
    }
}

impl fmt::Display for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_float())
    }
}

/// Wall and monotonic timing for one export session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    started: Instant,
    started_wall: String,
}

impl SessionClock {
    /// Start timing now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds since the session started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Wall-clock start time (RFC 3339).
    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_float_splits_parts() {
        let clock = FrameClock::from_float(3.25);
        assert_eq!(clock.frame(), 3);
        assert!((clock.fraction() - 0.25).abs() < 1e-12);
        assert!(clock.is_subframe());
    }

    #[test]
    fn test_negative_time_keeps_fraction_positive() {
        let clock = FrameClock::from_float(-0.25);
        assert_eq!(clock.frame(), -1);
        assert!((clock.fraction() - 0.75).abs() < 1e-12);
        assert!((clock.to_float() + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_near_whole_frame_carries() {
        let clock = FrameClock::from_float(1.99999);
        assert_eq!(clock.frame(), 2);
        assert!(!clock.is_subframe());
        assert_eq!(clock, FrameClock::from_float(2.0));
    }

    #[test]
    fn test_epsilon_equality_within_frame() {
        let a = FrameClock::from_float(5.50000);
        let b = FrameClock::from_float(5.50005);
        let c = FrameClock::from_float(5.5002);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_integer_part_dominates_ordering() {
        let a = FrameClock::new(1, 0.9);
        let b = FrameClock::new(2, 0.1);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
    }

    #[test]
    fn test_new_normalizes_overflowing_offset() {
        let clock = FrameClock::new(1, 1.5);
        assert_eq!(clock.frame(), 2);
        assert!((clock.fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_maps_to_zero() {
        assert_eq!(FrameClock::from_float(f64::NAN), FrameClock::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(FrameClock::from_float(0.75).to_string(), "0.7500");
    }

    #[test]
    fn test_session_clock_elapsed() {
        let clock = SessionClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.started_wall().is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_epsilon(value in -10_000.0f64..10_000.0) {
            let clock = FrameClock::from_float(value);
            prop_assert!((clock.to_float() - value).abs() < FRAME_EPSILON);
            prop_assert!(clock.fraction() >= 0.0 && clock.fraction() < 1.0);
        }

        #[test]
        fn prop_ordering_follows_scene_time(a in -1_000.0f64..1_000.0, gap in 0.001f64..10.0) {
            let lo = FrameClock::from_float(a);
            let hi = FrameClock::from_float(a + gap);
            prop_assert!(lo < hi);
            prop_assert_eq!(hi.compare(&lo), Ordering::Greater);
        }
    }
}
