//! Property tests for the frame export scheduler.

use std::cmp::Ordering;
use std::collections::HashMap;

use proptest::prelude::*;
use scenesync_common::clock::FrameClock;
use scenesync_frame_scheduler::{sample_instants, ExportFrame, FrameExportScheduler, StepOutcome};
use scenesync_scene_model::{
    AnimationMode, CameraRef, ExportSettings, MotionBlurInterval, MotionBlurSettings, ObjectRef,
    SceneSource,
};

struct DivisionScene(Vec<u32>);

impl SceneSource for DivisionScene {
    fn objects(&self) -> Vec<ObjectRef> {
        (0..self.0.len())
            .map(|i| ObjectRef::new(format!("obj{i}")))
            .collect()
    }

    fn subframe_division(&self, object: &ObjectRef) -> u32 {
        object
            .name()
            .trim_start_matches("obj")
            .parse::<usize>()
            .ok()
            .and_then(|i| self.0.get(i).copied())
            .unwrap_or(0)
    }

    fn is_renderable(&self, _object: &ObjectRef) -> bool {
        true
    }

    fn loop_cameras(&self) -> Vec<CameraRef> {
        vec![]
    }
}

fn animation(start: i32, len: i32, step: i32, blur: MotionBlurSettings) -> ExportSettings {
    ExportSettings {
        frame_start: start,
        frame_end: start + len,
        frame_step: step,
        mode: AnimationMode::Animation,
        motion_blur: blur,
    }
}

fn division_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(
        prop_oneof![Just(0u32), Just(1), Just(2), Just(3), Just(4), Just(8)],
        1..6,
    )
}

/// Overlapping intervals: long durations and centers well away from the frame.
fn overlapping_blur_strategy() -> impl Strategy<Value = MotionBlurSettings> {
    (0.0f64..2.5, -1.5f64..1.5, 2u32..6).prop_map(|(duration, interval_center, geom_samples)| {
        MotionBlurSettings {
            enabled: true,
            duration,
            interval_center,
            geom_samples,
        }
    })
}

/// Export a whole session and count how often each object appears in each step.
fn exports_per_step(
    scheduler: &mut FrameExportScheduler,
    scene: &DivisionScene,
) -> HashMap<(usize, String), usize> {
    let mut counts = HashMap::new();
    scheduler.for_each_export_frame(scene, |frame: &ExportFrame<'_>| {
        for object in frame.objects {
            *counts
                .entry((frame.step_index, object.name().to_string()))
                .or_insert(0) += 1;
        }
        true
    });
    counts
}

fn blur_strategy() -> impl Strategy<Value = MotionBlurSettings> {
    (
        any::<bool>(),
        prop_oneof![Just(0.0), 0.05f64..3.0],
        -1.0f64..1.0,
        0u32..6,
    )
        .prop_map(|(enabled, duration, interval_center, geom_samples)| {
            MotionBlurSettings {
                enabled,
                duration,
                interval_center,
                geom_samples,
            }
        })
}

proptest! {
    /// The number of render steps follows floor((end - start) / step) + 1.
    #[test]
    fn prop_render_frame_count(start in -50i32..50, len in 0i32..60, step in 1i32..8) {
        let scene = DivisionScene(vec![0]);
        let mut scheduler = FrameExportScheduler::new(
            &animation(start, len, step, MotionBlurSettings::default()),
            &scene,
        ).unwrap();

        let expected = (len / step) as usize + 1;
        prop_assert_eq!(scheduler.render_frame_count(), expected);

        let mut exported = 0;
        while let StepOutcome::Exported { .. } =
            scheduler.export_step(&scene, &mut |_: &ExportFrame<'_>| true)
        {
            exported += 1;
        }
        prop_assert_eq!(exported, expected);
    }

    /// Sampling returns max(n, 1) ordered instants pinned to the interval ends.
    #[test]
    fn prop_sample_instants_ordered(
        frame in -100i32..100,
        start_offset in -1.0f64..1.0,
        duration in 0.0f64..2.0,
        count in 0u32..10,
    ) {
        let interval = MotionBlurInterval { start_offset, duration, sample_count: count };
        let samples = sample_instants(frame as f64, &interval);

        prop_assert_eq!(samples.len(), count.max(1) as usize);
        prop_assert_eq!(samples[0], FrameClock::from_float(frame as f64 + start_offset));
        if count >= 2 {
            let end = FrameClock::from_float(frame as f64 + start_offset + duration);
            prop_assert_eq!(*samples.last().unwrap(), end);
        }
        for pair in samples.windows(2) {
            prop_assert_ne!(pair[0].compare(&pair[1]), Ordering::Greater);
        }
    }

    /// Across a whole session every emitted clock is strictly later than the previous one.
    #[test]
    fn prop_emitted_clocks_strictly_increase(
        start in -10i32..10,
        len in 0i32..12,
        step in 1i32..4,
        blur in blur_strategy(),
        divisions in prop::collection::vec(prop_oneof![Just(0u32), Just(1), Just(2), Just(3), Just(4), Just(8)], 0..5),
    ) {
        let scene = DivisionScene(divisions);
        let mut scheduler =
            FrameExportScheduler::new(&animation(start, len, step, blur), &scene).unwrap();

        let mut clocks = vec![];
        let outcome = scheduler.for_each_export_frame(&scene, |frame| {
            clocks.push(frame.clock);
            true
        });

        prop_assert!(!outcome.is_aborted());
        prop_assert!(!clocks.is_empty());
        for pair in clocks.windows(2) {
            prop_assert_eq!(pair[0].compare(&pair[1]), Ordering::Less);
        }
    }

    /// Without overlapping intervals each sub-frame object appears once per step.
    #[test]
    fn prop_subframe_objects_once_per_step(
        len in 0i32..8,
        divisions in prop::collection::vec(prop_oneof![Just(0u32), Just(1), Just(2), Just(4), Just(5)], 1..6),
    ) {
        let scene = DivisionScene(divisions.clone());
        let blur = MotionBlurSettings {
            enabled: true,
            duration: 0.5,
            interval_center: 0.25,
            geom_samples: 3,
        };
        let mut scheduler =
            FrameExportScheduler::new(&animation(1, len, 1, blur), &scene).unwrap();

        let mut seen: Vec<(usize, String)> = vec![];
        scheduler.for_each_export_frame(&scene, |frame| {
            for object in frame.objects {
                if scene.subframe_division(object) > 0 {
                    seen.push((frame.step_index, object.name().to_string()));
                }
            }
            true
        });

        let with_subframes = divisions.iter().filter(|d| **d > 0).count();
        prop_assert_eq!(seen.len(), with_subframes * (len as usize + 1));
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), seen.len());
    }

    /// Regular objects are exported in every step, whatever the blur and sub-frame layout.
    #[test]
    fn prop_regular_objects_every_step(
        start in -10i32..10,
        len in 0i32..8,
        step in 1i32..4,
        blur in prop_oneof![blur_strategy(), overlapping_blur_strategy()],
        divisions in division_strategy(),
    ) {
        let scene = DivisionScene(divisions.clone());
        let mut scheduler =
            FrameExportScheduler::new(&animation(start, len, step, blur), &scene).unwrap();
        let steps = scheduler.render_frame_count();
        let counts = exports_per_step(&mut scheduler, &scene);

        for step_index in 0..steps {
            for (i, _) in divisions.iter().enumerate().filter(|(_, d)| **d == 0) {
                let key = (step_index, format!("obj{i}"));
                prop_assert!(counts.get(&key).copied().unwrap_or(0) >= 1, "missing {:?}", key);
            }
        }
    }

    /// Sub-frame objects are exported exactly once per step, even when blur intervals overlap.
    #[test]
    fn prop_subframe_objects_exactly_once_with_overlap(
        start in -10i32..10,
        len in 0i32..8,
        blur in overlapping_blur_strategy(),
        divisions in division_strategy(),
    ) {
        let scene = DivisionScene(divisions.clone());
        let mut scheduler =
            FrameExportScheduler::new(&animation(start, len, 1, blur), &scene).unwrap();
        let steps = scheduler.render_frame_count();
        let counts = exports_per_step(&mut scheduler, &scene);

        for step_index in 0..steps {
            for (i, _) in divisions.iter().enumerate().filter(|(_, d)| **d > 0) {
                let key = (step_index, format!("obj{i}"));
                prop_assert_eq!(counts.get(&key).copied(), Some(1), "{:?}", key);
            }
        }
    }
}
