//! Render-step state machine.
//!
//! One render step is one image the renderer produces. A step expands into
//! one or more exported instants: the motion-blur samples around the render
//! frame plus the instants of objects with sub-frame overrides. Blur samples
//! already exported by the previous step (overlapping blur intervals) are
//! skipped, so across a session every emitted clock is strictly later than
//! the one before it. Objects are never skipped with them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use scenesync_common::clock::{FrameClock, FRAME_EPSILON};
use scenesync_common::error::{SyncError, SyncResult};
use scenesync_scene_model::{
    AnimationMode, CameraRef, ExportSettings, MotionBlurInterval, ObjectRef, SceneSource,
};

use crate::motion_blur::MotionBlurSampler;
use crate::subframes::{subframe_offset, SubframeIndex};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Configured, no step in progress (also the state after a completed session).
    Idle,
    /// A session is in progress between exports.
    Running,
    /// Inside the export callback.
    Exporting,
    /// The session was cancelled or the callback refused a clock.
    Aborted,
}

/// One instant handed to the export callback.
#[derive(Debug, Clone, Copy)]
pub struct ExportFrame<'a> {
    /// Scene time to export.
    pub clock: FrameClock,

    /// Nominal render frame of the current step (the loop index in camera-loop mode).
    pub render_frame: f64,

    /// Zero-based render step.
    pub step_index: usize,

    /// Camera for this step: the loop camera, or the scene's active camera.
    pub camera: Option<&'a CameraRef>,

    /// Exactly the objects to export at `clock`.
    pub objects: &'a [ObjectRef],

    /// Whether the regular (division 0) objects are part of this batch.
    pub includes_scene: bool,

    /// Sub-frame divisions whose objects are included, highest first.
    pub subframe_divisions: &'a [u32],
}

/// Result of a single [`FrameExportScheduler::export_step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step was exported; `clocks` instants were emitted.
    Exported { step_index: usize, clocks: usize },
    /// No steps remain.
    Finished,
    /// The session was aborted; `last_clock` is the last instant handed out.
    Aborted {
        step_index: usize,
        last_clock: Option<FrameClock>,
    },
}

/// Result of a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed {
        steps: usize,
        clocks_emitted: usize,
        last_clock: Option<FrameClock>,
    },
    Aborted {
        steps_completed: usize,
        clocks_emitted: usize,
        last_clock: Option<FrameClock>,
    },
}

impl SessionOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Last instant handed to the callback.
    pub fn last_clock(&self) -> Option<FrameClock> {
        match self {
            Self::Completed { last_clock, .. } | Self::Aborted { last_clock, .. } => *last_clock,
        }
    }
}

/// A planned export instant before it is handed out.
#[derive(Debug, Clone)]
struct PlannedExport {
    clock: FrameClock,
    objects: Vec<ObjectRef>,
    includes_scene: bool,
    divisions: Vec<u32>,
}

/// Validated schedule parameters.
#[derive(Debug, Clone)]
struct Schedule {
    mode: AnimationMode,
    start: i32,
    end: i32,
    step: i32,
    interval: MotionBlurInterval,
    loop_cameras: Vec<CameraRef>,
    default_camera: Option<CameraRef>,
}

impl Schedule {
    fn from_settings(settings: &ExportSettings, scene: &dyn SceneSource) -> SyncResult<Self> {
        if settings.frame_step <= 0 {
            return Err(SyncError::config(format!(
                "frame step must be at least 1, got {}",
                settings.frame_step
            )));
        }

        let blur = &settings.motion_blur;
        if blur.enabled
            && (!blur.duration.is_finite()
                || blur.duration < 0.0
                || !blur.interval_center.is_finite())
        {
            return Err(SyncError::config(format!(
                "invalid motion blur interval (duration {}, center {})",
                blur.duration, blur.interval_center
            )));
        }

        let (start, end, loop_cameras) = match settings.mode {
            AnimationMode::SingleFrame => {
                let frame = scene.current_time().floor() as i32;
                (frame, frame, vec![])
            }
            AnimationMode::Animation => {
                if settings.frame_end < settings.frame_start {
                    return Err(SyncError::config(format!(
                        "animation range end {} is before start {}",
                        settings.frame_end, settings.frame_start
                    )));
                }
                (settings.frame_start, settings.frame_end, vec![])
            }
            AnimationMode::CameraLoop => {
                let cameras = scene.loop_cameras();
                if cameras.is_empty() {
                    return Err(SyncError::config(
                        "camera loop requested but no cameras are flagged for looping",
                    ));
                }
                (0, cameras.len() as i32 - 1, cameras)
            }
        };

        Ok(Self {
            mode: settings.mode,
            start,
            end,
            step: settings.frame_step,
            interval: blur.interval(),
            loop_cameras,
            default_camera: scene.active_camera(),
        })
    }

    fn is_camera_loop(&self) -> bool {
        self.mode == AnimationMode::CameraLoop
    }

    fn first_render_frame(&self) -> f64 {
        if self.is_camera_loop() {
            0.0
        } else {
            self.start as f64
        }
    }

    /// Distance the render frame moves per step.
    fn advance(&self) -> f64 {
        if self.is_camera_loop() {
            1.0
        } else {
            self.step as f64
        }
    }

    fn render_frame_count(&self) -> usize {
        if self.is_camera_loop() {
            self.loop_cameras.len()
        } else {
            ((self.end as i64 - self.start as i64) / self.step as i64) as usize + 1
        }
    }
}

/// Decides which instants to export for each render step and drives the
/// export callback through them in increasing time order.
#[derive(Debug)]
pub struct FrameExportScheduler {
    schedule: Schedule,
    sampler: MotionBlurSampler,
    subframes: SubframeIndex,
    state: SchedulerState,
    current_render_frame: f64,
    next_step: usize,
    last_exported: Option<FrameClock>,
    /// `last_exported` as it was before each completed step, for `rewind`.
    step_history: Vec<Option<FrameClock>>,
    clocks_emitted: usize,
    saved_time: Option<FrameClock>,
    cancel_flag: Arc<AtomicBool>,
}

impl FrameExportScheduler {
    /// Build a scheduler from export settings, querying the scene for
    /// loop cameras and the time cursor to restore afterwards.
    pub fn new(settings: &ExportSettings, scene: &dyn SceneSource) -> SyncResult<Self> {
        let schedule = Schedule::from_settings(settings, scene)?;
        let mut scheduler = Self {
            sampler: MotionBlurSampler::new(schedule.interval),
            current_render_frame: schedule.first_render_frame(),
            schedule,
            subframes: SubframeIndex::new(),
            state: SchedulerState::Idle,
            next_step: 0,
            last_exported: None,
            step_history: vec![],
            clocks_emitted: 0,
            saved_time: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        };
        scheduler.remember_scene_time(scene.current_time());
        scheduler.log_configuration();
        Ok(scheduler)
    }

    /// Apply new settings. On error nothing changes.
    ///
    /// Successful reconfiguration resets the session and rescans sub-frames.
    pub fn configure(&mut self, settings: &ExportSettings, scene: &dyn SceneSource) -> SyncResult<()> {
        let schedule = Schedule::from_settings(settings, scene)?;
        self.sampler = MotionBlurSampler::new(schedule.interval);
        self.schedule = schedule;
        self.subframes.mark_dirty();
        self.reset();
        self.remember_scene_time(scene.current_time());
        self.log_configuration();
        Ok(())
    }

    fn log_configuration(&self) {
        tracing::info!(
            mode = ?self.schedule.mode,
            start = self.schedule.start,
            end = self.schedule.end,
            step = self.schedule.step,
            samples = self.sampler.sample_count(),
            render_frames = self.render_frame_count(),
            "Frame export scheduler configured"
        );
    }

    /// Share an external cancellation flag, polled before every emitted clock.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// The cancellation flag; set it to abort the running session.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Return to the first render step and forget what was exported.
    ///
    /// The cancellation flag is left alone; it belongs to the caller.
    pub fn reset(&mut self) {
        self.current_render_frame = self.schedule.first_render_frame();
        self.next_step = 0;
        self.last_exported = None;
        self.step_history.clear();
        self.clocks_emitted = 0;
        self.state = SchedulerState::Idle;
    }

    /// Step back one render step so the next call re-exports the same frame.
    ///
    /// Used by interactive rendering, which keeps re-issuing one frame.
    pub fn rewind(&mut self) {
        if self.next_step == 0 {
            return;
        }
        self.next_step -= 1;
        self.current_render_frame -= self.schedule.advance();
        self.last_exported = self.step_history.pop().flatten();
        if self.state == SchedulerState::Aborted {
            self.state = SchedulerState::Running;
        }
    }

    /// Number of render steps in a full session.
    pub fn render_frame_count(&self) -> usize {
        self.schedule.render_frame_count()
    }

    /// Steps left before the session ends.
    pub fn remaining_steps(&self) -> usize {
        self.render_frame_count().saturating_sub(self.next_step)
    }

    /// Geometry samples per render frame.
    pub fn motion_blur_samples(&self) -> usize {
        self.sampler.sample_count()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn mode(&self) -> AnimationMode {
        self.schedule.mode
    }

    /// Nominal render frame of the next step.
    pub fn current_render_frame(&self) -> f64 {
        self.current_render_frame
    }

    /// Zero-based index of the next step.
    pub fn step_index(&self) -> usize {
        self.next_step
    }

    pub fn last_exported_clock(&self) -> Option<FrameClock> {
        self.last_exported
    }

    pub fn clocks_emitted(&self) -> usize {
        self.clocks_emitted
    }

    pub fn subframes(&self) -> &SubframeIndex {
        &self.subframes
    }

    /// Camera for the next step.
    pub fn active_camera(&self) -> Option<&CameraRef> {
        if self.schedule.is_camera_loop() {
            self.schedule.loop_cameras.get(self.next_step)
        } else {
            self.schedule.default_camera.as_ref()
        }
    }

    /// Cameras in loop order; empty outside camera-loop mode.
    pub fn loop_cameras(&self) -> &[CameraRef] {
        &self.schedule.loop_cameras
    }

    /// The scene topology changed; rescan sub-frame objects on the next step.
    pub fn mark_topology_changed(&mut self) {
        self.subframes.mark_dirty();
    }

    /// Record the host scene time so the caller can restore it afterwards.
    pub fn remember_scene_time(&mut self, time: f64) {
        self.saved_time = Some(FrameClock::from_float(time));
    }

    /// Integer part of the remembered scene time.
    pub fn saved_frame(&self) -> Option<i32> {
        self.saved_time.map(FrameClock::frame)
    }

    /// Fractional part of the remembered scene time.
    pub fn saved_subframe(&self) -> Option<f64> {
        self.saved_time.map(FrameClock::fraction)
    }

    /// Export the current render step and advance to the next one.
    ///
    /// The callback is invoked once per planned instant, in increasing time
    /// order. Returning `false` aborts the session immediately; so does the
    /// cancellation flag, which is polled before each instant.
    pub fn export_step<F>(&mut self, scene: &dyn SceneSource, callback: &mut F) -> StepOutcome
    where
        F: FnMut(&ExportFrame<'_>) -> bool,
    {
        let step_index = self.next_step;

        if self.state == SchedulerState::Aborted {
            return StepOutcome::Aborted {
                step_index,
                last_clock: self.last_exported,
            };
        }
        if step_index >= self.render_frame_count() {
            self.state = SchedulerState::Idle;
            return StepOutcome::Finished;
        }

        self.state = SchedulerState::Running;
        let render_frame = self.current_render_frame;
        let camera = self.active_camera().cloned();
        let plan = self.plan_step(render_frame, scene);

        tracing::debug!(
            step = step_index,
            render_frame,
            planned = plan.len(),
            camera = camera.as_ref().map(|c| c.name()),
            "Exporting render step"
        );

        let exported_before = self.last_exported;
        let mut emitted = 0;

        for planned in &plan {
            if self.cancel_flag.load(Ordering::SeqCst) {
                tracing::warn!(step = step_index, "Export cancelled");
                return self.abort(step_index);
            }

            let frame = ExportFrame {
                clock: planned.clock,
                render_frame,
                step_index,
                camera: camera.as_ref(),
                objects: &planned.objects,
                includes_scene: planned.includes_scene,
                subframe_divisions: &planned.divisions,
            };

            self.state = SchedulerState::Exporting;
            let keep_going = callback(&frame);
            self.state = SchedulerState::Running;

            self.last_exported = Some(planned.clock);
            self.clocks_emitted += 1;
            emitted += 1;

            if !keep_going {
                tracing::warn!(
                    step = step_index,
                    clock = %planned.clock,
                    "Export callback requested abort"
                );
                return self.abort(step_index);
            }
        }

        self.step_history.push(exported_before);
        self.next_step += 1;
        self.current_render_frame += self.schedule.advance();
        if self.next_step >= self.render_frame_count() {
            self.state = SchedulerState::Idle;
        }

        StepOutcome::Exported {
            step_index,
            clocks: emitted,
        }
    }

    /// Run every remaining render step.
    pub fn for_each_export_frame<F>(
        &mut self,
        scene: &dyn SceneSource,
        mut callback: F,
    ) -> SessionOutcome
    where
        F: FnMut(&ExportFrame<'_>) -> bool,
    {
        tracing::info!(
            steps = self.remaining_steps(),
            from = self.current_render_frame,
            "Starting export session"
        );

        loop {
            match self.export_step(scene, &mut callback) {
                StepOutcome::Exported { .. } => continue,
                StepOutcome::Finished => {
                    tracing::info!(
                        steps = self.next_step,
                        clocks = self.clocks_emitted,
                        "Export session complete"
                    );
                    return SessionOutcome::Completed {
                        steps: self.next_step,
                        clocks_emitted: self.clocks_emitted,
                        last_clock: self.last_exported,
                    };
                }
                StepOutcome::Aborted { last_clock, .. } => {
                    return SessionOutcome::Aborted {
                        steps_completed: self.next_step,
                        clocks_emitted: self.clocks_emitted,
                        last_clock,
                    };
                }
            }
        }
    }

    fn abort(&mut self, step_index: usize) -> StepOutcome {
        self.state = SchedulerState::Aborted;
        StepOutcome::Aborted {
            step_index,
            last_clock: self.last_exported,
        }
    }

    /// Merge motion-blur samples and sub-frame instants for one render frame.
    ///
    /// Only blur samples the previous step already exported are dropped. A
    /// batch whose own instant is not after the last export (the regular
    /// objects when every sample was dropped, or a sub-frame bucket behind an
    /// overlapping blur interval) rides along with the step's first pending
    /// instant, so every renderable object is still exported once per step.
    fn plan_step(&mut self, render_frame: f64, scene: &dyn SceneSource) -> Vec<PlannedExport> {
        self.subframes.refresh(render_frame.floor() as i32, scene);
        let last = self.last_exported;
        let pending = |clock: FrameClock| last.map_or(true, |l| clock > l);

        let mut plan: Vec<PlannedExport> = Vec::new();
        let mut skipped = 0;
        for clock in self.sampler.sample_instants(render_frame) {
            // Zero-duration blur repeats the same instant; export it once.
            if plan.last().is_some_and(|p| p.clock == clock) {
                continue;
            }
            if !pending(clock) {
                skipped += 1;
                continue;
            }
            plan.push(PlannedExport {
                clock,
                objects: self.subframes.regular_objects().to_vec(),
                includes_scene: true,
                divisions: vec![],
            });
        }
        let carry_regular = plan.is_empty();

        let mut carried = vec![];
        for division in self.subframes.all_divisions() {
            let clock = FrameClock::from_float(render_frame + subframe_offset(division));
            if !pending(clock) {
                carried.push(division);
                continue;
            }
            let objects = self.subframes.objects_at_division(division).iter().cloned();

            // The sub-frame instant is authoritative when it coincides with a blur sample.
            if let Some(existing) = plan.iter_mut().find(|p| p.clock == clock) {
                existing.clock = clock;
                existing.objects.extend(objects);
                existing.divisions.push(division);
            } else {
                plan.push(PlannedExport {
                    clock,
                    objects: objects.collect(),
                    includes_scene: false,
                    divisions: vec![division],
                });
            }
        }

        plan.sort_by(|a, b| a.clock.compare(&b.clock));

        if carry_regular || !carried.is_empty() {
            if plan.is_empty() {
                // Everything of this step lies at or before the last export.
                let clock = last.map_or(FrameClock::from_float(render_frame), |l| {
                    FrameClock::from_float(l.to_float() + 2.0 * FRAME_EPSILON)
                });
                plan.push(PlannedExport {
                    clock,
                    objects: vec![],
                    includes_scene: false,
                    divisions: vec![],
                });
            }
            let first = &mut plan[0];
            if carry_regular {
                let mut objects = self.subframes.regular_objects().to_vec();
                objects.append(&mut first.objects);
                first.objects = objects;
                first.includes_scene = true;
            }
            for &division in &carried {
                first
                    .objects
                    .extend(self.subframes.objects_at_division(division).iter().cloned());
                first.divisions.push(division);
            }
            first.divisions.sort_unstable_by(|a, b| b.cmp(a));
        }

        if skipped > 0 || carry_regular || !carried.is_empty() {
            tracing::debug!(
                skipped,
                carry_regular,
                carried = ?carried,
                last = ?last.map(|l| l.to_float()),
                "Instants already exported; batches moved to the next pending clock"
            );
        }

        plan
    }
}
