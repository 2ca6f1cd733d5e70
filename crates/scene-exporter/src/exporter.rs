//! Export sessions: scheduler clocks in, entity batches and commits out.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;

use scenesync_common::clock::{FrameClock, SessionClock};
use scenesync_common::error::SyncResult;
use scenesync_frame_scheduler::{ExportFrame, FrameExportScheduler, SessionOutcome};
use scenesync_scene_model::{ExportSettings, ObjectRef, ObjectSampler, SceneSource};

use crate::target::RenderTarget;

/// Progress callback for export sessions.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Render steps fully exported so far.
    pub steps_done: usize,

    /// Render steps in the session.
    pub total_steps: usize,

    /// Clock being exported, if any.
    pub clock: Option<FrameClock>,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of an export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Exporting,
    Committing,
    Complete,
    Aborted,
}

/// Summary of a finished or aborted session.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub outcome: SessionOutcome,

    /// Create-or-update calls made.
    pub entities_sent: u64,

    /// Commits actually sent.
    pub commits: u64,

    /// Sequence number of the last commit sent.
    pub last_commit: Option<u64>,

    /// Scene time of the last batch whose commit went out. A batch that
    /// failed halfway is never reported here.
    pub last_committed_clock: Option<FrameClock>,

    pub started_at: String,
    pub elapsed_secs: f64,

    /// Why the session stopped early, if it did.
    pub error: Option<String>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        !self.outcome.is_aborted()
    }
}

#[derive(Debug, Default)]
struct Counters {
    entities: u64,
    commits: u64,
    last_commit: Option<u64>,
    last_committed_clock: Option<FrameClock>,
}

/// Runs one export session of a scene into a render target.
pub struct SceneExporter<'a> {
    scene: &'a dyn SceneSource,
    sampler: &'a dyn ObjectSampler,
    target: &'a dyn RenderTarget,
    scheduler: FrameExportScheduler,
    progress: Option<ProgressCallback>,
}

impl<'a> SceneExporter<'a> {
    /// Configure a scheduler for `settings`. Invalid settings are rejected here.
    pub fn new(
        scene: &'a dyn SceneSource,
        sampler: &'a dyn ObjectSampler,
        target: &'a dyn RenderTarget,
        settings: &ExportSettings,
    ) -> SyncResult<Self> {
        let scheduler = FrameExportScheduler::new(settings, scene)?;
        Ok(Self {
            scene,
            sampler,
            target,
            scheduler,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use a caller-owned cancellation flag (e.g. set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.scheduler = self.scheduler.with_cancel_flag(flag);
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.scheduler.cancel_flag()
    }

    pub fn scheduler(&self) -> &FrameExportScheduler {
        &self.scheduler
    }

    /// Drive every remaining render step through the target.
    ///
    /// Blocks until the session completes or aborts. A target error or a
    /// renderer abort stops the session after the current clock; the report
    /// names the last clock handed out.
    pub fn run(&mut self) -> ExportReport {
        let session = SessionClock::start();
        let total_steps = self.scheduler.render_frame_count();
        let report = |stage: ExportStage, steps_done: usize, clock: Option<FrameClock>| {
            if let Some(cb) = &self.progress {
                cb(ExportProgress {
                    progress: fraction(steps_done, total_steps),
                    steps_done,
                    total_steps,
                    clock,
                    stage,
                });
            }
        };

        tracing::info!(
            mode = ?self.scheduler.mode(),
            steps = total_steps,
            samples = self.scheduler.motion_blur_samples(),
            "Starting scene export"
        );
        report(ExportStage::Preparing, 0, None);

        let mut counters = Counters::default();
        let mut failure: Option<String> = None;
        let target = self.target;
        let sampler = self.sampler;

        let outcome = self.scheduler.for_each_export_frame(self.scene, |frame| {
            report(ExportStage::Exporting, frame.step_index, Some(frame.clock));

            if let Err(e) = export_frame(target, sampler, frame, &mut counters) {
                tracing::error!(clock = %frame.clock, error = %e, "Export failed");
                failure = Some(e.to_string());
                return false;
            }
            report(ExportStage::Committing, frame.step_index, Some(frame.clock));

            if target.is_aborted() {
                tracing::warn!(clock = %frame.clock, "Renderer aborted the job");
                failure = Some("renderer aborted".to_string());
                return false;
            }
            true
        });

        let elapsed_secs = session.elapsed_secs();
        match &outcome {
            SessionOutcome::Completed { steps, .. } => {
                report(ExportStage::Complete, *steps, outcome.last_clock());
                tracing::info!(
                    steps,
                    entities = counters.entities,
                    commits = counters.commits,
                    elapsed_secs,
                    "Scene export complete"
                );
            }
            SessionOutcome::Aborted {
                steps_completed, ..
            } => {
                if failure.is_none() {
                    failure = Some("cancelled".to_string());
                }
                report(ExportStage::Aborted, *steps_completed, outcome.last_clock());
                tracing::warn!(
                    steps_completed,
                    last_clock = ?outcome.last_clock().map(|c| c.to_float()),
                    last_committed = ?counters.last_committed_clock.map(|c| c.to_float()),
                    reason = failure.as_deref().unwrap_or_default(),
                    "Scene export aborted"
                );
            }
        }

        ExportReport {
            outcome,
            entities_sent: counters.entities,
            commits: counters.commits,
            last_commit: counters.last_commit,
            last_committed_clock: counters.last_committed_clock,
            started_at: session.started_wall().to_string(),
            elapsed_secs,
            error: failure,
        }
    }
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Send one batch: time cursor, camera, entities, commit.
fn export_frame(
    target: &dyn RenderTarget,
    sampler: &dyn ObjectSampler,
    frame: &ExportFrame<'_>,
    counters: &mut Counters,
) -> SyncResult<()> {
    let clock = frame.clock;
    target.set_current_frame(clock)?;

    if let Some(camera) = frame.camera {
        target.set_camera(camera.name())?;
        let camera_object = ObjectRef::new(camera.name());
        if let Some(payload) = sampler.sample(&camera_object, clock) {
            target.create_or_update(camera.name(), &payload)?;
            counters.entities += 1;
        }
    }

    for object in frame.objects {
        match sampler.sample(object, clock) {
            Some(payload) => {
                target.create_or_update(object.name(), &payload)?;
                counters.entities += 1;
            }
            None => tracing::trace!(object = %object, "Nothing to export"),
        }
    }

    if let Some(seq) = target.commit(clock)? {
        counters.commits += 1;
        counters.last_commit = Some(seq);
        counters.last_committed_clock = Some(clock);
    }

    tracing::debug!(
        clock = %clock,
        step = frame.step_index,
        objects = frame.objects.len(),
        divisions = ?frame.subframe_divisions,
        "Exported clock"
    );
    Ok(())
}

/// Export a scene that samples its own objects.
pub fn export_scene<S>(
    scene: &S,
    target: &dyn RenderTarget,
    settings: &ExportSettings,
) -> SyncResult<ExportReport>
where
    S: SceneSource + ObjectSampler,
{
    let mut exporter = SceneExporter::new(scene, scene, target, settings)?;
    Ok(exporter.run())
}
