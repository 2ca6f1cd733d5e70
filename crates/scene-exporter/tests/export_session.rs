use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use scenesync_common::clock::FrameClock;
use scenesync_common::error::{SyncError, SyncResult};
use scenesync_render_protocol::codec::decode_line;
use scenesync_render_protocol::{ClientMessage, ClientOptions, RenderClient};
use scenesync_scene_exporter::{ExportStage, RenderTarget, SceneExporter};
use scenesync_scene_model::{EntityPayload, SceneDescription};

fn fixture(name: &str) -> SceneDescription {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/scenes")
        .join(name);
    SceneDescription::load(path).unwrap()
}

fn exporter_for<'a>(scene: &'a SceneDescription, target: &'a dyn RenderTarget) -> SceneExporter<'a> {
    SceneExporter::new(scene, scene, target, &scene.export_settings()).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Frame(f64),
    Camera(String),
    Entity(String),
    Commit(f64),
}

#[derive(Default)]
struct RecordingTarget {
    calls: RefCell<Vec<Call>>,
    creates: Cell<usize>,
    commits: Cell<u64>,
    fail_on_create: Option<usize>,
    abort_after_commits: Option<u64>,
}

impl RecordingTarget {
    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn commit_clocks(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Commit(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Entities sent in the batch closed by each commit.
    fn batches(&self) -> Vec<(f64, Vec<String>)> {
        let mut batches = vec![];
        let mut current = vec![];
        for call in self.calls() {
            match call {
                Call::Entity(id) => current.push(id),
                Call::Commit(t) => batches.push((t, std::mem::take(&mut current))),
                _ => {}
            }
        }
        batches
    }
}

impl RenderTarget for RecordingTarget {
    fn set_current_frame(&self, clock: FrameClock) -> SyncResult<bool> {
        self.calls.borrow_mut().push(Call::Frame(clock.to_float()));
        Ok(true)
    }

    fn set_camera(&self, name: &str) -> SyncResult<bool> {
        self.calls.borrow_mut().push(Call::Camera(name.to_string()));
        Ok(true)
    }

    fn create_or_update(&self, id: &str, _payload: &EntityPayload) -> SyncResult<()> {
        let n = self.creates.get() + 1;
        self.creates.set(n);
        if self.fail_on_create == Some(n) {
            return Err(SyncError::connection("renderer link closed"));
        }
        self.calls.borrow_mut().push(Call::Entity(id.to_string()));
        Ok(())
    }

    fn commit(&self, clock: FrameClock) -> SyncResult<Option<u64>> {
        let seq = self.commits.get() + 1;
        self.commits.set(seq);
        self.calls.borrow_mut().push(Call::Commit(clock.to_float()));
        Ok(Some(seq))
    }

    fn is_aborted(&self) -> bool {
        self.abort_after_commits
            .is_some_and(|limit| self.commits.get() >= limit)
    }
}

fn assert_times(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
    }
}

#[test]
fn turntable_exports_blur_samples_with_subframe_fan() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget::default();

    let mut exporter = exporter_for(&scene, &target);
    let report = exporter.run();

    assert!(report.is_complete());
    assert_eq!(report.commits, 6);
    assert_eq!(report.last_commit, Some(6));
    assert_eq!(
        report.last_committed_clock,
        Some(FrameClock::from_float(3.25))
    );
    assert_eq!(report.entities_sent, 27);
    assert!(report.error.is_none());

    assert_times(
        &target.commit_clocks(),
        &[0.75, 1.25, 1.75, 2.25, 2.75, 3.25],
    );

    for (time, entities) in target.batches() {
        assert!(!entities.contains(&"Helper".to_string()));
        assert_eq!(entities[0], "CamMain");
        let has_fan = entities.contains(&"Fan".to_string());
        let fan_instant = (time - time.floor() - 0.25).abs() < 1e-9;
        assert_eq!(has_fan, fan_instant, "at {time}: {entities:?}");
    }

    let calls = target.calls();
    assert_eq!(calls[0], Call::Frame(0.75));
    assert_eq!(calls[1], Call::Camera("CamMain".into()));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["outcome"], "completed");
    assert_eq!(json["outcome"]["clocks_emitted"], 6);
    assert_eq!(json["commits"], 6);
}

#[test]
fn camera_loop_switches_camera_per_step() {
    let scene = fixture("camera_loop.json");
    let target = RecordingTarget::default();

    let mut exporter = exporter_for(&scene, &target);
    assert_eq!(exporter.scheduler().render_frame_count(), 3);
    let report = exporter.run();

    assert!(report.is_complete());
    let cameras: Vec<_> = target
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Camera(name) => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(cameras, vec!["Front", "Side", "Top"]);
    assert_times(&target.commit_clocks(), &[0.0, 1.0, 2.0]);

    for (_, entities) in target.batches() {
        assert_eq!(entities.len(), 3);
        assert!(entities.contains(&"Bottle".to_string()));
        assert!(entities.contains(&"Backdrop".to_string()));
    }
}

#[test]
fn target_error_aborts_session() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget {
        fail_on_create: Some(6),
        ..RecordingTarget::default()
    };

    let mut exporter = exporter_for(&scene, &target);
    let report = exporter.run();

    assert!(!report.is_complete());
    // The first batch (four entities) committed; the second failed mid-batch.
    assert_eq!(report.commits, 1);
    assert_eq!(report.outcome.last_clock(), Some(FrameClock::from_float(1.25)));
    assert_eq!(
        report.last_committed_clock,
        Some(FrameClock::from_float(0.75))
    );
    assert!(report.error.as_deref().unwrap().contains("renderer link closed"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["last_committed_clock"]["frame"], 0);
}

#[test]
fn renderer_abort_stops_after_current_clock() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget {
        abort_after_commits: Some(2),
        ..RecordingTarget::default()
    };

    let mut exporter = exporter_for(&scene, &target);
    let report = exporter.run();

    assert!(!report.is_complete());
    assert_eq!(report.commits, 2);
    assert_eq!(report.error.as_deref(), Some("renderer aborted"));
    assert_eq!(exporter.scheduler().last_exported_clock(), Some(FrameClock::from_float(1.25)));
    // The abort came after the commit, so the aborting clock is committed.
    assert_eq!(
        report.last_committed_clock,
        Some(FrameClock::from_float(1.25))
    );
}

#[test]
fn preset_cancel_flag_exports_nothing() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget::default();
    let flag = Arc::new(AtomicBool::new(true));

    let mut exporter = exporter_for(&scene, &target).with_cancel_flag(flag.clone());
    let report = exporter.run();

    assert!(!report.is_complete());
    assert_eq!(report.commits, 0);
    assert!(target.calls().is_empty());
    assert_eq!(report.error.as_deref(), Some("cancelled"));
    assert!(report.last_committed_clock.is_none());
    assert!(flag.load(Ordering::SeqCst));
}

#[test]
fn invalid_settings_are_rejected_up_front() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget::default();
    let mut settings = scene.export_settings();
    settings.frame_step = 0;

    let err = SceneExporter::new(&scene, &scene, &target, &settings)
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::Config { .. }));
}

#[test]
fn progress_reports_stages_in_order() {
    let scene = fixture("turntable.json");
    let target = RecordingTarget::default();
    let stages = Arc::new(Mutex::new(vec![]));
    let sink = stages.clone();

    let mut exporter = exporter_for(&scene, &target).with_progress(Box::new(move |p| {
        sink.lock().unwrap().push((p.stage, p.progress));
    }));
    exporter.run();

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first().unwrap().0, ExportStage::Preparing);
    assert_eq!(*stages.last().unwrap(), (ExportStage::Complete, 1.0));
    let exporting = stages
        .iter()
        .filter(|(s, _)| *s == ExportStage::Exporting)
        .count();
    assert_eq!(exporting, 6);
    for pair in stages.windows(2) {
        assert!(pair[0].1 <= pair[1].1);
    }
}

#[tokio::test]
async fn render_client_receives_ordered_batches() {
    let scene = fixture("camera_loop.json");
    let (client_io, renderer_io) = tokio::io::duplex(1 << 16);
    let client = RenderClient::from_stream(
        client_io,
        ClientOptions {
            ack_timeout: Duration::from_secs(1),
            show_vfb: false,
        },
    );

    let report = {
        let mut exporter = exporter_for(&scene, &client);
        exporter.run()
    };
    assert!(report.is_complete());
    assert_eq!(client.exported_count(), 9);
    client.flush().await.unwrap();

    let mut lines = BufReader::new(renderer_io).lines();
    let mut received = vec![];
    while received.len() < 3 * 6 {
        let line = lines.next_line().await.unwrap().unwrap();
        received.push(decode_line::<ClientMessage>(&line).unwrap().unwrap());
    }

    // Each step: frame, camera, camera entity, two objects, commit.
    assert_eq!(received[0], ClientMessage::SetCurrentFrame { frame: 0.0 });
    assert_eq!(received[1], ClientMessage::SetCamera { name: "Front".into() });
    assert!(matches!(&received[2], ClientMessage::CreateOrUpdate { plugin, .. } if plugin == "CameraPhysical"));
    assert!(matches!(&received[5], ClientMessage::Commit { seq: 1, .. }));
    assert_eq!(received[7], ClientMessage::SetCamera { name: "Side".into() });
    assert!(matches!(&received[17], ClientMessage::Commit { seq: 3, .. }));
}
