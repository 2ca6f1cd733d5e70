//! Show scene information.

use std::path::PathBuf;

use scenesync_common::config::AppConfig;
use scenesync_frame_scheduler::{FrameExportScheduler, SubframeIndex};

use super::load_scene;

pub fn run(path: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    let (scene, settings) = load_scene(&path, &config.export)?;

    println!("Scene: {}", scene.name);
    println!("  Version: {}", scene.version);
    println!("  Current frame: {}", scene.current_frame);
    println!(
        "  Active camera: {}",
        scene.active_camera.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("Export settings:");
    if scene.export.is_none() {
        println!("  (from configured defaults)");
    }
    println!("  Mode: {:?}", settings.mode);
    println!(
        "  Range: {}..={} step {}",
        settings.frame_start, settings.frame_end, settings.frame_step
    );
    let blur = &settings.motion_blur;
    if blur.enabled {
        println!(
            "  Motion blur: duration {} centered at {} ({} samples)",
            blur.duration, blur.interval_center, blur.geom_samples
        );
    } else {
        println!("  Motion blur: off");
    }
    match FrameExportScheduler::new(&settings, &scene) {
        Ok(scheduler) => println!(
            "  Render steps: {} ({} clock(s) per step)",
            scheduler.render_frame_count(),
            scheduler.motion_blur_samples()
        ),
        Err(e) => println!("  Invalid settings: {e}"),
    }
    println!();

    let mut index = SubframeIndex::new();
    index.rebuild(&scene);
    let hidden = scene.objects.iter().filter(|o| !o.renderable).count();

    println!("Objects: {}", scene.objects.len());
    println!("  Every clock: {}", index.regular_objects().len());
    for division in index.all_divisions() {
        let names: Vec<_> = index
            .objects_at_division(division)
            .iter()
            .map(|o| o.name())
            .collect();
        println!("  Sub-frame 1/{division}: {}", names.join(", "));
    }
    if hidden > 0 {
        println!("  Not renderable: {hidden}");
    }
    println!();

    println!("Cameras: {}", scene.cameras.len());
    for camera in &scene.cameras {
        let looped = if camera.looped { " (loop)" } else { "" };
        println!("  {}{looped}", camera.name);
    }

    Ok(())
}
