//! Dry run: walk the export schedule without a renderer.

use std::path::PathBuf;

use serde_json::json;

use scenesync_common::config::AppConfig;
use scenesync_frame_scheduler::{ExportFrame, FrameExportScheduler};

use super::load_scene;

pub fn run(path: PathBuf, as_json: bool, config: &AppConfig) -> anyhow::Result<()> {
    let (scene, settings) = load_scene(&path, &config.export)?;
    let mut scheduler = FrameExportScheduler::new(&settings, &scene)?;

    if !as_json {
        println!("Plan for scene: {}", scene.name);
        println!(
            "  {} render step(s), {} sample(s) per step",
            scheduler.render_frame_count(),
            scheduler.motion_blur_samples()
        );
        println!();
    }

    let mut rows = vec![];
    let outcome = scheduler.for_each_export_frame(&scene, |frame: &ExportFrame<'_>| {
        if as_json {
            rows.push(json!({
                "step": frame.step_index,
                "render_frame": frame.render_frame,
                "time": frame.clock.to_float(),
                "clock": frame.clock,
                "camera": frame.camera,
                "includes_scene": frame.includes_scene,
                "subframe_divisions": frame.subframe_divisions,
                "objects": frame.objects,
            }));
        } else {
            let names: Vec<_> = frame.objects.iter().map(|o| o.name()).collect();
            let camera = frame
                .camera
                .map(|c| format!(" [{}]", c.name()))
                .unwrap_or_default();
            println!(
                "  step {:>4}  clock {}{camera}  {}",
                frame.step_index,
                frame.clock,
                names.join(", ")
            );
        }
        true
    });

    if as_json {
        let plan = json!({
            "scene": scene.name,
            "settings": settings,
            "clocks": rows,
            "outcome": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!();
        println!(
            "{} clock(s) over {} step(s)",
            scheduler.clocks_emitted(),
            scheduler.render_frame_count()
        );
    }

    Ok(())
}
