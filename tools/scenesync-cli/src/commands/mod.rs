pub mod export;
pub mod info;
pub mod plan;

use std::path::Path;

use scenesync_common::config::ExportDefaults;
use scenesync_scene_model::{ExportSettings, SceneDescription};

/// Load a scene and resolve its export settings against the configured defaults.
pub fn load_scene(
    path: &Path,
    defaults: &ExportDefaults,
) -> anyhow::Result<(SceneDescription, ExportSettings)> {
    let scene =
        SceneDescription::load(path).map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;

    let settings = match &scene.export {
        Some(settings) => settings.clone(),
        None => {
            tracing::debug!(
                frame_step = defaults.frame_step,
                geom_samples = defaults.geom_samples,
                "Scene has no export settings, using configured defaults"
            );
            ExportSettings::from_defaults(defaults)
        }
    };
    Ok((scene, settings))
}
