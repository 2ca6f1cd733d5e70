//! Export a scene to a running renderer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scenesync_common::config::AppConfig;
use scenesync_common::error::SyncResult;
use scenesync_render_protocol::{
    ChannelType, RenderClient, RenderImage, RenderObserver, RendererLogLevel,
};
use scenesync_scene_exporter::{
    renderer_mode, ExportProgress, ExportReport, ProgressCallback, SceneExporter,
};

use super::load_scene;

/// Command-line overrides for an export.
pub struct ExportOptions {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub wait: bool,
    pub show_vfb: bool,
    pub report: Option<PathBuf>,
}

/// Surfaces renderer events on the console while the export runs.
struct ConsoleObserver;

impl RenderObserver for ConsoleObserver {
    fn on_log(&self, level: RendererLogLevel, message: &str) {
        if level == RendererLogLevel::Error {
            eprintln!("\n  Renderer error: {message}");
        }
    }

    fn on_progress_message(&self, text: &str) {
        tracing::info!(target: "renderer", "{text}");
    }

    fn on_image_ready(&self, channel: ChannelType, image: &RenderImage) {
        tracing::info!(
            channel = ?channel,
            width = image.width,
            height = image.height,
            "Image ready"
        );
    }

    fn on_aborted(&self) {
        eprintln!("\n  Renderer aborted the job");
    }
}

pub async fn run(path: PathBuf, options: ExportOptions, config: AppConfig) -> anyhow::Result<()> {
    let (scene, settings) = load_scene(&path, &config.export)?;

    let mut renderer = config.renderer.clone();
    if let Some(address) = options.address {
        renderer.address = address;
    }
    if let Some(port) = options.port {
        renderer.port = port;
    }
    if options.show_vfb {
        renderer.show_vfb = true;
    }

    println!("Exporting scene: {}", scene.name);
    println!("  Renderer: {}", renderer.endpoint());
    println!("  Mode: {:?}", settings.mode);

    let client = RenderClient::connect(&renderer)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {e}", renderer.endpoint()))?;
    client.add_observer(Arc::new(ConsoleObserver));
    client.init(renderer_mode(settings.mode))?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current clock");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:.1}% ({}/{} steps, {:?})  ",
            p.progress * 100.0,
            p.steps_done,
            p.total_steps,
            p.stage,
        );
    });

    // The exporter blocks; keep the reader task running on the other workers.
    let report = tokio::task::block_in_place(|| -> SyncResult<ExportReport> {
        let mut exporter = SceneExporter::new(&scene, &scene, &client, &settings)?
            .with_cancel_flag(cancel)
            .with_progress(progress_cb);
        Ok(exporter.run())
    })?;
    println!();

    if report.is_complete() {
        client.start()?;
    }
    if options.wait {
        if let Some(seq) = report.last_commit {
            println!("  Waiting for renderer to acknowledge commit {seq}...");
            client.wait_for_commit(seq).await?;
        }
    }
    client.close().await?;

    if let Some(report_path) = &options.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_path, json)?;
        println!("  Report: {}", report_path.display());
    }

    println!(
        "  Sent {} entities in {} commit(s) ({:.2}s)",
        report.entities_sent, report.commits, report.elapsed_secs
    );
    match report.error {
        None => {
            println!("\nExport complete.");
            Ok(())
        }
        Some(reason) => {
            let last = report
                .last_committed_clock
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            Err(anyhow::anyhow!(
                "Export aborted ({reason}); last committed clock: {last}"
            ))
        }
    }
}
