//! SceneSync CLI: inspect scenes, preview export plans, and export to a renderer.
//!
//! Usage:
//!   scenesync info <SCENE>      Show scene information
//!   scenesync plan <SCENE>      Print every clock an export would emit
//!   scenesync export <SCENE>    Export a scene to a running renderer

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use scenesync_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "scenesync",
    about = "Frame-by-frame scene export to a remote renderer",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show scene information
    Info {
        /// Path to the scene file
        path: PathBuf,
    },

    /// Dry run: print every clock an export would emit and its objects
    Plan {
        /// Path to the scene file
        path: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a scene to a running renderer
    Export {
        /// Path to the scene file
        path: PathBuf,

        /// Renderer address (overrides config)
        #[arg(short, long)]
        address: Option<String>,

        /// Renderer port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Wait for the renderer to acknowledge the last commit
        #[arg(long)]
        wait: bool,

        /// Ask the renderer to show its frame buffer window
        #[arg(long)]
        show_vfb: bool,

        /// Write the export report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    scenesync_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Info { path } => commands::info::run(path, &config),
        Commands::Plan { path, json } => commands::plan::run(path, json, &config),
        Commands::Export {
            path,
            address,
            port,
            wait,
            show_vfb,
            report,
        } => {
            let options = commands::export::ExportOptions {
                address,
                port,
                wait,
                show_vfb,
                report,
            };
            commands::export::run(path, options, config).await
        }
    }
}
