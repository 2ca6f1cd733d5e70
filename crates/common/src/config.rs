//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// How to reach the render engine.
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Default export parameters applied when a scene does not override them.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the remote render engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Host name or IP of the renderer. Empty means localhost.
    pub address: String,

    /// TCP port of the renderer.
    pub port: u16,

    /// Bound on establishing the connection.
    pub connect_timeout_ms: u64,

    /// Bound on waiting for a commit acknowledgement.
    pub ack_timeout_ms: u64,

    /// Ask the renderer to show its own frame buffer window.
    pub show_vfb: bool,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Animation frame step.
    pub frame_step: i32,

    /// Number of geometry samples exported per render frame when motion blur is on.
    pub geom_samples: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "scenesync=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5555,
            connect_timeout_ms: 5_000,
            ack_timeout_ms: 30_000,
            show_vfb: false,
        }
    }
}

impl RendererConfig {
    /// `host:port` string suitable for a TCP connect.
    pub fn endpoint(&self) -> String {
        let address = if self.address.trim().is_empty() {
            "127.0.0.1"
        } else {
            self.address.trim()
        };
        format!("{address}:{}", self.port)
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            frame_step: 1,
            geom_samples: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("scenesync").join("config.json")
}
