//! Error types shared across SceneSync crates.

use std::path::PathBuf;

/// Top-level error type for SceneSync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Scene error: {message}")]
    Scene { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error came from the renderer link rather than local input.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}
