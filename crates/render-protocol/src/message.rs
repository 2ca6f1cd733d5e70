//! Wire messages exchanged with the remote renderer.
//!
//! Every message is one JSON object tagged by `type`. The client sends
//! [`ClientMessage`]s and the renderer answers with [`ServerMessage`]s.

use serde::{Deserialize, Serialize};

use scenesync_common::clock::FrameClock;

/// How the renderer should treat the incoming scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererMode {
    /// Small material/thumbnail preview.
    Preview,
    /// Progressive viewport rendering.
    Interactive,
    /// Final render of an animation range.
    Animation,
    /// Final render of one frame.
    SingleFrame,
}

impl RendererMode {
    /// Final modes produce images that get flipped and clamped on arrival.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Animation | Self::SingleFrame)
    }
}

/// Render output channel an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// The composited result image.
    Beauty,
    RealColor,
    Color,
    Normals,
    ZDepth,
    Velocity,
    NodeId,
    RenderId,
    BumpNormals,
    Denoised,
    DrBucket,
}

impl ChannelType {
    /// Channel produced by a render-channel entity plugin, if any.
    pub fn from_plugin(plugin: &str) -> Option<Self> {
        let channel = match plugin {
            "RenderChannelBumpNormals" => Self::BumpNormals,
            "RenderChannelColor" => Self::Color,
            "RenderChannelDenoiser" => Self::Denoised,
            "RenderChannelDRBucket" => Self::DrBucket,
            "RenderChannelNodeID" => Self::NodeId,
            "RenderChannelNormals" => Self::Normals,
            "RenderChannelRenderID" => Self::RenderId,
            "RenderChannelVelocity" => Self::Velocity,
            "RenderChannelZDepth" => Self::ZDepth,
            _ => return None,
        };
        Some(channel)
    }
}

/// Pixel layout of an incoming image.
///
/// Pixels always travel as RGBA floats; the format says how many of the
/// four components the stored image keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    RgbaReal,
    RgbReal,
    BwReal,
}

impl ImageFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::RgbaReal => 4,
            Self::RgbReal => 3,
            Self::BwReal => 1,
        }
    }
}

/// One image or bucket update from the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUpdate {
    pub format: ImageFormat,

    /// Bucket origin within the full image; zero for whole images.
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,

    pub width: u32,
    pub height: u32,

    /// A bucket is a tile merged into the full-size buffer.
    #[serde(default)]
    pub bucket: bool,

    /// Row-major RGBA floats, `width * height * 4` values.
    pub pixels: Vec<f32>,
}

/// Messages sent to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Init {
        mode: RendererMode,
    },
    CreateOrUpdate {
        id: String,
        plugin: String,
        #[serde(default)]
        attributes: serde_json::Map<String, serde_json::Value>,
    },
    Remove {
        id: String,
    },
    Replace {
        old: String,
        new: String,
    },
    /// Marks everything sent since the previous commit as one time sample.
    Commit {
        seq: u64,
        clock: FrameClock,
    },
    SetCurrentFrame {
        frame: f64,
    },
    SetCamera {
        name: String,
    },
    Resize {
        width: u32,
        height: u32,
    },
    GetImage {
        channel: ChannelType,
    },
    SetVfbShow {
        show: bool,
    },
    /// Drop cached animation values up to and including `up_to`.
    ClearFrameData {
        up_to: f64,
    },
    Start,
    Stop,
    Reset,
    Free,
}

/// Messages received from the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Log {
        level: i32,
        message: String,
    },
    Progress {
        fraction: f32,
    },
    ProgressMessage {
        text: String,
    },
    Image {
        channel: ChannelType,
        #[serde(default)]
        ready: bool,
        update: ImageUpdate,
    },
    Aborted,
    Continue {
        last_rendered_frame: f64,
    },
    Ack {
        seq: u64,
    },
}

/// Severity of a renderer log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RendererLogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl RendererLogLevel {
    /// Map the renderer's numeric level: lower numbers are more severe.
    pub fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=9_999 => Self::Error,
            10_000..=19_999 => Self::Warning,
            20_000..=29_999 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// First line of a renderer log message.
pub fn first_line(message: &str) -> &str {
    match message.find(['\n', '\r']) {
        Some(end) => &message[..end],
        None => message,
    }
}
