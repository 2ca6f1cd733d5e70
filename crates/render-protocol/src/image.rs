//! Render channel images received from the renderer.
//!
//! The reader task writes into an [`ImageStore`] while other threads read
//! snapshots out of it. Every access goes through one mutex and readers
//! always get a deep copy, so a snapshot is never torn by a bucket that
//! lands mid-read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use scenesync_common::error::{SyncError, SyncResult};

use crate::message::{ChannelType, ImageFormat, ImageUpdate};

/// A float image with 1, 3 or 4 interleaved channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub pixels: Vec<f32>,
}

impl RenderImage {
    /// Zero-filled RGBA image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 4,
            pixels: vec![0.0; width as usize * height as usize * 4],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    fn row_len(&self) -> usize {
        self.width as usize * self.channels
    }

    /// Copy an RGBA tile into this image at `(x, y)`, clipping at the edges.
    fn merge_bucket(&mut self, update: &ImageUpdate) {
        if self.channels != 4 {
            return;
        }
        let tile_w = update.width as usize;
        let x0 = update.x as usize;
        let y0 = update.y as usize;
        let full_w = self.width as usize;
        let full_h = self.height as usize;
        if x0 >= full_w || y0 >= full_h {
            return;
        }

        let copy_w = tile_w.min(full_w - x0);
        let copy_h = (update.height as usize).min(full_h - y0);
        for row in 0..copy_h {
            let src = row * tile_w * 4;
            let dst = ((y0 + row) * full_w + x0) * 4;
            self.pixels[dst..dst + copy_w * 4]
                .copy_from_slice(&update.pixels[src..src + copy_w * 4]);
        }
    }

    /// Build an image from RGBA source pixels keeping `format`'s channels.
    fn from_rgba(update: &ImageUpdate) -> Self {
        let channels = update.format.channels();
        let pixels = if channels == 4 {
            update.pixels.clone()
        } else {
            update
                .pixels
                .chunks_exact(4)
                .flat_map(|px| px[..channels].iter().copied())
                .collect()
        };
        Self {
            width: update.width,
            height: update.height,
            channels,
            pixels,
        }
    }

    /// Mirror the image vertically.
    pub fn flip(&mut self) {
        let row = self.row_len();
        let height = self.height as usize;
        if row == 0 {
            return;
        }
        for y in 0..height / 2 {
            let (top, bottom) = self.pixels.split_at_mut((height - 1 - y) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }

    /// Force alpha to fully opaque.
    pub fn reset_alpha(&mut self) {
        if self.channels != 4 {
            return;
        }
        for px in self.pixels.chunks_exact_mut(4) {
            px[3] = 1.0;
        }
    }

    /// Clamp color components to `max_color` and alpha to `max_alpha`.
    pub fn clamp(&mut self, max_color: f32, max_alpha: f32) {
        let channels = self.channels.max(1);
        for px in self.pixels.chunks_exact_mut(channels) {
            for (i, value) in px.iter_mut().enumerate() {
                let max = if channels == 4 && i == 3 {
                    max_alpha
                } else {
                    max_color
                };
                *value = value.clamp(0.0, max);
            }
        }
    }
}

/// What an [`ImageStore::apply`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageChange {
    /// A tile was merged into the channel's full-size buffer.
    Bucket,
    /// The channel's image was replaced.
    Replaced,
}

#[derive(Debug, Default)]
struct StoreInner {
    render_width: u32,
    render_height: u32,
    images: HashMap<ChannelType, RenderImage>,
}

/// Per-channel images shared between the reader task and consumers.
#[derive(Debug, Default)]
pub struct ImageStore {
    inner: Mutex<StoreInner>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the render size; returns whether it changed.
    pub fn set_render_size(&self, width: u32, height: u32) -> bool {
        let mut inner = self.lock();
        if inner.render_width == width && inner.render_height == height {
            return false;
        }
        inner.render_width = width;
        inner.render_height = height;
        true
    }

    pub fn render_size(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.render_width, inner.render_height)
    }

    /// Store an update for `channel`.
    ///
    /// Buckets are merged into a full-size RGBA buffer allocated on the first
    /// bucket from the current render size. Whole images replace the channel
    /// and, when `fix` is set, are flipped, made opaque and clamped to `[0, 1]`.
    pub fn apply(
        &self,
        channel: ChannelType,
        update: &ImageUpdate,
        fix: bool,
    ) -> SyncResult<ImageChange> {
        let expected = update.width as usize * update.height as usize * 4;
        if update.pixels.len() < expected {
            return Err(SyncError::protocol(format!(
                "image {}x{} carries {} values, expected {expected}",
                update.width,
                update.height,
                update.pixels.len()
            )));
        }

        if update.bucket {
            if update.format != ImageFormat::RgbaReal {
                return Err(SyncError::protocol("buckets must be RGBA"));
            }
            let mut inner = self.lock();
            let (width, height) = (inner.render_width, inner.render_height);
            let image = inner.images.entry(channel).or_default();
            if image.is_empty() || image.width != width || image.height != height {
                *image = RenderImage::blank(width, height);
            }
            image.merge_bucket(update);
            return Ok(ImageChange::Bucket);
        }

        let mut image = RenderImage::from_rgba(update);
        if fix {
            image.flip();
            image.reset_alpha();
            image.clamp(1.0, 1.0);
        }
        self.lock().images.insert(channel, image);
        Ok(ImageChange::Replaced)
    }

    /// Deep copy of a channel's current image, if it has pixels.
    pub fn snapshot(&self, channel: ChannelType) -> Option<RenderImage> {
        self.lock()
            .images
            .get(&channel)
            .filter(|image| !image.is_empty())
            .cloned()
    }

    /// Channels that currently hold an image.
    pub fn channels(&self) -> Vec<ChannelType> {
        let mut channels: Vec<_> = self.lock().images.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn clear(&self) {
        self.lock().images.clear();
    }
}
