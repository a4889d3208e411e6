//! Capability interfaces the analyzer depends on
//!
//! The analyzer never reaches for global singletons. Everything it needs from
//! the rest of hwcomposer comes in through these four traits:
//!
//! - [`BufferFormatLookup`]: gralloc buffer metadata (format, stride)
//! - [`ActiveModeQuery`]: the current mode of a display
//! - [`VsyncSource`]: reselect which display drives vsync
//! - [`RecompositionRequester`]: ask SurfaceFlinger for a new frame
//!
//! `VsyncSource` and `RecompositionRequester` are implemented for plain
//! closures, and [`BufferTable`] / [`StaticModes`] are in-memory lookups for
//! tools and tests.

use crate::layer::{BufferHandle, DisplaySlot};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// HAL pixel formats hwcomposer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Bgra8888,
    Bgrx8888,
    Rgba8888,
    Rgbx8888,
    Rgb565,
    I420,
    Yuy2,
    Uyvy,
    /// Intel YV12 layout
    Yv12,
    Nv12,
    /// OMX YUV420 packed semi-planar
    Yuv420PackedSemiPlanar,
    Yuv420PackedSemiPlanarTiled,
    /// Anything else, by raw HAL value
    Other(u32),
}

impl PixelFormat {
    /// True for the YUV formats produced by video decoders
    pub fn is_video(self) -> bool {
        matches!(
            self,
            Self::I420
                | Self::Yuy2
                | Self::Uyvy
                | Self::Yv12
                | Self::Nv12
                | Self::Yuv420PackedSemiPlanar
                | Self::Yuv420PackedSemiPlanarTiled
        )
    }

    /// Packed (single plane, interleaved) YUV
    pub fn is_packed_yuv(self) -> bool {
        matches!(self, Self::Yuy2 | Self::Uyvy)
    }
}

/// Buffer stride, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stride {
    Rgb { stride: u32 },
    Yuv { y_stride: u32, uv_stride: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BufferInfo {
    pub format: PixelFormat,
    pub stride: Stride,
    /// Protected (DRM) content
    #[serde(default)]
    pub protected: bool,
}

/// Active display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32, // In Hz
}

fn default_refresh_rate() -> u32 {
    60
}

impl DisplayMode {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            refresh_rate: default_refresh_rate(),
        }
    }
}

pub trait BufferFormatLookup: Send + Sync {
    /// Lock the buffer long enough to read its metadata
    fn buffer_info(&self, handle: BufferHandle) -> Result<BufferInfo>;

    fn is_video_format(&self, handle: BufferHandle) -> Result<bool> {
        Ok(self.buffer_info(handle)?.format.is_video())
    }
}

pub trait ActiveModeQuery: Send + Sync {
    fn active_mode(&self, slot: DisplaySlot) -> Result<DisplayMode>;
}

pub trait VsyncSource: Send + Sync {
    /// Pick the display that should drive vsync, given current connections
    fn reset_vsync_source(&self);
}

pub trait RecompositionRequester: Send + Sync {
    fn request_recomposition(&self);
}

impl<F: Fn() + Send + Sync> VsyncSource for F {
    fn reset_vsync_source(&self) {
        self()
    }
}

impl<F: Fn() + Send + Sync> RecompositionRequester for F {
    fn request_recomposition(&self) {
        self()
    }
}

/// The analyzer's full set of collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub buffers: Arc<dyn BufferFormatLookup>,
    pub modes: Arc<dyn ActiveModeQuery>,
    pub vsync: Arc<dyn VsyncSource>,
    pub recomposer: Arc<dyn RecompositionRequester>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Buffer metadata keyed by handle
#[derive(Debug, Clone, Default)]
pub struct BufferTable {
    buffers: HashMap<BufferHandle, BufferInfo>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: BufferHandle, info: BufferInfo) {
        self.buffers.insert(handle, info);
    }

    pub fn with(mut self, handle: BufferHandle, info: BufferInfo) -> Self {
        self.insert(handle, info);
        self
    }
}

impl BufferFormatLookup for BufferTable {
    fn buffer_info(&self, handle: BufferHandle) -> Result<BufferInfo> {
        self.buffers
            .get(&handle)
            .copied()
            .ok_or(Error::BufferLock(handle))
    }
}

/// Fixed display modes keyed by slot
#[derive(Debug, Clone, Default)]
pub struct StaticModes {
    modes: HashMap<DisplaySlot, DisplayMode>,
}

impl StaticModes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: DisplaySlot, mode: DisplayMode) -> Self {
        self.modes.insert(slot, mode);
        self
    }
}

impl ActiveModeQuery for StaticModes {
    fn active_mode(&self, slot: DisplaySlot) -> Result<DisplayMode> {
        self.modes
            .get(&slot)
            .copied()
            .ok_or(Error::ModeUnavailable(slot))
    }
}
