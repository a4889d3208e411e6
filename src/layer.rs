//! Layer and per-display content model
//!
//! These are the caller-owned structures handed to the analyzer every frame.
//! The analyzer never allocates layers; it only rewrites a handful of fields
//! (composition type, skip flag, clear-framebuffer hint, geometry-changed)
//! for the duration of one `analyze()` call.
//!
//! The last layer of every [`DisplayContent`] is the framebuffer target, the
//! surface the GPU composes into. Content scans skip it.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;

/// Display slots, in the order hwcomposer hands them over
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySlot {
    Primary = 0,
    External = 1,
    Virtual = 2,
}

impl DisplaySlot {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Opaque gralloc buffer handle, compared by identity only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct BufferHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Integer rectangle in hwc_rect_t convention (right/bottom exclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle at the origin with the given size
    pub fn sized(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Width, widened so reversed or huge rectangles can't overflow
    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    /// Same size, moved to the origin; sizes past `i32::MAX` are clamped
    pub fn at_origin(&self) -> Self {
        Self::sized(clamp_i32(self.width()), clamp_i32(self.height()))
    }
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// How the compositor should produce this layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionType {
    /// GPU composes the layer into the framebuffer target
    #[default]
    Framebuffer,
    /// Layer is scanned out directly from a hardware plane
    Overlay,
    /// The framebuffer target itself
    FramebufferTarget,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    FlipH,
    FlipV,
    Rot90,
    Rot180,
    Rot270,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blending {
    #[default]
    None,
    Premultiplied,
    Coverage,
}

/// Per-layer flags set by SurfaceFlinger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayerFlags {
    /// Layer must not be handled by hwcomposer
    pub skip: bool,
    /// Video surface is in a seek/scrub state
    pub trick_mode: bool,
}

/// Per-layer hints set by hwcomposer for SurfaceFlinger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayerHints {
    /// Clear the framebuffer under this layer instead of drawing it
    pub clear_fb: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    pub handle: Option<BufferHandle>,
    pub source_crop: Rect,
    pub display_frame: Rect,
    pub composition: CompositionType,
    pub transform: Transform,
    pub blending: Blending,
    pub flags: LayerFlags,
    pub hints: LayerHints,
}

impl Layer {
    /// Plain layer showing `handle` unscaled at `display_frame`
    pub fn new(handle: BufferHandle, display_frame: Rect) -> Self {
        Self {
            handle: Some(handle),
            source_crop: display_frame.at_origin(),
            display_frame,
            ..Self::default()
        }
    }

    /// Framebuffer target covering a `width`x`height` display
    pub fn framebuffer_target(width: i32, height: i32) -> Self {
        Self {
            source_crop: Rect::sized(width, height),
            display_frame: Rect::sized(width, height),
            composition: CompositionType::FramebufferTarget,
            ..Self::default()
        }
    }
}

/// Layer list for one display output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayContent {
    /// Ordered back to front, framebuffer target last
    pub layers: Vec<Layer>,
    pub geometry_changed: bool,
}

impl DisplayContent {
    pub fn new(layers: Vec<Layer>, geometry_changed: bool) -> Self {
        Self { layers, geometry_changed }
    }

    /// Layers excluding the trailing framebuffer target
    pub fn content_layers(&self) -> &[Layer] {
        let end = self.layers.len().saturating_sub(1);
        &self.layers[..end]
    }

    pub fn content_layers_mut(&mut self) -> &mut [Layer] {
        let end = self.layers.len().saturating_sub(1);
        &mut self.layers[..end]
    }

    /// Fail if the display carries more layers than the commit path can take
    pub fn check_capacity(&self, slot: usize, max: usize) -> Result<()> {
        if self.layers.len() > max {
            return Err(Error::LayerLimit {
                slot,
                count: self.layers.len(),
                max,
            });
        }
        Ok(())
    }
}
