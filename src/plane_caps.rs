//! Hardware plane capability checks
//!
//! Answers whether a layer could be scanned out from a given kind of plane.
//! Anything that fails a check has to be composed by the GPU instead.

use crate::collaborators::{BufferInfo, PixelFormat, Stride};
use crate::layer::{Blending, Layer, Transform};
use tracing::{debug, trace, warn};

const SPRITE_PLANE_MAX_STRIDE_LINEAR: u32 = 16384;
const SPRITE_PLANE_MAX_WIDTH: i64 = 4096;
const SPRITE_PLANE_MAX_HEIGHT: i64 = 4096;

const OVERLAY_PLANE_MAX_STRIDE_PACKED: u32 = 4096;
const OVERLAY_PLANE_MAX_STRIDE_LINEAR: u32 = 8192;
const OVERLAY_MAX_WIDTH: i64 = 2048;
const OVERLAY_MAX_HEIGHT: i64 = 2048;

/// Kinds of display controller planes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneType {
    Primary,
    Sprite,
    Overlay,
}

impl PlaneType {
    fn is_rgb_plane(self) -> bool {
        matches!(self, Self::Primary | Self::Sprite)
    }
}

fn is_rgb_format(format: PixelFormat) -> bool {
    matches!(
        format,
        PixelFormat::Bgra8888
            | PixelFormat::Bgrx8888
            | PixelFormat::Rgba8888
            | PixelFormat::Rgbx8888
            | PixelFormat::Rgb565
    )
}

/// Run every check; true if the layer can go on `plane`
pub fn is_supported(plane: PlaneType, layer: &Layer, info: &BufferInfo) -> bool {
    is_format_supported(plane, layer, info)
        && is_size_supported(plane, info)
        && is_blending_supported(plane, layer)
        && is_scaling_supported(plane, layer, info)
        && is_transform_supported(plane, layer)
}

pub fn is_format_supported(plane: PlaneType, layer: &Layer, info: &BufferInfo) -> bool {
    let format = info.format;
    let untransformed = layer.transform == Transform::Identity;

    if plane.is_rgb_plane() {
        if is_rgb_format(format) {
            return untransformed;
        }
        trace!(?format, "unsupported format");
        return false;
    }

    match format {
        PixelFormat::I420 | PixelFormat::Yuy2 | PixelFormat::Uyvy => {
            // TODO: overlay can rotate these by 180 once the register setup lands
            if layer.transform == Transform::Rot180 {
                warn!("180 degree rotation is not supported yet");
            }
            untransformed
        }
        PixelFormat::Yv12 => untransformed,
        PixelFormat::Nv12
        | PixelFormat::Yuv420PackedSemiPlanar
        | PixelFormat::Yuv420PackedSemiPlanarTiled => true,
        _ => {
            trace!(?format, "unsupported format");
            false
        }
    }
}

pub fn is_size_supported(plane: PlaneType, info: &BufferInfo) -> bool {
    let format = info.format;
    let stride = match info.stride {
        Stride::Rgb { stride } => stride,
        Stride::Yuv { y_stride, .. } => y_stride,
    };

    if plane.is_rgb_plane() {
        if !is_rgb_format(format) {
            trace!(?format, "unsupported format");
            return false;
        }
        trace!(stride, "sprite stride");
        if stride > SPRITE_PLANE_MAX_STRIDE_LINEAR {
            trace!(stride, "too large stride");
            return false;
        }
        return true;
    }

    if !format.is_video() {
        trace!(?format, "unsupported format");
        return false;
    }

    // overlay can't fetch from buffers with a big stride
    let max_stride = if format.is_packed_yuv() {
        OVERLAY_PLANE_MAX_STRIDE_PACKED
    } else {
        OVERLAY_PLANE_MAX_STRIDE_LINEAR
    };
    if stride > max_stride {
        trace!(stride, max_stride, "stride is too large");
        return false;
    }
    true
}

pub fn is_blending_supported(plane: PlaneType, layer: &Layer) -> bool {
    match plane {
        PlaneType::Primary | PlaneType::Sprite => true,
        PlaneType::Overlay => layer.blending == Blending::None,
    }
}

pub fn is_scaling_supported(plane: PlaneType, layer: &Layer, info: &BufferInfo) -> bool {
    let src = layer.source_crop;
    let (mut src_w, mut src_h) = (src.width(), src.height());
    let (dst_w, dst_h) = (layer.display_frame.width(), layer.display_frame.height());

    if plane.is_rgb_plane() {
        if dst_w - 1 <= 0
            || dst_h - 1 <= 0
            || dst_w - 1 >= SPRITE_PLANE_MAX_WIDTH
            || dst_h - 1 >= SPRITE_PLANE_MAX_HEIGHT
        {
            debug!(dst_w, dst_h, "invalid destination size, fall back to GLES");
            return false;
        }
        // sprites don't scale
        return src_w == dst_w && src_h == dst_h;
    }

    if src_w > OVERLAY_MAX_WIDTH - 1 || src_h > OVERLAY_MAX_HEIGHT - 1 {
        return false;
    }

    // a one-line overlay flip stalls the display pipe
    if dst_w <= 1 || dst_h <= 1 || src_w <= 1 || src_h <= 1 {
        debug!(dst_w, dst_h, "invalid destination size, fall back to GLES");
        return false;
    }

    if matches!(layer.transform, Transform::Rot90 | Transform::Rot270) {
        std::mem::swap(&mut src_w, &mut src_h);
    }

    if !info.protected {
        if src.left & 63 != 0 {
            debug!(offset = src.left, "offset is not 64 bytes aligned, fall back to GLES");
            return false;
        }

        let scale_x = src_w as f32 / dst_w as f32;
        let scale_y = src_h as f32 / dst_h as f32;
        if !(0.25..=4.0).contains(&scale_x) || !(0.25..=4.0).contains(&scale_y) {
            warn!(scale_x, scale_y, "overlay scaling > 4, fall back to GLES");
            return false;
        }
    }

    true
}

pub fn is_transform_supported(plane: PlaneType, layer: &Layer) -> bool {
    match plane {
        // no flips on overlay
        PlaneType::Overlay => matches!(
            layer.transform,
            Transform::Identity | Transform::Rot90 | Transform::Rot270
        ),
        PlaneType::Primary | PlaneType::Sprite => layer.transform == Transform::Identity,
    }
}
