//! Video extended mode detection
//!
//! Extended mode means the playing video is shown full screen on the
//! external (or virtual) display only, instead of being mirrored. It is
//! engaged when the primary display's video layer shows up on a secondary
//! display at (roughly) that display's full resolution.
//!
//! The decision is sticky: it is only recomputed on frames where some active
//! display reports a geometry change.

use crate::collaborators::{ActiveModeQuery, BufferFormatLookup};
use crate::frame::Frame;
use crate::layer::{BufferHandle, DisplaySlot, Layer};
use crate::mode_state::ModeState;
use tracing::{debug, error, info, trace};

pub struct ExtendedModeDetector<'c> {
    buffers: &'c dyn BufferFormatLookup,
    modes: &'c dyn ActiveModeQuery,
}

impl<'c> ExtendedModeDetector<'c> {
    pub fn new(buffers: &'c dyn BufferFormatLookup, modes: &'c dyn ActiveModeQuery) -> Self {
        Self { buffers, modes }
    }

    /// Update `video_extended_mode` (and clear trick mode when nothing plays)
    pub fn detect(&self, frame: &Frame<'_>, state: &mut ModeState) {
        let previous = state.video_extended_mode;
        self.evaluate(frame, state);
        if state.video_extended_mode != previous {
            info!(
                "Video extended mode {}",
                if state.video_extended_mode { "engaged" } else { "disengaged" }
            );
        }
    }

    fn evaluate(&self, frame: &Frame<'_>, state: &mut ModeState) {
        if !state.video_playing {
            state.video_extended_mode = false;
            state.forced_clone_mode = false;
            return;
        }

        if frame.active_count() <= 1 {
            state.video_extended_mode = false;
            return;
        }

        if !frame.any_geometry_changed() {
            // keep last frame's answer
            return;
        }

        state.video_extended_mode = false;

        let video_handle = frame
            .primary()
            .and_then(|primary| self.find_video_handle(primary.content_layers()));
        let Some(video_handle) = video_handle else {
            return;
        };

        // TODO: handle more than one video layer, and video present on only
        // the virtual display but not the external one
        for (slot, content) in frame.secondaries() {
            let matching = content
                .content_layers()
                .iter()
                .find(|layer| layer.handle == Some(video_handle));

            if let Some(layer) = matching {
                debug!(slot, handle = %video_handle, "Video layer found on secondary display");
                if !self.is_video_embedded(layer) {
                    state.video_extended_mode = true;
                }
                return;
            }
        }
    }

    /// Handle of the first video layer, if any
    fn find_video_handle(&self, layers: &[Layer]) -> Option<BufferHandle> {
        layers
            .iter()
            .filter_map(|layer| layer.handle)
            .find(|&handle| self.is_video_buffer(handle))
    }

    fn is_video_buffer(&self, handle: BufferHandle) -> bool {
        match self.buffers.is_video_format(handle) {
            Ok(video) => video,
            Err(e) => {
                error!(handle = %handle, "Failed to get buffer: {}", e);
                false
            }
        }
    }

    /// Whether the layer is shown smaller than the external display's mode,
    /// e.g. picture-in-picture
    fn is_video_embedded(&self, layer: &Layer) -> bool {
        let mode = match self.modes.active_mode(DisplaySlot::External) {
            Ok(mode) => mode,
            Err(e) => {
                error!("Failed to get mode info: {}", e);
                return false;
            }
        };

        let dst_w = layer.display_frame.width();
        let dst_h = layer.display_frame.height();

        trace!(
            "Src[w]:{}[h]:{} Dest[w]:{}[h]:{} Mode[w]:{}[h]:{} Trans:{:?}",
            layer.source_crop.width(),
            layer.source_crop.height(),
            dst_w,
            dst_h,
            mode.width,
            mode.height,
            layer.transform
        );

        // one pixel of slack for scaler rounding
        dst_w < i64::from(mode.width) - 1 && dst_h < i64::from(mode.height) - 1
    }
}
