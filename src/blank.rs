//! Secondary display blanking
//!
//! While blanked, every content layer on a secondary display is turned into
//! a cleared overlay so the output shows nothing instead of stale pixels.

use crate::frame::Frame;
use crate::layer::CompositionType;
use tracing::trace;

/// Rewrite secondary display layers for the given blank state.
/// The primary display is never touched.
pub fn blank_secondary_displays(frame: &mut Frame<'_>, blank: bool) {
    for (slot, content) in frame.secondaries_mut() {
        trace!(slot, blank, layers = content.content_layers().len(), "Applying blank state");
        for layer in content.content_layers_mut() {
            if blank {
                layer.hints.clear_fb = true;
                layer.flags.skip = false;
                layer.composition = CompositionType::Overlay;
            } else {
                layer.hints.clear_fb = false;
                layer.composition = CompositionType::Framebuffer;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{BufferHandle, DisplayContent, Layer, Rect};

    fn display() -> Option<DisplayContent> {
        let mut layer = Layer::new(BufferHandle(1), Rect::sized(640, 480));
        layer.flags.skip = true;
        Some(DisplayContent::new(
            vec![layer.clone(), layer, Layer::framebuffer_target(1920, 1080)],
            false,
        ))
    }

    #[test]
    fn test_blank_rewrites_secondary_only() {
        let mut displays = vec![display(), display(), None];
        let untouched = displays[0].clone();

        blank_secondary_displays(&mut Frame::new(&mut displays), true);

        assert_eq!(displays[0], untouched);
        let secondary = displays[1].as_ref().unwrap();
        for layer in secondary.content_layers() {
            assert!(layer.hints.clear_fb);
            assert!(!layer.flags.skip);
            assert_eq!(layer.composition, CompositionType::Overlay);
        }
        let target = secondary.layers.last().unwrap();
        assert_eq!(target.composition, CompositionType::FramebufferTarget);
        assert!(!target.hints.clear_fb);
    }

    #[test]
    fn test_unblank_restores_framebuffer() {
        let mut displays = vec![display(), display()];
        blank_secondary_displays(&mut Frame::new(&mut displays), true);
        blank_secondary_displays(&mut Frame::new(&mut displays), false);

        for layer in displays[1].as_ref().unwrap().content_layers() {
            assert!(!layer.hints.clear_fb);
            assert_eq!(layer.composition, CompositionType::Framebuffer);
        }
    }
}
