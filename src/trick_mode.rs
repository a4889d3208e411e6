//! Trick mode (seek/scrub) detection on the primary display

use crate::layer::{CompositionType, DisplayContent};
use crate::mode_state::ModeState;
use tracing::info;

/// Scan the primary display for a trick-mode surface and update
/// `forced_clone_mode`.
///
/// The first flagged layer is pushed back to GPU composition. Geometry is
/// only marked changed when the detected state differs from last frame.
pub fn detect_trick_mode(primary: Option<&mut DisplayContent>, state: &mut ModeState) {
    let Some(content) = primary else {
        return;
    };

    let mut detected = false;
    if let Some(layer) = content.layers.iter_mut().find(|l| l.flags.trick_mode) {
        detected = true;
        layer.composition = CompositionType::Framebuffer;
    }

    if detected != state.forced_clone_mode {
        info!("Trick mode {}", if detected { "detected, forcing clone mode" } else { "ended" });
        content.geometry_changed = true;
        state.forced_clone_mode = detected;
    }
}
