//! Sticky per-frame decision state

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeState {
    /// Playing video goes to the secondary display only
    pub video_extended_mode: bool,
    /// Trick mode detected on the primary display. Only refreshed while
    /// `video_extended_mode` is on, so it can read true after the trick-mode
    /// layer is gone; it has no effect until extended mode engages again.
    pub forced_clone_mode: bool,
    pub blank_secondary: bool,
    pub video_playing: bool,
    pub video_preparing: bool,
    pub overlay_allowed: bool,
    /// Cached value of the runtime extended mode switch
    pub extended_mode_support: bool,
}

impl Default for ModeState {
    fn default() -> Self {
        Self {
            video_extended_mode: false,
            forced_clone_mode: false,
            blank_secondary: false,
            video_playing: false,
            video_preparing: false,
            overlay_allowed: true,
            extended_mode_support: true,
        }
    }
}

impl ModeState {
    pub fn new(extended_mode_support: bool) -> Self {
        Self {
            extended_mode_support,
            ..Self::default()
        }
    }

    /// Trick mode always wins over extended mode
    pub fn extended_mode_in_effect(&self) -> bool {
        self.video_extended_mode && !self.forced_clone_mode
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  extended mode support: {}", self.extended_mode_support)?;
        writeln!(f, "  video extended mode:   {}", self.video_extended_mode)?;
        writeln!(f, "  forced clone mode:     {}", self.forced_clone_mode)?;
        writeln!(f, "  extended in effect:    {}", self.extended_mode_in_effect())?;
        writeln!(f, "  blank secondary:       {}", self.blank_secondary)?;
        writeln!(f, "  video playing:         {}", self.video_playing)?;
        writeln!(f, "  video preparing:       {}", self.video_preparing)?;
        write!(f, "  overlay allowed:       {}", self.overlay_allowed)
    }
}
