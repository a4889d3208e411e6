//! Multi-display analysis for hwcomposer
//!
//! Runs once per frame on the composition thread, before plane assignment,
//! and decides three things about the secondary (external or virtual)
//! displays:
//!
//! - whether a playing video should be shown on the secondary display only
//!   ("video extended mode") instead of being mirrored
//! - whether a trick-mode (seek/scrub) surface forces everything back into
//!   GPU-composed clone mode
//! - whether the secondary displays are blanked
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │ hotplug / media / blank  │   │       composition thread         │
//! │   notifiers (any thread) │   │  prepare(displays) once a frame  │
//! └────────────┬─────────────┘   └────────────────┬─────────────────┘
//!              │ AnalyzerNotifier                 │ DisplayAnalyzer::analyze
//!              ▼                                  ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │        EventQueue        │──▶│ drain events → blank secondary → │
//! │   (Mutex<Vec<Event>>)    │   │ extended mode → trick mode       │
//! └──────────────────────────┘   └────────────────┬─────────────────┘
//!                                                 │
//!                          BufferFormatLookup, ActiveModeQuery,
//!                          VsyncSource, RecompositionRequester
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use hwc_display_analyzer::{AnalyzerConfig, DisplayAnalyzer, EnvProperties};
//!
//! let mut analyzer = DisplayAnalyzer::new(collaborators, Arc::new(EnvProperties), AnalyzerConfig::default());
//! let notifier = analyzer.notifier();
//!
//! // media thread
//! notifier.notify_video_state(false, true);
//!
//! // composition thread, every frame
//! analyzer.analyze(&mut displays);
//! if analyzer.is_extended_mode_in_effect() {
//!     // hide the video on the primary display
//! }
//! ```

pub mod analyzer;
pub mod blank;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event;
pub mod extended_mode;
pub mod frame;
pub mod layer;
pub mod mode_state;
pub mod plane_caps;
pub mod trick_mode;

pub use analyzer::{AnalyzerNotifier, DisplayAnalyzer};
pub use collaborators::{
    ActiveModeQuery, BufferFormatLookup, BufferInfo, Collaborators, DisplayMode, PixelFormat,
    RecompositionRequester, Stride, VsyncSource,
};
pub use config::{AnalyzerConfig, EnvProperties, PropertySource};
pub use error::Error;
pub use event::{Event, EventQueue};
pub use layer::{BufferHandle, CompositionType, DisplayContent, DisplaySlot, Layer, Rect};
pub use mode_state::ModeState;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;
