//! Per-frame display analysis
//!
//! [`DisplayAnalyzer`] lives on the composition thread and is called once per
//! frame with every display's layer list. Other threads report hotplug,
//! blank and video state changes through an [`AnalyzerNotifier`]; those are
//! queued and applied at the start of the next frame.
//!
//! Per frame, strictly in this order:
//! 1. apply queued events
//! 2. re-assert blanking on secondary displays while blanked
//! 3. video extended mode detection, then trick mode detection on the
//!    primary display when extended mode came out on

use crate::blank::blank_secondary_displays;
use crate::collaborators::{Collaborators, RecompositionRequester, VsyncSource};
use crate::config::{
    property_flag, AnalyzerConfig, PropertySource, PROP_VIDEO_EXTMODE_DEFAULT,
    PROP_VIDEO_EXTMODE_ENABLE,
};
use crate::event::{Event, EventQueue};
use crate::extended_mode::ExtendedModeDetector;
use crate::frame::Frame;
use crate::layer::DisplayContent;
use crate::mode_state::ModeState;
use crate::trick_mode::detect_trick_mode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DisplayAnalyzer {
    initialized: bool,
    config: AnalyzerConfig,
    state: ModeState,
    events: Arc<EventQueue>,
    collaborators: Collaborators,
    properties: Arc<dyn PropertySource>,
}

impl DisplayAnalyzer {
    /// Create an initialized analyzer
    pub fn new(
        collaborators: Collaborators,
        properties: Arc<dyn PropertySource>,
        config: AnalyzerConfig,
    ) -> Self {
        let mut analyzer = Self {
            initialized: false,
            state: ModeState::new(config.video_extended_mode),
            config,
            events: Arc::new(EventQueue::new()),
            collaborators,
            properties,
        };
        analyzer.initialize();
        analyzer
    }

    /// Reset all mode state and drop pending events
    pub fn initialize(&mut self) {
        let support = property_flag(
            self.properties.as_ref(),
            PROP_VIDEO_EXTMODE_ENABLE,
            PROP_VIDEO_EXTMODE_DEFAULT,
            self.config.video_extended_mode,
        );
        self.state = ModeState::new(support);
        self.events.clear();
        self.initialized = true;
        info!(extended_mode_support = support, "Display analyzer initialized");
    }

    pub fn deinitialize(&mut self) {
        self.events.clear();
        self.initialized = false;
        debug!("Display analyzer deinitialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Handle for reporting events from other threads
    pub fn notifier(&self) -> AnalyzerNotifier {
        AnalyzerNotifier {
            events: Arc::clone(&self.events),
            vsync: Arc::clone(&self.collaborators.vsync),
            recomposer: Arc::clone(&self.collaborators.recomposer),
        }
    }

    /// Analyze one frame; `displays` is indexed by display slot, primary first.
    ///
    /// Layers and geometry-changed flags are rewritten in place. Nothing
    /// borrowed from `displays` outlives this call.
    pub fn analyze(&mut self, displays: &mut [Option<DisplayContent>]) {
        if !self.initialized {
            warn!("analyze() called on uninitialized display analyzer");
            return;
        }

        let mut frame = Frame::new(displays);
        self.check_capacity(&frame);

        self.handle_pending_events(&mut frame);

        if self.state.blank_secondary {
            blank_secondary_displays(&mut frame, true);
        }

        if self.state.extended_mode_support {
            let detector = ExtendedModeDetector::new(
                self.collaborators.buffers.as_ref(),
                self.collaborators.modes.as_ref(),
            );
            detector.detect(&frame, &mut self.state);

            if self.state.video_extended_mode {
                detect_trick_mode(frame.primary_mut(), &mut self.state);
            }
        } else {
            self.state.video_extended_mode = false;
            self.state.forced_clone_mode = false;
        }
    }

    fn check_capacity(&self, frame: &Frame<'_>) {
        for (slot, content) in frame.active() {
            if let Err(e) = content.check_capacity(slot, self.config.max_layers_per_display) {
                warn!("{}", e);
            }
        }
    }

    fn handle_pending_events(&mut self, frame: &mut Frame<'_>) {
        let events = Arc::clone(&self.events);
        let applied = events.drain_and_apply(|event| self.apply_event(event, frame));
        if applied > 0 {
            debug!(applied, "Handled pending events");
        }
    }

    fn apply_event(&mut self, event: Event, frame: &mut Frame<'_>) {
        match event {
            Event::Hotplug { connected } => {
                debug!(connected, "Hotplug event, resetting vsync source");
                self.collaborators.vsync.reset_vsync_source();
            }
            Event::Blank { blank } => {
                info!(blank, "Secondary display blank state changed");
                self.state.blank_secondary = blank;
                // reset composition type on the secondary displays
                frame.mark_secondaries_geometry_changed();
                blank_secondary_displays(frame, blank);
            }
            Event::VideoState { preparing, playing } => {
                // preparing does not gate overlay use yet
                if playing != self.state.video_playing {
                    info!(playing, "Video playback state changed");
                }
                self.state.video_preparing = preparing;
                self.state.video_playing = playing;
            }
        }
    }

    /// Whether playing video should go to the secondary display only
    pub fn is_extended_mode_in_effect(&self) -> bool {
        self.state.extended_mode_in_effect()
    }

    pub fn is_video_playing(&self) -> bool {
        self.state.video_playing
    }

    pub fn is_overlay_use_allowed(&self) -> bool {
        self.state.overlay_allowed
    }

    /// Re-reads the runtime property on every call so it can be toggled
    /// while debugging
    pub fn is_extended_mode_support_enabled(&mut self) -> bool {
        self.state.extended_mode_support = property_flag(
            self.properties.as_ref(),
            PROP_VIDEO_EXTMODE_ENABLE,
            PROP_VIDEO_EXTMODE_DEFAULT,
            self.state.extended_mode_support,
        );
        info!("video extended mode enabled: {}", self.state.extended_mode_support);
        self.state.extended_mode_support
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn dump(&self) -> String {
        format!(
            "DisplayAnalyzer (initialized: {})\n{}\n  pending events:        {}",
            self.initialized,
            self.state,
            self.events.len()
        )
    }
}

impl fmt::Debug for DisplayAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayAnalyzer")
            .field("initialized", &self.initialized)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

/// Thread-safe entry points for event producers
///
/// Hotplug disconnect is handled synchronously on the caller's thread so
/// the primary display gets vsync back immediately; everything else is
/// queued for the next `analyze()`.
#[derive(Clone)]
pub struct AnalyzerNotifier {
    events: Arc<EventQueue>,
    vsync: Arc<dyn VsyncSource>,
    recomposer: Arc<dyn RecompositionRequester>,
}

impl AnalyzerNotifier {
    pub fn notify_hotplug(&self, connected: bool) {
        if connected {
            self.queue_hotplug_connected();
        } else {
            self.handle_disconnect_now();
        }
    }

    /// Reselect the vsync source right away, without waiting for a frame
    pub fn handle_disconnect_now(&self) {
        info!("Display disconnected, resetting vsync source immediately");
        self.vsync.reset_vsync_source();
    }

    /// Queue the vsync switch for the next frame and ask for one
    pub fn queue_hotplug_connected(&self) {
        self.events.post(Event::Hotplug { connected: true });
        self.recomposer.request_recomposition();
    }

    pub fn notify_video_state(&self, preparing: bool, playing: bool) {
        self.events.post(Event::VideoState { preparing, playing });
    }

    pub fn notify_blank(&self, blank: bool) {
        self.events.post(Event::Blank { blank });
        self.recomposer.request_recomposition();
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

impl fmt::Debug for AnalyzerNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerNotifier")
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        BufferInfo, BufferTable, DisplayMode, PixelFormat, StaticModes, Stride,
    };
    use crate::config::StaticProperties;
    use crate::layer::{BufferHandle, CompositionType, DisplaySlot, Layer, Rect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VIDEO: BufferHandle = BufferHandle(0x1000);
    const UI: BufferHandle = BufferHandle(0x2000);

    struct Harness {
        analyzer: DisplayAnalyzer,
        properties: Arc<StaticProperties>,
        vsync_resets: Arc<AtomicUsize>,
        recompositions: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let buffers = BufferTable::new()
            .with(
                VIDEO,
                BufferInfo {
                    format: PixelFormat::Nv12,
                    stride: Stride::Yuv { y_stride: 1920, uv_stride: 1920 },
                    protected: false,
                },
            )
            .with(
                UI,
                BufferInfo {
                    format: PixelFormat::Rgba8888,
                    stride: Stride::Rgb { stride: 7680 },
                    protected: false,
                },
            );
        let modes = StaticModes::new()
            .with(DisplaySlot::Primary, DisplayMode::new(1920, 1080))
            .with(DisplaySlot::External, DisplayMode::new(1920, 1080));

        let vsync_resets = Arc::new(AtomicUsize::new(0));
        let recompositions = Arc::new(AtomicUsize::new(0));
        let vsync_counter = vsync_resets.clone();
        let recomposition_counter = recompositions.clone();

        let collaborators = Collaborators {
            buffers: Arc::new(buffers),
            modes: Arc::new(modes),
            vsync: Arc::new(move || {
                vsync_counter.fetch_add(1, Ordering::SeqCst);
            }),
            recomposer: Arc::new(move || {
                recomposition_counter.fetch_add(1, Ordering::SeqCst);
            }),
        };
        let properties = Arc::new(StaticProperties::new());
        let analyzer = DisplayAnalyzer::new(
            collaborators,
            properties.clone(),
            AnalyzerConfig::default(),
        );

        Harness {
            analyzer,
            properties,
            vsync_resets,
            recompositions,
        }
    }

    fn display(layers: Vec<Layer>, geometry_changed: bool) -> Option<DisplayContent> {
        let mut layers = layers;
        layers.push(Layer::framebuffer_target(1920, 1080));
        Some(DisplayContent::new(layers, geometry_changed))
    }

    fn video(frame: Rect) -> Layer {
        let mut layer = Layer::new(VIDEO, frame);
        layer.composition = CompositionType::Overlay;
        layer
    }

    fn start_playback(h: &Harness) {
        h.analyzer.notifier().notify_video_state(false, true);
    }

    #[test]
    fn test_embedded_video_is_mirrored() {
        let mut h = harness();
        start_playback(&h);

        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::new(0, 0, 960, 540))], true),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(h.analyzer.is_video_playing());
        assert!(!h.analyzer.state().video_extended_mode);
        assert!(!h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_full_screen_video_is_extended() {
        let mut h = harness();
        start_playback(&h);

        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(h.analyzer.state().video_extended_mode);
        assert!(h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_single_display_never_extended() {
        let mut h = harness();
        start_playback(&h);

        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.is_extended_mode_in_effect());

        let mut displays = vec![display(vec![video(Rect::sized(1920, 1080))], false), None];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.state().video_extended_mode);
        assert!(!h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_blank_event_rewrites_secondary() {
        let mut h = harness();
        h.analyzer.notifier().notify_blank(true);
        assert_eq!(h.recompositions.load(Ordering::SeqCst), 1);

        let mut skipped = Layer::new(UI, Rect::sized(1920, 1080));
        skipped.flags.skip = true;
        let mut displays = vec![
            display(vec![Layer::new(UI, Rect::sized(1920, 1080))], false),
            display(vec![skipped.clone(), skipped], false),
        ];
        let primary_before = displays[0].clone();

        h.analyzer.analyze(&mut displays);

        assert!(h.analyzer.state().blank_secondary);
        assert_eq!(displays[0], primary_before);
        let secondary = displays[1].as_ref().unwrap();
        assert!(secondary.geometry_changed);
        for layer in secondary.content_layers() {
            assert!(layer.hints.clear_fb);
            assert!(!layer.flags.skip);
            assert_eq!(layer.composition, CompositionType::Overlay);
        }
        assert_eq!(
            secondary.layers.last().unwrap().composition,
            CompositionType::FramebufferTarget
        );
    }

    #[test]
    fn test_blank_reasserted_every_frame() {
        let mut h = harness();
        h.analyzer.notifier().notify_blank(true);
        h.analyzer.analyze(&mut vec![display(vec![], false), display(vec![], false)]);

        let mut displays = vec![
            display(vec![], false),
            display(vec![Layer::new(UI, Rect::sized(100, 100))], false),
        ];
        h.analyzer.analyze(&mut displays);

        let secondary = displays[1].as_ref().unwrap();
        assert!(!secondary.geometry_changed);
        assert_eq!(secondary.layers[0].composition, CompositionType::Overlay);
        assert!(secondary.layers[0].hints.clear_fb);
    }

    #[test]
    fn test_unblank_restores_framebuffer() {
        let mut h = harness();
        let notifier = h.analyzer.notifier();
        notifier.notify_blank(true);
        h.analyzer.analyze(&mut vec![display(vec![], false), display(vec![], false)]);

        notifier.notify_blank(false);
        let mut displays = vec![
            display(vec![], false),
            display(vec![video(Rect::sized(100, 100))], false),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(!h.analyzer.state().blank_secondary);
        let secondary = displays[1].as_ref().unwrap();
        assert!(secondary.geometry_changed);
        assert_eq!(secondary.layers[0].composition, CompositionType::Framebuffer);
        assert!(!secondary.layers[0].hints.clear_fb);
    }

    #[test]
    fn test_trick_mode_overrides_extended_mode() {
        let mut h = harness();
        start_playback(&h);

        let mut trick = video(Rect::sized(1920, 1080));
        trick.flags.trick_mode = true;

        // frame 1: trick mode appears, primary geometry gets invalidated
        let mut displays = vec![
            display(vec![trick.clone()], false),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(h.analyzer.state().video_extended_mode);
        assert!(h.analyzer.state().forced_clone_mode);
        assert!(!h.analyzer.is_extended_mode_in_effect());
        let primary = displays[0].as_ref().unwrap();
        assert!(primary.geometry_changed);
        assert_eq!(primary.layers[0].composition, CompositionType::Framebuffer);

        // frame 2: still in trick mode, no new invalidation
        let mut displays = vec![
            display(vec![trick], false),
            display(vec![video(Rect::sized(1920, 1080))], false),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(h.analyzer.state().forced_clone_mode);
        assert!(!h.analyzer.is_extended_mode_in_effect());
        assert!(!displays[0].as_ref().unwrap().geometry_changed);

        // frame 3: trick mode over, extended mode comes back
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], false),
            display(vec![video(Rect::sized(1920, 1080))], false),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(!h.analyzer.state().forced_clone_mode);
        assert!(h.analyzer.is_extended_mode_in_effect());
        assert!(displays[0].as_ref().unwrap().geometry_changed);
    }

    #[test]
    fn test_forced_clone_only_refreshed_while_extended() {
        let mut h = harness();
        start_playback(&h);

        let mut trick = video(Rect::sized(1920, 1080));
        trick.flags.trick_mode = true;
        let mut displays = vec![
            display(vec![trick.clone()], false),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.state().forced_clone_mode);

        // video shrinks on the secondary display, extended mode drops
        let mut displays = vec![
            display(vec![trick], false),
            display(vec![video(Rect::sized(960, 540))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.state().video_extended_mode);

        // trick-mode layer gone, but nothing re-evaluates the flag
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], false),
            display(vec![video(Rect::sized(960, 540))], false),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.state().forced_clone_mode);
        assert!(!h.analyzer.is_extended_mode_in_effect());
        assert!(h.analyzer.dump().contains("forced clone mode:     true"));

        // back to full screen: trick detection runs again and clears it
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], false),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.state().forced_clone_mode);
        assert!(h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_playback_stop_clears_modes() {
        let mut h = harness();
        start_playback(&h);
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.is_extended_mode_in_effect());

        h.analyzer.notifier().notify_video_state(false, false);
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], false),
            display(vec![video(Rect::sized(1920, 1080))], false),
        ];
        h.analyzer.analyze(&mut displays);

        assert!(!h.analyzer.is_video_playing());
        assert!(!h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_preparing_keeps_overlay_allowed() {
        let mut h = harness();
        h.analyzer.notifier().notify_video_state(true, false);
        h.analyzer.analyze(&mut vec![display(vec![], false)]);

        assert!(h.analyzer.state().video_preparing);
        assert!(h.analyzer.is_overlay_use_allowed());
    }

    #[test]
    fn test_hotplug_paths() {
        let mut h = harness();
        let notifier = h.analyzer.notifier();

        notifier.notify_hotplug(false);
        assert_eq!(h.vsync_resets.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.pending_events(), 0);

        notifier.notify_hotplug(true);
        assert_eq!(h.vsync_resets.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.pending_events(), 1);
        assert_eq!(h.recompositions.load(Ordering::SeqCst), 1);

        h.analyzer.analyze(&mut vec![display(vec![], false)]);
        assert_eq!(h.vsync_resets.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.pending_events(), 0);
    }

    #[test]
    fn test_runtime_toggle_disables_detection() {
        let mut h = harness();
        h.properties.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        assert!(!h.analyzer.is_extended_mode_support_enabled());

        start_playback(&h);
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.is_extended_mode_in_effect());

        h.properties.set(PROP_VIDEO_EXTMODE_ENABLE, "1");
        assert!(h.analyzer.is_extended_mode_support_enabled());
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_disabled_support_clears_sticky_decision() {
        let mut h = harness();
        start_playback(&h);
        let mut displays = vec![
            display(vec![video(Rect::sized(1920, 1080))], true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.is_extended_mode_in_effect());

        h.properties.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        assert!(!h.analyzer.is_extended_mode_support_enabled());
        h.analyzer.notifier().notify_video_state(false, false);

        let mut displays = vec![display(vec![video(Rect::sized(1920, 1080))], false), None];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.is_video_playing());
        assert!(!h.analyzer.is_extended_mode_in_effect());
        assert!(!h.analyzer.state().video_extended_mode);
        assert!(!h.analyzer.state().forced_clone_mode);
    }

    #[test]
    fn test_cleared_property_reenables_support() {
        let mut h = harness();
        h.properties.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        assert!(!h.analyzer.is_extended_mode_support_enabled());

        h.properties.remove(PROP_VIDEO_EXTMODE_ENABLE);
        assert!(h.analyzer.is_extended_mode_support_enabled());

        h.properties.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        h.analyzer.initialize();
        assert!(!h.analyzer.state().extended_mode_support);
        h.properties.remove(PROP_VIDEO_EXTMODE_ENABLE);
        h.analyzer.initialize();
        assert!(h.analyzer.state().extended_mode_support);
    }

    #[test]
    fn test_deinitialized_analyzer_does_nothing() {
        let mut h = harness();
        let notifier = h.analyzer.notifier();
        notifier.notify_blank(true);
        h.analyzer.deinitialize();
        assert!(!h.analyzer.is_initialized());
        assert_eq!(notifier.pending_events(), 0);

        notifier.notify_blank(true);
        let mut displays = vec![display(vec![], false), display(vec![video(Rect::sized(10, 10))], false)];
        h.analyzer.analyze(&mut displays);
        assert!(!h.analyzer.state().blank_secondary);
        assert_eq!(notifier.pending_events(), 1);

        h.analyzer.initialize();
        assert_eq!(notifier.pending_events(), 0);
        assert!(h.analyzer.is_overlay_use_allowed());
    }

    #[test]
    fn test_over_capacity_frame_still_analyzed() {
        let mut h = harness();
        start_playback(&h);
        let mut primary = vec![video(Rect::sized(1920, 1080))];
        primary.extend((0..30).map(|_| Layer::new(UI, Rect::sized(10, 10))));

        let mut displays = vec![
            display(primary, true),
            display(vec![video(Rect::sized(1920, 1080))], true),
        ];
        h.analyzer.analyze(&mut displays);
        assert!(h.analyzer.is_extended_mode_in_effect());
    }

    #[test]
    fn test_dump_mentions_state() {
        let h = harness();
        h.analyzer.notifier().notify_video_state(false, true);
        let dump = h.analyzer.dump();
        assert!(dump.contains("initialized: true"));
        assert!(dump.contains("pending events:        1"));
        assert!(dump.contains("overlay allowed:       true"));
    }
}
