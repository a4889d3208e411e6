//! Replays a scenario of frames and events through the display analyzer
//! and prints the decisions and rewritten layers after every frame

use anyhow::{Context, Result};
use clap::Parser;
use hwc_display_analyzer::collaborators::{BufferTable, StaticModes};
use hwc_display_analyzer::layer::{Blending, LayerFlags, Transform};
use hwc_display_analyzer::plane_caps::{self, PlaneType};
use hwc_display_analyzer::{
    AnalyzerConfig, BufferFormatLookup, BufferHandle, BufferInfo, Collaborators, CompositionType,
    DisplayAnalyzer, DisplayContent, DisplayMode, DisplaySlot, EnvProperties, Layer, PixelFormat,
    Rect, Stride,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay hwcomposer frames through the display analyzer", long_about = None)]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Analyzer config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the analyzer state after the last step
    #[arg(long)]
    dump: bool,

    /// Enable verbose debug output
    #[arg(short, long)]
    debug: bool,
}

#[derive(Deserialize, Debug)]
struct Scenario {
    #[serde(default)]
    modes: HashMap<DisplaySlot, DisplayMode>,
    #[serde(default)]
    buffers: Vec<BufferSpec>,
    steps: Vec<Step>,
}

#[derive(Deserialize, Debug)]
struct BufferSpec {
    handle: BufferHandle,
    format: PixelFormat,
    stride: Stride,
    #[serde(default)]
    protected: bool,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Step {
    Hotplug { connected: bool },
    Blank { blank: bool },
    VideoState { preparing: bool, playing: bool },
    Frame { displays: Vec<DisplaySpec> },
}

#[derive(Deserialize, Debug)]
struct DisplaySpec {
    slot: DisplaySlot,
    #[serde(default)]
    geometry_changed: bool,
    #[serde(default = "default_width")]
    width: i32,
    #[serde(default = "default_height")]
    height: i32,
    #[serde(default)]
    layers: Vec<LayerSpec>,
}

fn default_width() -> i32 {
    1920
}

fn default_height() -> i32 {
    1080
}

#[derive(Deserialize, Debug)]
struct LayerSpec {
    handle: Option<BufferHandle>,
    source_crop: Option<Rect>,
    display_frame: Rect,
    #[serde(default)]
    composition: CompositionType,
    #[serde(default)]
    transform: Transform,
    #[serde(default)]
    blending: Blending,
    #[serde(default)]
    flags: LayerFlags,
}

impl LayerSpec {
    fn to_layer(&self) -> Layer {
        let frame = self.display_frame;
        Layer {
            handle: self.handle,
            source_crop: self
                .source_crop
                .unwrap_or_else(|| frame.at_origin()),
            display_frame: frame,
            composition: self.composition,
            transform: self.transform,
            blending: self.blending,
            flags: self.flags,
            ..Layer::default()
        }
    }
}

fn build_displays(specs: &[DisplaySpec]) -> Vec<Option<DisplayContent>> {
    let slots = specs.iter().map(|d| d.slot.index() + 1).max().unwrap_or(0);
    let mut displays = vec![None; slots];
    for spec in specs {
        let mut layers: Vec<Layer> = spec.layers.iter().map(LayerSpec::to_layer).collect();
        layers.push(Layer::framebuffer_target(spec.width, spec.height));
        displays[spec.slot.index()] = Some(DisplayContent::new(layers, spec.geometry_changed));
    }
    displays
}

fn print_frame(
    index: usize,
    analyzer: &DisplayAnalyzer,
    displays: &[Option<DisplayContent>],
    buffers: &dyn BufferFormatLookup,
) {
    let state = analyzer.state();
    println!(
        "frame {}: extended_in_effect={} video_extended={} forced_clone={} blank={} playing={}",
        index,
        analyzer.is_extended_mode_in_effect(),
        state.video_extended_mode,
        state.forced_clone_mode,
        state.blank_secondary,
        state.video_playing,
    );

    for (slot, content) in displays.iter().enumerate() {
        let Some(content) = content else {
            continue;
        };
        println!("  display {} geometry_changed={}", slot, content.geometry_changed);
        for layer in content.content_layers() {
            let handle = layer
                .handle
                .map(|h| h.to_string())
                .unwrap_or_else(|| "none".to_string());
            let overlay_capable = layer
                .handle
                .and_then(|h| buffers.buffer_info(h).ok())
                .map(|info| plane_caps::is_supported(PlaneType::Overlay, layer, &info))
                .unwrap_or(false);
            println!(
                "    layer {} {:?} clear_fb={} skip={} overlay_capable={}",
                handle, layer.composition, layer.hints.clear_fb, layer.flags.skip, overlay_capable
            );
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "debug,hwc_display_analyzer=trace"
    } else {
        "warn,hwc_display_analyzer=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    let contents = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario: Scenario = toml::from_str(&contents)
        .with_context(|| format!("parsing scenario {}", args.scenario.display()))?;
    info!(steps = scenario.steps.len(), "Loaded scenario");

    let mut buffers = BufferTable::new();
    for spec in &scenario.buffers {
        buffers.insert(
            spec.handle,
            BufferInfo {
                format: spec.format,
                stride: spec.stride,
                protected: spec.protected,
            },
        );
    }
    let buffers = Arc::new(buffers);
    let modes = scenario
        .modes
        .iter()
        .fold(StaticModes::new(), |modes, (slot, mode)| modes.with(*slot, *mode));

    let collaborators = Collaborators {
        buffers: buffers.clone(),
        modes: Arc::new(modes),
        vsync: Arc::new(|| info!("Vsync source reset")),
        recomposer: Arc::new(|| debug!("Recomposition requested")),
    };

    let mut analyzer = DisplayAnalyzer::new(collaborators, Arc::new(EnvProperties), config);
    analyzer.is_extended_mode_support_enabled();
    let notifier = analyzer.notifier();

    let mut frames = 0;
    for step in &scenario.steps {
        match step {
            Step::Hotplug { connected } => notifier.notify_hotplug(*connected),
            Step::Blank { blank } => notifier.notify_blank(*blank),
            Step::VideoState { preparing, playing } => {
                notifier.notify_video_state(*preparing, *playing)
            }
            Step::Frame { displays } => {
                let mut displays = build_displays(displays);
                analyzer.analyze(&mut displays);
                print_frame(frames, &analyzer, &displays, buffers.as_ref());
                frames += 1;
            }
        }
    }

    if args.dump {
        println!("{}", analyzer.dump());
    }

    Ok(())
}
