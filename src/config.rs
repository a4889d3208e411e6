//! Analyzer configuration
//!
//! Two layers: static settings loaded once from a TOML file
//! ([`AnalyzerConfig`]), and runtime properties re-read on demand through a
//! [`PropertySource`] so diagnostics can flip features on a running system.

use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Runtime switch for video extended mode
pub const PROP_VIDEO_EXTMODE_ENABLE: &str = "hwc.video.extmode.enable";

/// Value `hwc.video.extmode.enable` reads as when it is not set
pub const PROP_VIDEO_EXTMODE_DEFAULT: &str = "1";

/// Per-frame layer capacity of the display commit path
pub const DEFAULT_MAX_LAYERS: usize = 20;

/// Key/value system properties
pub trait PropertySource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Properties backed by environment variables
///
/// `hwc.video.extmode.enable` is read from `HWC_VIDEO_EXTMODE_ENABLE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl EnvProperties {
    pub fn env_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl PropertySource for EnvProperties {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_name(key)).ok()
    }
}

/// In-memory properties that can be changed at runtime
#[derive(Debug, Default)]
pub struct StaticProperties {
    values: Mutex<HashMap<String, String>>,
}

impl StaticProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl PropertySource for StaticProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

/// Read a numeric boolean property: non-zero is true, garbage is false.
///
/// An unset property reads as `default`. An empty one leaves `current`
/// untouched.
pub fn property_flag(source: &dyn PropertySource, key: &str, default: &str, current: bool) -> bool {
    match source.get(key) {
        None => leading_int(default) != 0,
        Some(value) if value.is_empty() => current,
        Some(value) => leading_int(&value) != 0,
    }
}

/// Integer prefix of a string, 0 if there is none
fn leading_int(value: &str) -> i64 {
    let value = value.trim_start();
    let (sign, digits) = match value.as_bytes().first() {
        Some(b'-') => (-1, &value[1..]),
        Some(b'+') => (1, &value[1..]),
        _ => (1, value),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

/// Static analyzer settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Initial extended mode switch, kept when the runtime property is set
    /// but empty
    pub video_extended_mode: bool,
    /// Layers per display the commit path accepts in one frame
    pub max_layers_per_display: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            video_extended_mode: true,
            max_layers_per_display: DEFAULT_MAX_LAYERS,
        }
    }
}

impl AnalyzerConfig {
    /// Load from a TOML file; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No analyzer config, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        info!(path = %path.display(), ?config, "Loaded analyzer config");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        if config.max_layers_per_display == 0 {
            return Err(crate::Error::Config(
                "max_layers_per_display must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(props: &StaticProperties, current: bool) -> bool {
        property_flag(props, PROP_VIDEO_EXTMODE_ENABLE, PROP_VIDEO_EXTMODE_DEFAULT, current)
    }

    #[test]
    fn test_property_flag_atoi() {
        let props = StaticProperties::new();
        assert!(flag(&props, true));
        assert!(flag(&props, false));

        props.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        assert!(!flag(&props, true));

        props.set(PROP_VIDEO_EXTMODE_ENABLE, "1");
        assert!(flag(&props, false));

        props.set(PROP_VIDEO_EXTMODE_ENABLE, " 2abc");
        assert!(flag(&props, false));

        props.set(PROP_VIDEO_EXTMODE_ENABLE, "yes");
        assert!(!flag(&props, true));
    }

    #[test]
    fn test_property_flag_unset_reads_default() {
        let props = StaticProperties::new();
        props.set(PROP_VIDEO_EXTMODE_ENABLE, "0");
        let current = flag(&props, true);
        assert!(!current);

        props.remove(PROP_VIDEO_EXTMODE_ENABLE);
        assert!(flag(&props, current));
        assert!(!property_flag(&props, PROP_VIDEO_EXTMODE_ENABLE, "0", true));
    }

    #[test]
    fn test_property_flag_empty_keeps_current() {
        let props = StaticProperties::new();
        props.set(PROP_VIDEO_EXTMODE_ENABLE, "");
        assert!(!flag(&props, false));
        assert!(flag(&props, true));
    }

    #[test]
    fn test_env_name() {
        assert_eq!(
            EnvProperties::env_name(PROP_VIDEO_EXTMODE_ENABLE),
            "HWC_VIDEO_EXTMODE_ENABLE"
        );
    }

    #[test]
    fn test_parse_config() {
        let config = AnalyzerConfig::parse("max_layers_per_display = 8").unwrap();
        assert!(config.video_extended_mode);
        assert_eq!(config.max_layers_per_display, 8);

        assert_eq!(AnalyzerConfig::parse("").unwrap(), AnalyzerConfig::default());
        assert!(AnalyzerConfig::parse("max_layers_per_display = 0").is_err());
        assert!(AnalyzerConfig::parse("video_extended_mode = \"on\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let config = AnalyzerConfig::load(Path::new("/nonexistent/analyzer.toml")).unwrap();
        assert_eq!(config, AnalyzerConfig::default());
    }
}
