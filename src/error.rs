//! Error types for the display analyzer

use crate::layer::{BufferHandle, DisplaySlot};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to lock buffer {0}")]
    BufferLock(BufferHandle),

    #[error("mode info not available for {0:?} display")]
    ModeUnavailable(DisplaySlot),

    #[error("display {slot} has {count} layers, limit is {max}")]
    LayerLimit {
        slot: usize,
        count: usize,
        max: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
