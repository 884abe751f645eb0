// crates/playbridge-ui/src/config.rs
//
// ElementConfig: everything a MediaElement needs at construction. Passed in
// explicitly; there is no global registration or style lookup.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use playbridge_core::frame::DEFAULT_DPI;
use playbridge_core::{MediaPlaybackState, Stretch, StretchDirection};

pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    /// Period of the flush pump. Values below 1 ms are raised to 1 ms.
    pub flush_interval_ms: u64,
    pub dpi_x:             f64,
    pub dpi_y:             f64,
    pub loaded_behavior:   MediaPlaybackState,
    pub unloaded_behavior: MediaPlaybackState,
    pub looping_behavior:  MediaPlaybackState,
    pub scrubbing_enabled: bool,
    pub stretch:           Stretch,
    pub stretch_direction: StretchDirection,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            dpi_x:             DEFAULT_DPI,
            dpi_y:             DEFAULT_DPI,
            loaded_behavior:   MediaPlaybackState::Manual,
            unloaded_behavior: MediaPlaybackState::Close,
            looping_behavior:  MediaPlaybackState::Pause,
            scrubbing_enabled: true,
            stretch:           Stretch::Uniform,
            stretch_direction: StretchDirection::Both,
        }
    }
}

impl ElementConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// DPI with non-positive or non-finite values replaced by the default.
    pub fn dpi(&self) -> (f64, f64) {
        let sane = |d: f64| if d.is_finite() && d > 0.0 { d } else { DEFAULT_DPI };
        (sane(self.dpi_x), sane(self.dpi_y))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing element config")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing element config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("writing {}", path.display()))
    }
}
