//! Playback settings supplied by the host application.
//!
//! The windower only needs `window_size`; the remaining knobs are carried so a
//! host can keep one settings file for the whole playback surface. Files are
//! TOML or JSON, selected by extension.

use crate::{TraceError, TraceResult};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frames per cache window when nothing else is configured.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Playback knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackSettings {
    /// Frames per cache window (`cache` in host configs).
    #[serde(alias = "cache")]
    pub window_size: usize,
    /// Windows kept resident on each side of a cursor.
    pub neighborhood: usize,
    /// Playback rate in frames per second.
    pub speed: u32,
    /// Restart from frame 0 after the last frame.
    #[serde(alias = "loop")]
    pub loop_playback: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            neighborhood: 1,
            speed: 10,
            loop_playback: false,
        }
    }
}

impl PlaybackSettings {
    /// Load from `.toml` or `.json` and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        let settings: Self = match crate::io::ext_lower(path).as_deref() {
            Some("toml") => toml::from_str(&src).context("parse settings toml")?,
            Some("json") => serde_json::from_str(&src).context("parse settings json")?,
            other => {
                return Err(anyhow!(
                    "unsupported settings extension {:?} (supported: .toml, .json)",
                    other.unwrap_or("")
                ))
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the windower cannot work with.
    pub fn validate(&self) -> TraceResult<()> {
        if self.window_size == 0 {
            return Err(TraceError::InvalidSettings("window_size must be >= 1".into()));
        }
        if self.speed == 0 {
            return Err(TraceError::InvalidSettings("speed must be >= 1".into()));
        }
        Ok(())
    }
}
