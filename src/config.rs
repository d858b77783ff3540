//! Analysis configuration.
//!
//! Passed explicitly to every detector call; there is no global config.
//! Values can come from a TOML file and be overridden from the CLI.
//!
//! ```toml
//! [analysis]
//! similarity_threshold = 85
//! audio_threshold = 0.05
//!
//! [cache]
//! expiration_hours = 24
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{check_percent, DedupError, Result};

pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 85;
pub const DEFAULT_EXPIRATION_HOURS: u32 = 24;
pub const DEFAULT_AUDIO_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Integer percent, used by pairwise matching and clustering
    pub similarity_threshold: u32,
    /// Cache validity window in hours
    pub cache_expiration_hours: u32,
    /// Mean absolute descriptor difference below which two tracks are audio duplicates
    pub audio_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cache_expiration_hours: DEFAULT_EXPIRATION_HOURS,
            audio_threshold: DEFAULT_AUDIO_THRESHOLD,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    analysis: AnalysisSection,
    #[serde(default)]
    cache: CacheSection,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisSection {
    similarity_threshold: Option<u32>,
    audio_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    expiration_hours: Option<u32>,
}

impl AnalysisConfig {
    /// Parse TOML text; absent keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| DedupError::ConfigFile(e.to_string()))?;
        let defaults = Self::default();
        Ok(Self {
            similarity_threshold: file
                .analysis
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            cache_expiration_hours: file
                .cache
                .expiration_hours
                .unwrap_or(defaults.cache_expiration_hours),
            audio_threshold: file
                .analysis
                .audio_threshold
                .unwrap_or(defaults.audio_threshold),
        })
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        check_percent("similarity_threshold", self.similarity_threshold)?;
        check_expiration_hours(self.cache_expiration_hours)?;
        check_audio_threshold(self.audio_threshold)?;
        Ok(())
    }
}

pub(crate) fn check_expiration_hours(hours: u32) -> Result<()> {
    if hours == 0 {
        return Err(DedupError::InvalidConfiguration {
            parameter: "cache_expiration_hours",
            value: hours.to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(())
}

pub(crate) fn check_audio_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
        return Err(DedupError::InvalidConfiguration {
            parameter: "audio_threshold",
            value: threshold.to_string(),
            reason: "must be in (0, 1]",
        });
    }
    Ok(())
}
