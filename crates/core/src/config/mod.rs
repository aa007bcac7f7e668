use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Smallest analysis window accepted by [`AnalyzerConfig::validate`].
pub const MIN_WINDOW_SIZE: usize = 32;
/// Largest analysis window accepted by [`AnalyzerConfig::validate`].
pub const MAX_WINDOW_SIZE: usize = 32_768;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.analyzer.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// Parameters of the signal analyzer.
///
/// `min_level_db` and `max_level_db` bound the decibel range that is mapped
/// onto the normalised `[0, 1]` frequency buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_level")]
    pub min_level_db: f32,
    #[serde(default = "default_max_level")]
    pub max_level_db: f32,
}

impl AnalyzerConfig {
    pub fn new(window_size: usize, smoothing: f32, min_level_db: f32, max_level_db: f32) -> Self {
        Self {
            window_size,
            smoothing,
            min_level_db,
            max_level_db,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.window_size.is_power_of_two()
            || !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size)
        {
            return Err(VisualiserError::config(format!(
                "window size {} must be a power of two between {MIN_WINDOW_SIZE} and {MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }

        if !self.smoothing.is_finite() || !(0.0..1.0).contains(&self.smoothing) {
            return Err(VisualiserError::config(format!(
                "smoothing {} must lie in [0, 1)",
                self.smoothing
            )));
        }

        if !self.min_level_db.is_finite()
            || !self.max_level_db.is_finite()
            || self.min_level_db >= self.max_level_db
        {
            return Err(VisualiserError::config(format!(
                "level range [{}, {}] dB is empty",
                self.min_level_db, self.max_level_db
            )));
        }

        Ok(())
    }

    /// Number of frequency bins produced for this window.
    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            smoothing: default_smoothing(),
            min_level_db: default_min_level(),
            max_level_db: default_max_level(),
        }
    }
}

/// Initial pixel dimensions of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_variant")]
    pub default_variant: String,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_variant: default_variant(),
            frame_rate: default_frame_rate(),
        }
    }
}

fn default_window_size() -> usize {
    2048
}

fn default_smoothing() -> f32 {
    0.8
}

fn default_min_level() -> f32 {
    -100.0
}

fn default_max_level() -> f32 {
    -30.0
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    400
}

fn default_variant() -> String {
    "spectrum".to_string()
}

fn default_frame_rate() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_supported_window() {
        let mut size = MIN_WINDOW_SIZE;
        while size <= MAX_WINDOW_SIZE {
            let config = AnalyzerConfig::new(size, 0.5, -100.0, -30.0);
            assert!(config.validate().is_ok(), "window {size} rejected");
            size *= 2;
        }
    }

    #[test]
    fn rejects_bad_windows_and_smoothing() {
        for size in [0, 16, 1000, 65_536] {
            let config = AnalyzerConfig::new(size, 0.5, -100.0, -30.0);
            assert!(matches!(config.validate(), Err(VisualiserError::Config(_))));
        }

        for smoothing in [-0.1, 1.0, f32::NAN] {
            let config = AnalyzerConfig::new(2048, smoothing, -100.0, -30.0);
            assert!(config.validate().is_err());
        }

        let inverted = AnalyzerConfig::new(2048, 0.5, -30.0, -100.0);
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn fills_missing_fields_with_defaults() {
        let config = AppConfig::from_json_str(r#"{ "analyzer": { "window_size": 512 } }"#).unwrap();
        assert_eq!(config.analyzer.window_size, 512);
        assert_eq!(config.analyzer.smoothing, 0.8);
        assert_eq!(config.surface, SurfaceConfig::default());
        assert_eq!(config.engine.default_variant, "spectrum");
    }

    #[test]
    fn json_with_invalid_analyzer_is_rejected() {
        let err = AppConfig::from_json_str(r#"{ "analyzer": { "window_size": 300 } }"#).unwrap_err();
        assert!(matches!(err, VisualiserError::Config(_)));
    }
}
