use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{render::Rgba, PlayerError, Result};

/// Top-level configuration structure for the engine and its host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyser: AnalyserConfig,
    pub radial: RadialConfig,
    pub meter: MeterConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        if !(0.0..=100.0).contains(&self.playback.initial_volume) {
            return Err(PlayerError::InvalidConfig(
                "initial volume must lie within 0..=100",
            ));
        }
        if !(self.radial.damping > 0.0 && self.radial.hue_spread > 0.0) {
            return Err(PlayerError::InvalidConfig(
                "radial damping and hue spread must be positive",
            ));
        }
        self.meter.validate()
    }
}

/// Configuration of the analysis node. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    /// Transform window size. The node exposes `fft_size / 2` bins.
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl AnalyserConfig {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32_768;

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(PlayerError::InvalidConfig(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(PlayerError::InvalidConfig(
                "smoothing time constant must lie within 0..=1",
            ));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(PlayerError::InvalidConfig(
                "min decibels must be below max decibels",
            ));
        }
        Ok(())
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Settings for the radial bloom visualiser and its primary surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialConfig {
    pub width: u32,
    pub height: u32,
    /// Divisor applied to the amplitude-derived radius so that a full-scale
    /// sample stays inside the surface.
    pub damping: f32,
    /// Fraction of the bin count over which the hue completes one full turn.
    pub hue_spread: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Default for RadialConfig {
    fn default() -> Self {
        Self {
            width: 296,
            height: 296,
            damping: 1.8,
            hue_spread: 0.7,
            saturation: 100.0,
            lightness: 65.0,
        }
    }
}

/// Settings for the bar meter visualiser and its secondary surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub width: u32,
    pub height: u32,
    pub bar_width: u32,
    pub gap: u32,
    pub cap_height: u32,
    pub cap_color: Rgba,
}

impl MeterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bar_width == 0 || self.bar_width.checked_add(self.gap).is_none() {
            return Err(PlayerError::InvalidConfig(
                "meter bar width must be positive and fit with its gap",
            ));
        }
        if !(0.0..=1.0).contains(&self.cap_color.a) {
            return Err(PlayerError::InvalidConfig("cap alpha must lie within 0..=1"));
        }
        Ok(())
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 250,
            bar_width: 10,
            gap: 2,
            cap_height: 2,
            cap_color: Rgba::new(255, 255, 255, 0.8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume applied when the controller is created, on the 0..100 scale.
    pub initial_volume: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 80.0,
        }
    }
}
