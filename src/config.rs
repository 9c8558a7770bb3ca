use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::bands::BANDS;
use crate::analysis::envelope::{EnvelopeParams, BASELINE_DECAY_RATE};
use crate::analysis::state::DeviceProfile;

const MAX_SENSITIVITY: f32 = 5.0;
const MAX_GLOBAL_SCALE: f32 = 5.0;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub profile: DeviceProfile,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub octaves: bool,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_bpm_timeout")]
    pub bpm_timeout_secs: u64,
    #[serde(default = "default_separation_timeout")]
    pub separation_timeout_secs: u64,
}

/// User-facing knobs, read every frame and never written by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tuning {
    #[serde(default)]
    pub sensitivity: BandSensitivity,
    #[serde(default = "default_global_scale")]
    pub global_scale: f32,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSensitivity {
    #[serde(default = "default_sub")]
    pub sub: f32,
    #[serde(default = "default_bass")]
    pub bass: f32,
    #[serde(default = "default_low_mid")]
    pub low_mid: f32,
    #[serde(default = "default_mid")]
    pub mid: f32,
    #[serde(default = "default_upper_mid")]
    pub upper_mid: f32,
    #[serde(default = "default_presence")]
    pub presence: f32,
    #[serde(default = "default_brilliance")]
    pub brilliance: f32,
}

impl BandSensitivity {
    /// Sensitivity for a band index in `BANDS` order.
    pub fn get(&self, band: usize) -> f32 {
        match band {
            0 => self.sub,
            1 => self.bass,
            2 => self.low_mid,
            3 => self.mid,
            4 => self.upper_mid,
            5 => self.presence,
            6 => self.brilliance,
            _ => 1.0,
        }
    }
}

impl Tuning {
    /// Combined gain for a band, clamped into a usable range.
    pub fn band_sensitivity(&self, band: usize) -> f32 {
        clamp_knob(self.sensitivity.get(band), MAX_SENSITIVITY) * self.scale()
    }

    pub fn scale(&self) -> f32 {
        clamp_knob(self.global_scale, MAX_GLOBAL_SCALE)
    }

    /// Envelope parameters for one of the seven bands.
    pub fn band_params(&self, band: usize) -> EnvelopeParams {
        let b = &BANDS[band.min(BANDS.len() - 1)];
        EnvelopeParams::new(self.band_sensitivity(band), b.attack, b.release, self.decay_rate())
    }

    pub fn decay_rate(&self) -> f32 {
        if self.decay_rate.is_finite() {
            self.decay_rate
        } else {
            BASELINE_DECAY_RATE
        }
    }
}

fn clamp_knob(value: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        1.0
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            profile: DeviceProfile::default(),
            fps: default_fps(),
            octaves: false,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            bpm_timeout_secs: default_bpm_timeout(),
            separation_timeout_secs: default_separation_timeout(),
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sensitivity: BandSensitivity::default(),
            global_scale: default_global_scale(),
            decay_rate: default_decay_rate(),
        }
    }
}

impl Default for BandSensitivity {
    fn default() -> Self {
        Self {
            sub: default_sub(),
            bass: default_bass(),
            low_mid: default_low_mid(),
            mid: default_mid(),
            upper_mid: default_upper_mid(),
            presence: default_presence(),
            brilliance: default_brilliance(),
        }
    }
}

fn default_fps() -> u32 { 60 }
fn default_bpm_timeout() -> u64 { 30 }
fn default_separation_timeout() -> u64 { 300 }
fn default_global_scale() -> f32 { 1.0 }
fn default_decay_rate() -> f32 { BASELINE_DECAY_RATE }
fn default_sub() -> f32 { BANDS[0].sensitivity }
fn default_bass() -> f32 { BANDS[1].sensitivity }
fn default_low_mid() -> f32 { BANDS[2].sensitivity }
fn default_mid() -> f32 { BANDS[3].sensitivity }
fn default_upper_mid() -> f32 { BANDS[4].sensitivity }
fn default_presence() -> f32 { BANDS[5].sensitivity }
fn default_brilliance() -> f32 { BANDS[6].sensitivity }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Explicit path, else `beatscope.toml` in the working directory, else the
/// user's XDG or platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("beatscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
