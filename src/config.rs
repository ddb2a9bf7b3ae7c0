//! Configuration types for the sightsync client.

use crate::capture::Facing;
use crate::error::{Result, SightError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides [`DescriptionConfig::endpoint`].
pub const ENDPOINT_ENV: &str = "SIGHTSYNC_ENDPOINT";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SightConfig {
    /// Description backend connection.
    pub description: DescriptionConfig,
    /// Spoken UI narration.
    pub narration: NarrationConfig,
    /// Camera request parameters.
    pub camera: CameraConfig,
    /// Interaction behaviour toggles.
    pub behavior: BehaviorConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
}

/// Description backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionConfig {
    /// URL receiving the multipart `image` upload.
    pub endpoint: String,
    /// Health probe URL. Derived from `endpoint` (sibling `/health`) when `None`.
    pub health_endpoint: Option<String>,
    /// Request timeout in seconds. `None` keeps the transport default.
    pub timeout_secs: Option<u64>,
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/process".to_owned(),
            health_endpoint: None,
            timeout_secs: None,
        }
    }
}

impl DescriptionConfig {
    /// Resolve the health probe URL.
    #[must_use]
    pub fn health_url(&self) -> String {
        if let Some(ref url) = self.health_endpoint {
            return url.clone();
        }
        let trimmed = self.endpoint.trim_end_matches('/');
        match trimmed.rfind('/') {
            // Keep the scheme's `//` intact.
            Some(idx) if idx > trimmed.find("//").map_or(0, |i| i + 1) => {
                format!("{}/health", &trimmed[..idx])
            }
            _ => format!("{trimmed}/health"),
        }
    }
}

/// Delivery parameters for one narration style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePreset {
    /// Speaking rate multiplier (0.1–10.0, 1.0 = normal).
    pub rate: f32,
    /// Pitch (0.0–2.0, 1.0 = normal).
    pub pitch: f32,
    /// Volume (0.0–1.0).
    pub volume: f32,
}

impl Default for VoicePreset {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoicePreset {
    fn validate(&self, name: &str) -> Result<()> {
        if !(0.1..=10.0).contains(&self.rate) {
            return Err(SightError::Config(format!(
                "narration.{name}.rate must be within 0.1..=10.0 (got {})",
                self.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.pitch) {
            return Err(SightError::Config(format!(
                "narration.{name}.pitch must be within 0.0..=2.0 (got {})",
                self.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(SightError::Config(format!(
                "narration.{name}.volume must be within 0.0..=1.0 (got {})",
                self.volume
            )));
        }
        Ok(())
    }
}

/// Narration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Whether narration starts enabled.
    pub enabled: bool,
    /// Whether the pointer can hover (desktop). When false, hover events are
    /// ignored and only focus / long-press produce tooltip narration.
    pub hover_supported: bool,
    /// Preset for status narration.
    pub ambient: VoicePreset,
    /// Preset for hover/focus/long-press labels.
    pub tooltip: VoicePreset,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hover_supported: false,
            ambient: VoicePreset::default(),
            tooltip: VoicePreset {
                rate: 1.2,
                pitch: 1.0,
                volume: 0.9,
            },
        }
    }
}

/// Camera request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Facing requested when the user does not pick one.
    pub default_facing: Facing,
    /// Ideal frame width hint.
    pub ideal_width: u32,
    /// Ideal frame height hint.
    pub ideal_height: u32,
    /// JPEG quality used when encoding snapshots (1–100).
    pub snapshot_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            default_facing: Facing::Back,
            ideal_width: 1280,
            ideal_height: 720,
            snapshot_quality: 90,
        }
    }
}

/// Interaction behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Submit automatically after a capture or file selection.
    pub auto_submit: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self { auto_submit: true }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl SightConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SightError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SightError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` when given, else from the default path when it exists,
    /// else defaults. Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file is unreadable or the result is invalid.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIGHTSYNC_ENDPOINT` when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                self.description.endpoint = endpoint.to_owned();
            }
        }
    }

    /// Check value ranges and the endpoint scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.description.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(SightError::Config(format!(
                "description.endpoint must be an http(s) URL (got `{endpoint}`)"
            )));
        }
        if self.description.timeout_secs == Some(0) {
            return Err(SightError::Config(
                "description.timeout_secs must be > 0 when set".to_owned(),
            ));
        }
        self.narration.ambient.validate("ambient")?;
        self.narration.tooltip.validate("tooltip")?;
        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            return Err(SightError::Config(
                "camera.ideal_width and camera.ideal_height must be > 0".to_owned(),
            ));
        }
        if !(1..=100).contains(&self.camera.snapshot_quality) {
            return Err(SightError::Config(format!(
                "camera.snapshot_quality must be within 1..=100 (got {})",
                self.camera.snapshot_quality
            )));
        }
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sightsync/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sightsync").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sightsync")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sightsync-config/config.toml")
        }
    }
}
