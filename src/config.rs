//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional TOML file (e.g. `config/camera.toml`)
//! 3. Environment variables prefixed with `CAMCTRL_`
//!
//! # Environment Variable Overrides
//!
//! Sections and keys are separated by a double underscore:
//!
//! ```text
//! CAMCTRL_CAMERA__KIND=PCO
//! CAMCTRL_CAMERA__EXPOSURE_MS=20
//! CAMCTRL_CHANNELS__IMAGES=16
//! ```
//!
//! # Example
//!
//! ```no_run
//! use camera_ctrl::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(Some("config/camera.toml".as_ref()))?;
//!     println!("Camera: {} ({}x{})", settings.camera.kind, settings.camera.width, settings.camera.height);
//!     Ok(())
//! }
//! ```

use crate::adapters::CameraKind;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CAMCTRL_";

/// Smallest frame edge a camera is asked to produce.
pub const MIN_FRAME_EDGE: u32 = 2;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Device selection and acquisition parameters
    #[serde(default)]
    pub camera: CameraConfig,
    /// Channel capacities
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Loop cadence and timeouts
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Device selection and acquisition parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Which adapter to drive
    #[serde(default)]
    pub kind: CameraKind,
    /// Exposure time in milliseconds
    #[serde(default = "default_exposure_ms")]
    pub exposure_ms: f64,
    /// Requested frame width in pixels
    #[serde(default = "default_frame_edge")]
    pub width: u32,
    /// Requested frame height in pixels
    #[serde(default = "default_frame_edge")]
    pub height: u32,
}

/// Bounded channel capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Caller → actor commands
    #[serde(default = "default_small_capacity")]
    pub commands: usize,
    /// Actor → caller images
    #[serde(default = "default_images_capacity")]
    pub images: usize,
    /// Actor → caller diagnostics
    #[serde(default = "default_small_capacity")]
    pub diagnostics: usize,
    /// Actor → caller faults
    #[serde(default = "default_small_capacity")]
    pub faults: usize,
}

/// Loop cadence and timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Polling cadence of the command loop in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Longest a physical acquisition may block, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Snap results wait `exposure * factor` for room in the Images channel
    #[serde(default = "default_snap_timeout_factor")]
    pub snap_timeout_factor: f64,
    /// Period of the idle status report (0 disables it)
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// How long the caller waits for the worker to finish on shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_exposure_ms() -> f64 {
    100.0
}

fn default_frame_edge() -> u32 {
    100
}

fn default_small_capacity() -> usize {
    10
}

fn default_images_capacity() -> usize {
    40
}

fn default_tick_ms() -> u64 {
    25
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_snap_timeout_factor() -> f64 {
    10.0
}

fn default_status_interval_secs() -> u64 {
    300
}

fn default_shutdown_timeout_ms() -> u64 {
    3_000
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::default(),
            exposure_ms: default_exposure_ms(),
            width: default_frame_edge(),
            height: default_frame_edge(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            commands: default_small_capacity(),
            images: default_images_capacity(),
            diagnostics: default_small_capacity(),
            faults: default_small_capacity(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            snap_timeout_factor: default_snap_timeout_factor(),
            status_interval_secs: default_status_interval_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// Longest exposure accepted, one hour.
pub const MAX_EXPOSURE_MS: f64 = 3_600_000.0;

/// A camera cannot expose for zero (or negative) time; such requests become 1 ms.
/// Anything longer than [`MAX_EXPOSURE_MS`], infinity included, is capped.
pub fn coerce_exposure_ms(exposure_ms: f64) -> f64 {
    if exposure_ms > 0.0 {
        exposure_ms.min(MAX_EXPOSURE_MS)
    } else {
        1.0
    }
}

impl Settings {
    /// Figment with defaults, optional TOML file and `CAMCTRL_` env overrides.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    /// Extract and validate from an already assembled figment (lets callers
    /// merge their own providers, e.g. command-line overrides).
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the actor cannot run with; coerce those it can correct.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.camera.width < MIN_FRAME_EDGE || self.camera.height < MIN_FRAME_EDGE {
            return Err(ConfigError::Validation(format!(
                "Specified height or width are less than {MIN_FRAME_EDGE} (requested {}x{})",
                self.camera.width, self.camera.height
            )));
        }
        self.camera.exposure_ms = coerce_exposure_ms(self.camera.exposure_ms);

        let capacities = [
            ("commands", self.channels.commands),
            ("images", self.channels.images),
            ("diagnostics", self.channels.diagnostics),
            ("faults", self.channels.faults),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, capacity)| *capacity == 0) {
            return Err(ConfigError::Validation(format!(
                "Channel '{name}' must have a capacity of at least 1"
            )));
        }

        if self.timing.tick_ms == 0 {
            return Err(ConfigError::Validation("timing.tick_ms must be positive".into()));
        }
        if !(self.timing.snap_timeout_factor > 0.0) {
            self.timing.snap_timeout_factor = default_snap_timeout_factor();
        }
        Ok(())
    }
}

impl TimingConfig {
    /// Command loop cadence.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Bound on blocking physical acquisitions.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Idle status report period, if enabled.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    /// Shutdown wait bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.camera.kind, CameraKind::Simulated);
        assert_eq!(settings.channels.images, 40);
        assert_eq!(settings.channels.commands, 10);
        assert_eq!(settings.timing.tick(), Duration::from_millis(25));
    }

    #[test]
    #[serial]
    fn test_toml_file_and_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[camera]
kind = "PCO"
exposure_ms = 20.0
width = 640
height = 480

[channels]
images = 16
"#
        )
        .unwrap();

        std::env::set_var("CAMCTRL_CAMERA__HEIGHT", "240");
        let result = Settings::load(Some(file.path()));
        std::env::remove_var("CAMCTRL_CAMERA__HEIGHT");

        let settings = result.unwrap();
        assert_eq!(settings.camera.kind, CameraKind::Pco);
        assert_eq!(settings.camera.width, 640);
        assert_eq!(settings.camera.height, 240);
        assert_eq!(settings.channels.images, 16);
        assert_eq!(settings.channels.faults, 10);
    }

    #[test]
    fn test_validation_rejects_small_frames() {
        let mut settings = Settings::default();
        settings.camera.width = 1;
        assert!(matches!(settings.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_coerces_exposure() {
        let mut settings = Settings::default();
        settings.camera.exposure_ms = -3.0;
        settings.validate().unwrap();
        assert_eq!(settings.camera.exposure_ms, 1.0);

        assert_eq!(coerce_exposure_ms(0.0), 1.0);
        assert_eq!(coerce_exposure_ms(f64::NAN), 1.0);
        assert_eq!(coerce_exposure_ms(0.5), 0.5);
        assert_eq!(coerce_exposure_ms(f64::INFINITY), MAX_EXPOSURE_MS);
        assert_eq!(coerce_exposure_ms(1e300), MAX_EXPOSURE_MS);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut settings = Settings::default();
        settings.channels.diagnostics = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("diagnostics"));
    }
}
