//! Device adapter implementations
//!
//! This module contains the [`DeviceAdapter`] trait, the single interface the
//! camera actor drives, and its variants:
//!
//! - [`SimulatedCamera`]: uniform noise frames, no hardware.
//! - [`PcoCamera`]: sensors recording into an on-device fifo, read with
//!   explicit wait-for-frame semantics.
//! - [`IdsCamera`]: sensors writing into a memory-mapped image buffer that is
//!   polled for the latest frame.
//!
//! Adapters are created *inside* the actor's worker thread (see
//! [`AdapterFactory`]) and never leave it, so they do not need to be `Send`.
//! Both physical variants tolerate a missing device: `initialize` reports
//! [`Bounds::NoDevice`] and acquisitions return placeholders.

pub mod ids;
pub mod mock;
pub mod pco;
pub mod simulated;

pub use ids::{BufferDriver, IdsCamera};
pub use pco::{FifoDriver, PcoCamera, RecordMode};
pub use simulated::SimulatedCamera;

use crate::config::{CameraConfig, TimingConfig, MAX_EXPOSURE_MS};
use crate::error::DeviceResult;
use crate::frame::ImageItem;
use crate::messages::Roi;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which device adapter the actor drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraKind {
    /// Synthetic noise source
    #[default]
    #[serde(alias = "simulated", alias = "SIMULATED")]
    Simulated,
    /// Fifo-recording sensor family
    #[serde(rename = "PCO", alias = "Pco", alias = "pco")]
    Pco,
    /// Polled image-buffer sensor family
    #[serde(rename = "IDS", alias = "Ids", alias = "ids", alias = "IDS camera")]
    Ids,
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraKind::Simulated => "Simulated",
            CameraKind::Pco => "PCO",
            CameraKind::Ids => "IDS",
        })
    }
}

impl FromStr for CameraKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(CameraKind::Simulated),
            "pco" => Ok(CameraKind::Pco),
            "ids" | "ids camera" => Ok(CameraKind::Ids),
            other => Err(format!(
                "The specified type of the camera hasn't been implemented: '{other}'"
            )),
        }
    }
}

/// Result of opening a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounds {
    /// Device open; full sensor size
    Sensor {
        /// Full sensor width
        width: u32,
        /// Full sensor height
        height: u32,
    },
    /// No device; the adapter runs in degraded mode
    NoDevice {
        /// Why the device could not be opened
        reason: String,
    },
}

/// Status snapshot reported by devices that support it.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStatus {
    /// Health word as reported by the driver
    pub health: String,
    /// Acquisition mode
    pub acquire_mode: String,
    /// Trigger mode
    pub trigger_mode: String,
    /// Current frame rate
    pub frame_rate_hz: f64,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "health: {}, acquire mode: {}, trigger mode: {}, frame rate: {:.2} Hz",
            self.health, self.acquire_mode, self.trigger_mode, self.frame_rate_hz
        )
    }
}

/// Parameters every adapter is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Initial exposure in milliseconds
    pub exposure_ms: f64,
    /// Bound on a single blocking acquisition
    pub acquire_timeout: Duration,
}

impl AdapterSettings {
    /// Settings from the camera and timing configuration sections.
    pub fn from_config(camera: &CameraConfig, timing: &TimingConfig) -> Self {
        Self {
            width: camera.width,
            height: camera.height,
            exposure_ms: camera.exposure_ms,
            acquire_timeout: timing.acquire_timeout(),
        }
    }
}

/// Builds an adapter on the worker thread.
pub type AdapterFactory = Box<dyn FnOnce() -> Box<dyn DeviceAdapter> + Send>;

/// The polymorphic boundary between the actor and a sensor.
///
/// Methods are called from the actor's worker thread only.
pub trait DeviceAdapter {
    /// Variant tag
    fn kind(&self) -> CameraKind;

    /// Open the device. Physical variants fold every failure into
    /// [`Bounds::NoDevice`].
    fn initialize(&mut self) -> DeviceResult<Bounds>;

    /// Acquire a single image.
    fn acquire_one(&mut self) -> DeviceResult<ImageItem>;

    /// Prepare continuous acquisition.
    fn start_stream(&mut self) -> DeviceResult<()>;

    /// Next image of a running stream.
    fn acquire_streamed(&mut self) -> DeviceResult<ImageItem>;

    /// End continuous acquisition.
    fn stop_stream(&mut self) -> DeviceResult<()>;

    /// Apply an exposure (ms); returns the value the device actually uses.
    fn set_exposure(&mut self, exposure_ms: f64) -> DeviceResult<f64>;

    /// Restrict acquisition to `roi` (already clamped to the sensor).
    fn crop(&mut self, roi: Roi) -> DeviceResult<()>;

    /// Reset the active region to the full sensor.
    fn restore_full(&mut self) -> DeviceResult<()>;

    /// Change the sensor size. Only meaningful for synthetic sources.
    fn resize(&mut self, width: u32, height: u32) -> DeviceResult<bool> {
        let _ = (width, height);
        Ok(false)
    }

    /// Status snapshot, `None` when the variant cannot report one.
    fn status(&mut self) -> DeviceResult<Option<CameraStatus>> {
        Ok(None)
    }

    /// Full sensor size.
    fn sensor_size(&self) -> (u32, u32);

    /// Size of the frames currently produced.
    fn active_size(&self) -> (u32, u32);

    /// Pause between streamed frames for a given exposure.
    fn frame_interval(&self, exposure_ms: f64) -> Duration {
        exposure_interval(exposure_ms)
    }

    /// Release the device.
    fn close(&mut self) -> DeviceResult<()>;
}

/// Pacing for one exposure; values that do not fit a `Duration` count as zero
/// (negative, NaN) or as the longest accepted exposure.
pub fn exposure_interval(exposure_ms: f64) -> Duration {
    let exposure_ms = exposure_ms.max(0.0).min(MAX_EXPOSURE_MS);
    Duration::try_from_secs_f64(exposure_ms / 1000.0).unwrap_or(Duration::ZERO)
}

/// Factory for the adapter selected by `kind`, using the default native
/// connectors.
pub fn factory(kind: CameraKind, settings: AdapterSettings) -> AdapterFactory {
    match kind {
        CameraKind::Simulated => Box::new(move || Box::new(SimulatedCamera::new(&settings)) as Box<dyn DeviceAdapter>),
        CameraKind::Pco => Box::new(move || {
            Box::new(PcoCamera::new(&settings, pco::system_connector())) as Box<dyn DeviceAdapter>
        }),
        CameraKind::Ids => Box::new(move || {
            Box::new(IdsCamera::new(&settings, ids::system_connector())) as Box<dyn DeviceAdapter>
        }),
    }
}
