//! Error types for the camera actor.
//!
//! Two layers of errors exist, mirroring the two sides of the actor boundary:
//!
//! - **`DeviceError`**: raised by a [`DeviceAdapter`](crate::adapters::DeviceAdapter)
//!   while talking to the sensor (or synthesizing a frame). Each variant maps to a
//!   [`Severity`] that the actor uses to decide whether to keep going, stop the
//!   live stream, or close the device.
//! - **`CameraError`**: what the caller sees. It is the payload of the Faults
//!   channel and the error type of [`CameraHandle`](crate::camera_actor::CameraHandle)
//!   operations.
//!
//! ## Severity
//!
//! - **`Transient`**: a single frame was lost. Streaming continues, a snap reports
//!   the loss through Diagnostics only.
//! - **`Recoverable`**: the current acquisition cannot continue, but the device is
//!   still usable. Streaming stops (Streaming → Ready) and one Fault is emitted.
//!   A snap failing this way closes the device like a fatal error.
//! - **`Fatal`**: the device or its driver failed, or the request can never
//!   succeed. The actor closes the device and emits a Fault.
//!
//! Channel-full conditions are never errors; they are handled by the backpressure
//! policy in [`channels`](crate::channels).

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results of adapter operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// How the actor reacts to a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One frame lost; keep going.
    Transient,
    /// Stop the current acquisition, keep the device open.
    Recoverable,
    /// Close the device.
    Fatal,
}

/// Errors raised by device adapters and their native drivers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Frame edge below the two-pixel minimum
    #[error("Specified height or width are less than 2 (requested {width}x{height})")]
    Dimension {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Driver buffer does not match the active region
    #[error("Frame buffer holds {actual} samples, expected {expected}")]
    BufferSize {
        /// Samples the active region needs
        expected: usize,
        /// Samples the driver returned
        actual: usize,
    },

    /// No sensor is attached or its SDK is missing
    #[error("No device available: {0}")]
    NoDevice(String),

    /// No image within the acquire timeout
    #[error("Timed out after {0:?} waiting for the device")]
    Timeout(Duration),

    /// A single frame went missing
    #[error("Frame lost: {0}")]
    FrameLost(String),

    /// The sensor went away
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Driver-level failure
    #[error("Driver error: {0}")]
    Driver(String),

    /// Used before `initialize`
    #[error("Device is not initialized")]
    NotInitialized,
}

impl DeviceError {
    /// Classify this error for the actor's recovery policy.
    pub fn severity(&self) -> Severity {
        match self {
            DeviceError::FrameLost(_) => Severity::Transient,
            DeviceError::Timeout(_) | DeviceError::NotInitialized | DeviceError::BufferSize { .. } => {
                Severity::Recoverable
            }
            DeviceError::Disconnected(_)
            | DeviceError::Driver(_)
            | DeviceError::Dimension { .. }
            | DeviceError::NoDevice(_) => Severity::Fatal,
        }
    }
}

/// Errors surfaced to the caller of the camera actor.
#[derive(Error, Debug)]
pub enum CameraError {
    /// Adapter failure
    #[error("Camera device error: {0}")]
    Device(#[from] DeviceError),

    /// The worker has exited
    #[error("Camera actor has stopped")]
    ActorStopped,

    /// Commands channel at capacity
    #[error("Command queue is full")]
    CommandsFull,

    /// Shutdown timed out; the worker is detached
    #[error("Camera worker did not finish within {0:?}")]
    Unresponsive(Duration),

    /// The worker thread panicked
    #[error("Camera worker panicked")]
    WorkerPanicked,

    /// The worker thread could not be started
    #[error("Failed to spawn camera worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised while loading or validating [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values out of range
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Errors raised when turning literal command text into a [`Command`](crate::messages::Command).
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// Text matches no command
    #[error("Unknown camera command: '{0}'")]
    Unknown(String),

    /// Wrong number of parameters
    #[error("Command '{command}' expects {expected} parameter(s), got {got}")]
    Payload {
        /// Command name
        command: String,
        /// Parameters it takes
        expected: usize,
        /// Parameters supplied
        got: usize,
    },
}
