//! Message types for actor-based camera control
//!
//! This module defines the commands accepted by the
//! [`CameraActor`](crate::camera_actor::CameraActor) and the diagnostics it
//! sends back. Commands form a closed set, so every dispatch site matches
//! them exhaustively.
//!
//! The literal command vocabulary used by operator front-ends is kept as the
//! textual form: bare names parse with [`str::parse`], named commands with
//! numeric payloads parse with [`Command::parameterized`].

use crate::error::CommandError;
use std::fmt;
use std::str::FromStr;

/// Accepted spellings of the close command (compared case-insensitively).
pub const CLOSE_SYNONYMS: [&str; 4] = ["Close the camera", "Stop", "Stop Program", "Close Camera"];

pub(crate) const START_LIVE_STREAM: &str = "Start Live Stream";
pub(crate) const STOP_LIVE_STREAM: &str = "Stop Live Stream";
pub(crate) const SNAP_SINGLE_IMAGE: &str = "Snap single image";
pub(crate) const RESTORE_FULL_FRAME: &str = "Restore Full Frame";
pub(crate) const CROP_IMAGE: &str = "Crop Image";
pub(crate) const SET_EXPOSURE_TIME: &str = "Set exposure time";
pub(crate) const RESIZE_SIMULATED: &str = "Change simulate picture sizes to:";

/// Rectangular region of interest, in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// Top-left row
    pub y: u32,
    /// Top-left column
    pub x: u32,
    /// Height in pixels
    pub height: u32,
    /// Width in pixels
    pub width: u32,
}

impl Roi {
    /// Region covering a whole sensor.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            y: 0,
            x: 0,
            height,
            width,
        }
    }

    /// Move and shrink this region until it lies inside a `max_width` x
    /// `max_height` sensor and is at least 2x2.
    pub fn clamped(self, max_width: u32, max_height: u32) -> Self {
        let max_width = max_width.max(2);
        let max_height = max_height.max(2);
        let width = self.width.clamp(2, max_width);
        let height = self.height.clamp(2, max_height);
        Self {
            x: self.x.min(max_width - width),
            y: self.y.min(max_height - height),
            width,
            height,
        }
    }
}

/// Commands that can be sent to the camera actor.
#[derive(Debug)]
pub enum Command {
    /// Close the device and stop the worker
    Close,

    /// Enter the live streaming loop
    StartLiveStream,

    /// Leave the live streaming loop
    StopLiveStream,

    /// Acquire one image and push it to the Images channel
    SnapSingleImage,

    /// Report a status snapshot through Diagnostics
    GetStatus,

    /// Reset the active region to the full sensor
    RestoreFullFrame,

    /// Restrict acquisition to a region of interest
    Crop(Roi),

    /// Exposure time in milliseconds
    SetExposure(f64),

    /// Change the size of synthesized frames (simulated camera only)
    ResizeSimulated {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },

    /// An error raised elsewhere in the application; the camera closes
    Fault(anyhow::Error),
}

impl Command {
    /// Build a command that carries numeric parameters.
    ///
    /// | name | payload |
    /// |---|---|
    /// | `"Crop Image"` | `[y, x, height, width]` |
    /// | `"Set exposure time"` | `[milliseconds]` |
    /// | `"Change simulate picture sizes to:"` | `[width, height]` |
    ///
    /// Negative or fractional pixel values are rounded and saturated at zero;
    /// the actor corrects undersized regions itself.
    pub fn parameterized(name: &str, payload: &[f64]) -> Result<Self, CommandError> {
        let expect = |expected: usize| {
            if payload.len() == expected {
                Ok(())
            } else {
                Err(CommandError::Payload {
                    command: name.to_string(),
                    expected,
                    got: payload.len(),
                })
            }
        };
        let px = |value: f64| value.round().max(0.0) as u32;

        match name {
            CROP_IMAGE => {
                expect(4)?;
                Ok(Command::Crop(Roi {
                    y: px(payload[0]),
                    x: px(payload[1]),
                    height: px(payload[2]),
                    width: px(payload[3]),
                }))
            }
            SET_EXPOSURE_TIME => {
                expect(1)?;
                Ok(Command::SetExposure(payload[0]))
            }
            RESIZE_SIMULATED => {
                expect(2)?;
                Ok(Command::ResizeSimulated {
                    width: px(payload[0]),
                    height: px(payload[1]),
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Wrap an application error as a fault command.
    pub fn fault(error: impl Into<anyhow::Error>) -> Self {
        Command::Fault(error.into())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if CLOSE_SYNONYMS
            .iter()
            .any(|synonym| synonym.eq_ignore_ascii_case(text))
        {
            return Ok(Command::Close);
        }

        match text {
            START_LIVE_STREAM => Ok(Command::StartLiveStream),
            STOP_LIVE_STREAM => Ok(Command::StopLiveStream),
            SNAP_SINGLE_IMAGE => Ok(Command::SnapSingleImage),
            RESTORE_FULL_FRAME => Ok(Command::RestoreFullFrame),
            _ => {
                // "Get the <device> camera status"
                let is_status = text
                    .strip_prefix("Get the ")
                    .and_then(|rest| rest.strip_suffix(" camera status"))
                    .is_some_and(|device| !device.trim().is_empty());
                if is_status {
                    Ok(Command::GetStatus)
                } else {
                    Err(CommandError::Unknown(text.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Close => f.write_str(CLOSE_SYNONYMS[0]),
            Command::StartLiveStream => f.write_str(START_LIVE_STREAM),
            Command::StopLiveStream => f.write_str(STOP_LIVE_STREAM),
            Command::SnapSingleImage => f.write_str(SNAP_SINGLE_IMAGE),
            Command::GetStatus => f.write_str("Get the camera status"),
            Command::RestoreFullFrame => f.write_str(RESTORE_FULL_FRAME),
            Command::Crop(roi) => write!(
                f,
                "{CROP_IMAGE} ({}, {}, {}, {})",
                roi.y, roi.x, roi.height, roi.width
            ),
            Command::SetExposure(ms) => write!(f, "{SET_EXPOSURE_TIME} {ms}"),
            Command::ResizeSimulated { width, height } => {
                write!(f, "{RESIZE_SIMULATED} ({width}, {height})")
            }
            Command::Fault(err) => write!(f, "Fault: {err}"),
        }
    }
}

/// Lifecycle state of the camera actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Worker started, device not opened yet
    Uninitialized,
    /// Device open (or degraded), waiting for commands
    Ready,
    /// Live stream running
    Streaming,
    /// Releasing the device
    Closing,
    /// Terminal; the worker is about to exit
    Closed,
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorState::Uninitialized => "uninitialized",
            ActorState::Ready => "ready",
            ActorState::Streaming => "streaming",
            ActorState::Closing => "closing",
            ActorState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A human-readable line from the actor, tagged with the state it was in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Actor state when the line was emitted
    pub state: ActorState,
    /// The message itself
    pub text: String,
}

impl Diagnostic {
    /// Lines that must survive log suppression: they announce that a device
    /// was (or was not) brought up.
    pub fn is_startup_critical(&self) -> bool {
        self.text.contains("initialized") || self.text.contains("available")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
