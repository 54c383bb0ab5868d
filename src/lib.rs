//! Core library for the camera_ctrl application.
//!
//! A camera is driven by a [`CameraActor`](camera_actor::CameraActor): a
//! dedicated worker thread that exclusively owns one device adapter and
//! serves a small command vocabulary. Frames, diagnostics and faults flow
//! back over bounded channels, so a slow consumer can never stall the
//! acquisition loop.
//!
//! Three adapters are provided: a simulated noise source and two physical
//! sensor families, which fall back to placeholders when no device is
//! present.

pub mod adapters;
pub mod camera_actor;
pub mod channels;
pub mod config;
pub mod error;
pub mod frame;
pub mod messages;
pub mod supervisor;

pub use adapters::{CameraKind, DeviceAdapter};
pub use camera_actor::{CameraActor, CameraHandle};
pub use channels::CallerEnds;
pub use config::Settings;
pub use error::{CameraError, DeviceError};
pub use frame::{Frame, ImageItem, Pixels};
pub use messages::{ActorState, Command, Diagnostic};
