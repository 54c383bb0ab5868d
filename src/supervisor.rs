//! Caller-side tasks consuming the actor's output channels.
//!
//! These run on the tokio runtime and are where camera activity turns into
//! log lines. The actor thread itself never logs.

use crate::error::CameraError;
use crate::frame::ImageItem;
use crate::messages::Diagnostic;
use flume::Receiver;
use tracing::{debug, error, info, trace};

/// Wait for the first fault.
///
/// Resolves to `None` when the actor exits without raising one. A fault is
/// fatal to the session, so callers typically shut the camera down as soon
/// as this resolves to `Some`.
pub async fn watch_faults(faults: Receiver<CameraError>) -> Option<CameraError> {
    match faults.recv_async().await {
        Ok(err) => {
            error!(error = %err, "Camera fault");
            Some(err)
        }
        Err(_) => {
            debug!("Fault channel closed");
            None
        }
    }
}

/// Forwards diagnostics to `tracing`.
///
/// Lines announcing whether a device came up are always logged at `info`;
/// the rest only when `verbose` is set, and at `debug` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsPrinter {
    verbose: bool,
}

impl DiagnosticsPrinter {
    /// Printer logging every line at `info` when `verbose` is set.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// True when `line` is logged at `info`.
    pub fn is_shown(&self, line: &Diagnostic) -> bool {
        self.verbose || line.is_startup_critical()
    }

    /// Drain `diagnostics` until the actor exits; returns the number of lines seen.
    pub async fn run(self, diagnostics: Receiver<Diagnostic>) -> usize {
        let mut seen = 0;
        while let Ok(line) = diagnostics.recv_async().await {
            seen += 1;
            if self.is_shown(&line) {
                info!(state = %line.state, "{}", line.text);
            } else {
                debug!(state = %line.state, "{}", line.text);
            }
        }
        seen
    }
}

/// What an image reader received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTally {
    /// Items carrying pixels
    pub frames: u64,
    /// Text stand-ins from cameras without a device
    pub placeholders: u64,
    /// `(height, width)` of the last frame
    pub last_shape: Option<(u32, u32)>,
}

/// Drain `images` until the actor releases the channel.
pub async fn count_images(images: Receiver<ImageItem>) -> ImageTally {
    let mut tally = ImageTally::default();
    while let Ok(item) = images.recv_async().await {
        match item {
            ImageItem::Frame(frame) => {
                trace!(frame = frame.frame_number, shape = ?frame.shape(), "Frame received");
                tally.frames += 1;
                tally.last_shape = Some(frame.shape());
            }
            ImageItem::Placeholder(text) => {
                trace!(%text, "Placeholder received");
                tally.placeholders += 1;
            }
        }
    }
    tally
}
