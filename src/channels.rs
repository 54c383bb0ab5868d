//! The four bounded channels between the caller and the camera actor, and
//! the backpressure policy the actor applies to each of them.
//!
//! | Channel | Direction | Producers / consumers | When full |
//! |---|---|---|---|
//! | Commands | caller → actor | many / one | caller sees [`CameraError::CommandsFull`] |
//! | Images | actor → caller | one / many | streamed: dropped, snapped: bounded wait |
//! | Diagnostics | actor → caller | one / one | dropped; Ready and Closed transitions wait one tick first |
//! | Faults | actor → caller | one / one | bounded wait of one tick, then dropped |
//!
//! Images is a work-sharing queue: with several readers each item reaches
//! exactly one of them, so readers must not assume they see every frame.

use crate::config::ChannelConfig;
use crate::error::CameraError;
use crate::frame::ImageItem;
use crate::messages::{ActorState, Command, Diagnostic};
use flume::{Receiver, SendTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Outcome of pushing an item to the Images channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for a reader
    Sent,
    /// Channel full; the item was discarded
    Dropped,
    /// No reader left, or the actor already released the channel
    Closed,
}

/// Caller-side ends of the channels.
#[derive(Debug, Clone)]
pub struct CallerEnds {
    /// Push commands to the actor
    pub commands: Sender<Command>,
    /// Frames and placeholders
    pub images: Receiver<ImageItem>,
    /// Advisory lines
    pub diagnostics: Receiver<Diagnostic>,
    /// Terminal errors; receipt ends the session
    pub faults: Receiver<CameraError>,
}

/// Actor-side ends of the channels.
#[derive(Debug)]
pub struct ActorEnds {
    commands: Receiver<Command>,
    images: Option<Sender<ImageItem>>,
    diagnostics: Sender<Diagnostic>,
    faults: Sender<CameraError>,
    wait: Duration,
}

/// Create the four bounded channels.
pub fn bounded(config: &ChannelConfig) -> (CallerEnds, ActorEnds) {
    let (command_tx, command_rx) = flume::bounded(config.commands.max(1));
    let (image_tx, image_rx) = flume::bounded(config.images.max(1));
    let (diagnostic_tx, diagnostic_rx) = flume::bounded(config.diagnostics.max(1));
    let (fault_tx, fault_rx) = flume::bounded(config.faults.max(1));

    (
        CallerEnds {
            commands: command_tx,
            images: image_rx,
            diagnostics: diagnostic_rx,
            faults: fault_rx,
        },
        ActorEnds {
            commands: command_rx,
            images: Some(image_tx),
            diagnostics: diagnostic_tx,
            faults: fault_tx,
            wait: Duration::from_millis(25),
        },
    )
}

impl ActorEnds {
    /// How long a fault or transition line may wait for room before it is dropped.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Receiving end of the Commands channel.
    pub fn commands(&self) -> &Receiver<Command> {
        &self.commands
    }

    /// Push a streamed item without blocking; a full queue drops it.
    pub fn push_streamed(&self, item: ImageItem) -> Delivery {
        let Some(images) = &self.images else {
            return Delivery::Closed;
        };
        match images.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Disconnected(_)) => Delivery::Closed,
        }
    }

    /// Push a snapped item, waiting up to `timeout` for room.
    pub fn push_snapped(&self, item: ImageItem, timeout: Duration) -> Delivery {
        let Some(images) = &self.images else {
            return Delivery::Closed;
        };
        match images.send_timeout(item, timeout) {
            Ok(()) => Delivery::Sent,
            Err(SendTimeoutError::Timeout(_)) => Delivery::Dropped,
            Err(SendTimeoutError::Disconnected(_)) => Delivery::Closed,
        }
    }

    /// Emit an advisory line; dropped if nobody is keeping up.
    pub fn diagnostic(&self, state: ActorState, text: impl Into<String>) {
        let _ = self.diagnostics.try_send(Diagnostic {
            state,
            text: text.into(),
        });
    }

    /// Emit a line announcing a state transition, waiting briefly for room
    /// before dropping it.
    pub fn transition(&self, state: ActorState, text: impl Into<String>) {
        let _ = self.diagnostics.send_timeout(
            Diagnostic {
                state,
                text: text.into(),
            },
            self.wait,
        );
    }

    /// Emit a fault, waiting briefly for room.
    pub fn fault(&self, error: CameraError) {
        let _ = self.faults.send_timeout(error, self.wait);
    }

    /// Stop accepting images: readers drain what is queued, then see the
    /// channel as disconnected.
    pub fn release_images(&mut self) {
        self.images = None;
    }
}
