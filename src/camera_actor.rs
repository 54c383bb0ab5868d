//! Camera actor: one worker thread owning one device adapter.
//!
//! The worker is the only code that ever touches the adapter. Callers talk to
//! it through the four bounded channels in [`channels`](crate::channels) and
//! steer its lifetime through a [`CameraHandle`].
//!
//! ## Loops
//!
//! - **Idle** (Ready): wait for a command with the tick as timeout; on timeout
//!   run housekeeping (the periodic status report).
//! - **Streaming**: acquire, push with drop-on-full, then drain commands until
//!   the pacing deadline. A queued Stop or Close therefore takes effect within
//!   one frame interval.
//!
//! Both loops share one dispatch function, so every command means the same
//! thing in either state.
//!
//! ## Errors
//!
//! Adapter errors are classified by [`DeviceError::severity`]. Transient ones
//! only produce a diagnostic. Recoverable ones end a running stream and raise
//! a fault. Fatal ones close the device and raise a fault. A snap that fails
//! for any reason other than a lost frame also closes the device. The worker
//! itself never logs; everything it has to say goes through Diagnostics and
//! Faults.
//!
//! ## Example
//!
//! ```no_run
//! use camera_ctrl::camera_actor::CameraActor;
//! use camera_ctrl::config::Settings;
//! use camera_ctrl::messages::Command;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let (mut handle, ends) = CameraActor::spawn(&settings)?;
//!     handle.send(Command::SnapSingleImage)?;
//!     let image = ends.images.recv_timeout(Duration::from_secs(1))?;
//!     println!("{:?}", image.as_frame().map(|f| f.shape()));
//!     handle.shutdown(Duration::from_secs(3))?;
//!     Ok(())
//! }
//! ```

use crate::adapters::{self, AdapterFactory, AdapterSettings, Bounds, CameraKind, DeviceAdapter};
use crate::channels::{self, ActorEnds, CallerEnds, Delivery};
use crate::config::{coerce_exposure_ms, Settings, MIN_FRAME_EDGE};
use crate::error::{CameraError, DeviceError, Severity};
use crate::frame::ImageItem;
use crate::messages::{ActorState, Command, Roi};
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shortest time a snapped image waits for room in the Images channel.
pub const MIN_SNAP_WAIT: Duration = Duration::from_millis(250);

/// The worker-side state of one camera.
pub struct CameraActor {
    adapter: Box<dyn DeviceAdapter>,
    ends: ActorEnds,
    kind: CameraKind,
    state: ActorState,
    exposure_ms: f64,
    tick: Duration,
    snap_timeout_factor: f64,
    status_interval: Option<Duration>,
    last_status: Instant,
    snap_pending: bool,
    dropped_frames: u64,
}

impl CameraActor {
    /// Spawn a worker for the camera selected in `settings`.
    pub fn spawn(settings: &Settings) -> Result<(CameraHandle, CallerEnds), CameraError> {
        let adapter_settings = AdapterSettings::from_config(&settings.camera, &settings.timing);
        Self::spawn_with(settings, adapters::factory(settings.camera.kind, adapter_settings))
    }

    /// Spawn a worker whose adapter is built by `factory` on the worker
    /// thread.
    pub fn spawn_with(
        settings: &Settings,
        factory: AdapterFactory,
    ) -> Result<(CameraHandle, CallerEnds), CameraError> {
        let (caller, actor_ends) = channels::bounded(&settings.channels);
        let actor_ends = actor_ends.with_wait(settings.timing.tick());
        let (exit_tx, exit_rx) = flume::bounded::<()>(1);
        let kind = settings.camera.kind;
        let settings = settings.clone();

        let join = thread::Builder::new()
            .name(format!("camera-{kind}").to_lowercase())
            .spawn(move || {
                // Dropped last, after the actor, even when unwinding.
                let _exit = exit_tx;
                let adapter = factory();
                let mut actor = CameraActor::new(adapter, actor_ends, &settings);
                actor.run();
            })?;

        let handle = CameraHandle {
            kind,
            commands: caller.commands.clone(),
            exited: exit_rx,
            join: Some(join),
        };
        Ok((handle, caller))
    }

    fn new(adapter: Box<dyn DeviceAdapter>, ends: ActorEnds, settings: &Settings) -> Self {
        Self {
            kind: adapter.kind(),
            adapter,
            ends,
            state: ActorState::Uninitialized,
            exposure_ms: coerce_exposure_ms(settings.camera.exposure_ms),
            tick: settings.timing.tick(),
            snap_timeout_factor: settings.timing.snap_timeout_factor,
            status_interval: settings.timing.status_interval(),
            last_status: Instant::now(),
            snap_pending: false,
            dropped_frames: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorState {
        self.state
    }

    fn run(&mut self) {
        if !self.start() {
            return;
        }
        self.diagnostic(format!("{} camera worker has been launched", self.kind));

        while self.state != ActorState::Closed {
            if self.state == ActorState::Streaming {
                self.stream_step();
            } else {
                self.idle_step();
            }
        }
    }

    fn start(&mut self) -> bool {
        match self.adapter.initialize() {
            Ok(Bounds::Sensor { width, height }) => {
                self.state = ActorState::Ready;
                self.announce(format!(
                    "The {} camera initialized, sensor bounds {width}x{height}",
                    self.kind
                ));
                if let Ok(Some(status)) = self.adapter.status() {
                    self.diagnostic(format!("{} camera status: {status}", self.kind));
                }
                true
            }
            Ok(Bounds::NoDevice { reason }) => {
                self.state = ActorState::Ready;
                self.announce(format!(
                    "{} camera not available ({reason}), running without a device",
                    self.kind
                ));
                true
            }
            Err(err) => {
                self.diagnostic(format!("The {} camera could not be initialized: {err}", self.kind));
                self.close();
                self.ends.fault(err.into());
                false
            }
        }
    }

    fn idle_step(&mut self) {
        match self.ends.commands().recv_timeout(self.tick) {
            Ok(cmd) => self.dispatch(cmd),
            Err(RecvTimeoutError::Timeout) => self.housekeeping(),
            Err(RecvTimeoutError::Disconnected) => {
                self.diagnostic("Command channel closed");
                self.close();
            }
        }
    }

    fn stream_step(&mut self) {
        match self.adapter.acquire_streamed() {
            Ok(item) => {
                let delivery = if std::mem::take(&mut self.snap_pending) {
                    self.deliver_snapped(item)
                } else {
                    self.ends.push_streamed(item)
                };
                match delivery {
                    Delivery::Sent => {}
                    Delivery::Dropped => self.dropped_frames += 1,
                    Delivery::Closed => {
                        self.diagnostic("No image reader left, stopping the live stream");
                        self.leave_stream();
                        return;
                    }
                }
            }
            Err(err) => match err.severity() {
                Severity::Transient => self.diagnostic(format!("Live stream: {err}")),
                Severity::Recoverable => {
                    self.diagnostic(format!("Live stream interrupted: {err}"));
                    self.ends.fault(err.into());
                    self.leave_stream();
                    return;
                }
                Severity::Fatal => {
                    self.fail(err);
                    return;
                }
            },
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(self.adapter.frame_interval(self.exposure_ms))
            .unwrap_or(now);
        while let Some(cmd) = self.next_command(deadline) {
            self.dispatch(cmd);
            if self.state != ActorState::Streaming {
                return;
            }
        }
    }

    /// Next queued command, waiting until `deadline` at most.
    fn next_command(&mut self, deadline: Instant) -> Option<Command> {
        let received = match self.ends.commands().try_recv() {
            Ok(cmd) => Ok(cmd),
            Err(TryRecvError::Empty) => self.ends.commands().recv_deadline(deadline),
            Err(TryRecvError::Disconnected) => Err(RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.diagnostic("Command channel closed");
                self.close();
                None
            }
        }
    }

    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Close => {
                self.diagnostic(format!("Received '{}'", Command::Close));
                self.close();
            }
            Command::StartLiveStream => self.enter_stream(),
            Command::StopLiveStream => {
                if self.state == ActorState::Streaming {
                    self.leave_stream();
                } else {
                    self.diagnostic("Live stream is not running");
                }
            }
            Command::SnapSingleImage => self.snap(),
            Command::GetStatus => self.report_status(),
            Command::RestoreFullFrame => match self.adapter.restore_full() {
                Ok(()) => {
                    let (width, height) = self.adapter.active_size();
                    self.diagnostic(format!("Full frame restored: ({width}, {height})"));
                }
                Err(err) => self.report("restore the full frame", err),
            },
            Command::Crop(roi) => self.crop(roi),
            Command::SetExposure(exposure_ms) => self.set_exposure(exposure_ms),
            Command::ResizeSimulated { width, height } => self.resize(width, height),
            Command::Fault(err) => {
                self.diagnostic(format!("Closing the camera after a reported error: {err:#}"));
                self.close();
            }
        }
    }

    fn enter_stream(&mut self) {
        if self.state == ActorState::Streaming {
            self.diagnostic("Live stream is already running");
            return;
        }
        match self.adapter.start_stream() {
            Ok(()) => {
                self.state = ActorState::Streaming;
                self.dropped_frames = 0;
                self.diagnostic("Live stream started");
            }
            Err(err) => self.report("start the live stream", err),
        }
    }

    /// Back to Ready. A snap requested during the stream and not yet served
    /// is taken once the stream has stopped.
    fn leave_stream(&mut self) {
        self.state = ActorState::Ready;
        let snap_pending = std::mem::take(&mut self.snap_pending);
        match self.adapter.stop_stream() {
            Ok(()) => self.announce(format!(
                "Live stream stopped, {} frames dropped",
                self.dropped_frames
            )),
            Err(err) => self.report("stop the live stream", err),
        }
        if snap_pending && self.state == ActorState::Ready {
            self.snap();
        }
    }

    fn snap(&mut self) {
        if self.state == ActorState::Streaming {
            self.snap_pending = true;
            return;
        }
        match self.adapter.acquire_one() {
            Ok(item) => {
                self.deliver_snapped(item);
            }
            Err(err) if err.severity() == Severity::Transient => {
                self.diagnostic(format!("Failed to snap a single image: {err}"));
            }
            Err(err) => self.fail(err),
        }
    }

    fn deliver_snapped(&mut self, item: ImageItem) -> Delivery {
        let delivery = self.ends.push_snapped(item, self.snap_wait());
        match delivery {
            Delivery::Sent => self.diagnostic("Single image snap performed"),
            Delivery::Dropped => self.diagnostic("Images channel full, snapped image dropped"),
            Delivery::Closed => self.diagnostic("No image reader left, snapped image discarded"),
        }
        delivery
    }

    /// How long a snapped image may wait for room in the Images channel.
    fn snap_wait(&self) -> Duration {
        let millis = self.exposure_ms * self.snap_timeout_factor;
        Duration::try_from_secs_f64(millis / 1000.0)
            .unwrap_or(MIN_SNAP_WAIT)
            .max(MIN_SNAP_WAIT)
    }

    fn set_exposure(&mut self, exposure_ms: f64) {
        let requested = coerce_exposure_ms(exposure_ms);
        match self.adapter.set_exposure(requested) {
            Ok(applied) => {
                self.exposure_ms = applied;
                self.diagnostic(format!("The set exposure time ms: {}", format_exposure(applied)));
            }
            Err(err) => self.report("set the exposure time", err),
        }
    }

    fn crop(&mut self, roi: Roi) {
        let (max_width, max_height) = self.adapter.sensor_size();
        let roi = roi.clamped(max_width, max_height);
        match self.adapter.crop(roi) {
            Ok(()) => self.diagnostic(format!(
                "Crop coordinates: y={}, x={}, height={}, width={}",
                roi.y, roi.x, roi.height, roi.width
            )),
            Err(err) => self.report("crop the image", err),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let width = width.max(MIN_FRAME_EDGE);
        let height = height.max(MIN_FRAME_EDGE);
        match self.adapter.resize(width, height) {
            Ok(true) => self.diagnostic(format!("Simulated picture size set to ({width}, {height})")),
            Ok(false) => self.diagnostic(format!(
                "Changing the picture size is not supported by the {} camera",
                self.kind
            )),
            Err(err) => self.report("change the picture size", err),
        }
    }

    fn report_status(&mut self) {
        match self.adapter.status() {
            Ok(Some(status)) => self.diagnostic(format!("{} camera status: {status}", self.kind)),
            Ok(None) => self.diagnostic(format!("The {} camera does not report a status", self.kind)),
            Err(err) => self.report("read the camera status", err),
        }
    }

    fn housekeeping(&mut self) {
        let Some(interval) = self.status_interval else {
            return;
        };
        if self.state != ActorState::Ready || self.last_status.elapsed() < interval {
            return;
        }
        self.last_status = Instant::now();
        match self.adapter.status() {
            Ok(Some(status)) => self.diagnostic(format!("{} camera status: {status}", self.kind)),
            Ok(None) => {}
            Err(err) => self.report("read the camera status", err),
        }
    }

    /// Diagnostic for an error outside the streaming loop; fatal errors close.
    fn report(&mut self, action: &str, err: DeviceError) {
        if err.severity() == Severity::Fatal {
            self.fail(err);
        } else {
            self.diagnostic(format!("Failed to {action}: {err}"));
        }
    }

    fn fail(&mut self, err: DeviceError) {
        self.diagnostic(format!("Camera error: {err}"));
        self.close();
        self.ends.fault(err.into());
    }

    fn close(&mut self) {
        if matches!(self.state, ActorState::Closing | ActorState::Closed) {
            return;
        }
        let was_streaming = self.state == ActorState::Streaming;
        self.state = ActorState::Closing;

        if was_streaming {
            if let Err(err) = self.adapter.stop_stream() {
                self.diagnostic(format!("Failed to stop the live stream: {err}"));
            }
        }
        if let Err(err) = self.adapter.close() {
            self.diagnostic(format!("Error while closing the {} camera: {err}", self.kind));
            self.ends.fault(err.into());
        }
        self.ends.release_images();
        self.state = ActorState::Closed;
        self.announce(format!("The {} camera is closed", self.kind));
    }

    fn diagnostic(&self, text: impl Into<String>) {
        self.ends.diagnostic(self.state, text);
    }

    /// Diagnostic for entering Ready or Closed; waits briefly rather than
    /// dropping.
    fn announce(&self, text: impl Into<String>) {
        self.ends.transition(self.state, text);
    }
}

impl Drop for CameraActor {
    fn drop(&mut self) {
        if self.state != ActorState::Closed {
            let _ = self.adapter.stop_stream();
            let _ = self.adapter.close();
        }
    }
}

/// Whole milliseconds from 1 ms up, three decimals below.
fn format_exposure(exposure_ms: f64) -> String {
    if exposure_ms >= 1.0 {
        format!("{exposure_ms:.0}")
    } else {
        format!("{exposure_ms:.3}")
    }
}

/// Caller-side control of a running camera worker.
#[derive(Debug)]
pub struct CameraHandle {
    kind: CameraKind,
    commands: Sender<Command>,
    exited: Receiver<()>,
    join: Option<JoinHandle<()>>,
}

impl CameraHandle {
    /// Camera variant the worker drives.
    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    /// Queue a command without blocking.
    pub fn send(&self, cmd: Command) -> Result<(), CameraError> {
        self.commands.try_send(cmd).map_err(|err| match err {
            TrySendError::Full(_) => CameraError::CommandsFull,
            TrySendError::Disconnected(_) => CameraError::ActorStopped,
        })
    }

    /// Another sender for the Commands channel.
    pub fn commands(&self) -> Sender<Command> {
        self.commands.clone()
    }

    /// Ask the worker to close. Closing a stopped worker is not an error.
    pub fn close(&self) -> Result<(), CameraError> {
        match self.send(Command::Close) {
            Err(CameraError::ActorStopped) => Ok(()),
            other => other,
        }
    }

    /// Close the camera and wait up to `timeout` for the worker to exit.
    ///
    /// A worker that does not finish in time is left running detached and
    /// [`CameraError::Unresponsive`] is returned.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), CameraError> {
        let deadline = Instant::now() + timeout;
        match self.commands.send_deadline(Command::Close, deadline) {
            Ok(()) | Err(flume::SendTimeoutError::Disconnected(_)) => {}
            Err(flume::SendTimeoutError::Timeout(_)) => return Err(CameraError::Unresponsive(timeout)),
        }

        match self.exited.recv_deadline(deadline) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.join(),
            Err(RecvTimeoutError::Timeout) => Err(CameraError::Unresponsive(timeout)),
        }
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn join(&mut self) -> Result<(), CameraError> {
        match self.join.take() {
            Some(join) => join.join().map_err(|_| CameraError::WorkerPanicked),
            None => Ok(()),
        }
    }
}
