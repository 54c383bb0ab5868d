//! Adapter for sensors that record into an on-device fifo (PCO family).
//!
//! The native surface is the [`FifoDriver`] trait. Streaming arms a fifo
//! recording and then blocks in [`FifoDriver::wait_for_first_image`] for each
//! frame, so the driver itself paces the stream.
//!
//! Without a device the adapter synthesizes one fixed placeholder frame and
//! reuses it for every acquisition.

use super::{exposure_interval, AdapterSettings, Bounds, CameraKind, CameraStatus, DeviceAdapter};
use crate::error::{DeviceError, DeviceResult};
use crate::frame::{Frame, ImageItem, Pixels};
use crate::messages::Roi;
use std::time::Duration;

/// Number of images the fifo recorder keeps for live streaming.
pub const FIFO_DEPTH: usize = 100;

/// Recorder mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Record a fixed number of images, then stop
    Sequence,
    /// Ring buffer, oldest images overwritten
    Fifo,
}

/// Native API of a fifo-recording sensor.
///
/// Region coordinates are 1-based and inclusive, as the hardware expects.
pub trait FifoDriver {
    /// Full sensor size `(width, height)`.
    fn sensor_size(&mut self) -> DeviceResult<(u32, u32)>;
    /// Set exposure in seconds.
    fn set_exposure_s(&mut self, seconds: f64) -> DeviceResult<()>;
    /// Exposure in seconds as applied by the device.
    fn exposure_s(&mut self) -> DeviceResult<f64>;
    /// Arm the recorder.
    fn record(&mut self, images: usize, mode: RecordMode) -> DeviceResult<()>;
    /// Block until an image is available.
    fn wait_for_first_image(&mut self, timeout: Duration) -> DeviceResult<()>;
    /// Read the latest image as `(width, height, samples)`.
    fn image(&mut self) -> DeviceResult<(u32, u32, Vec<u16>)>;
    /// Stop the recorder.
    fn stop(&mut self) -> DeviceResult<()>;
    /// Set the readout region.
    fn set_roi(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> DeviceResult<()>;
    /// Health, acquire mode, trigger mode and frame rate.
    fn status(&mut self) -> DeviceResult<CameraStatus>;
    /// Release the device.
    fn close(&mut self) -> DeviceResult<()>;
}

/// Opens the native driver; runs on the worker thread.
pub type FifoConnector = Box<dyn FnOnce() -> DeviceResult<Box<dyn FifoDriver>> + Send>;

/// Connector for the vendor SDK. This build carries no SDK bindings, so it
/// always reports that no device is available.
pub fn system_connector() -> FifoConnector {
    Box::new(|| -> DeviceResult<Box<dyn FifoDriver>> {
        Err(DeviceError::NoDevice(
            "the PCO SDK is not linked into this build".to_string(),
        ))
    })
}

/// Fifo-recording camera adapter.
pub struct PcoCamera {
    connector: Option<FifoConnector>,
    driver: Option<Box<dyn FifoDriver>>,
    max_width: u32,
    max_height: u32,
    roi: Roi,
    exposure_ms: f64,
    acquire_timeout: Duration,
    recording: bool,
    placeholder: Option<Frame>,
    frame_counter: u64,
}

impl PcoCamera {
    /// Adapter that opens its driver through `connector` on `initialize`.
    pub fn new(settings: &AdapterSettings, connector: FifoConnector) -> Self {
        Self {
            connector: Some(connector),
            driver: None,
            max_width: settings.width,
            max_height: settings.height,
            roi: Roi::full(settings.width, settings.height),
            exposure_ms: settings.exposure_ms,
            acquire_timeout: settings.acquire_timeout,
            recording: false,
            placeholder: None,
            frame_counter: 0,
        }
    }

    /// True when a real device is open.
    pub fn has_device(&self) -> bool {
        self.driver.is_some()
    }

    fn open(&mut self, connector: FifoConnector) -> DeviceResult<(Box<dyn FifoDriver>, u32, u32)> {
        let mut driver = connector()?;
        let configured = driver
            .sensor_size()
            .and_then(|size| driver.set_exposure_s(self.exposure_ms / 1000.0).map(|()| size));
        match configured {
            Ok((width, height)) => Ok((driver, width, height)),
            Err(err) => {
                let _ = driver.close();
                Err(err)
            }
        }
    }

    fn read_frame(&mut self) -> DeviceResult<ImageItem> {
        let timeout = self.acquire_timeout;
        let driver = self.driver.as_mut().ok_or(DeviceError::NotInitialized)?;
        driver.wait_for_first_image(timeout)?;
        let (width, height, data) = driver.image()?;
        let frame = Frame::new(width, height, Pixels::Mono16(data), self.frame_counter)?;
        self.frame_counter += 1;
        Ok(ImageItem::Frame(frame))
    }

    /// The cached stand-in frame, regenerated only when the region changed.
    fn placeholder_frame(&mut self) -> DeviceResult<ImageItem> {
        let (width, height) = (self.roi.width, self.roi.height);
        let stale = self
            .placeholder
            .as_ref()
            .map_or(true, |frame| frame.width != width || frame.height != height);
        if stale {
            let mut data = Vec::with_capacity(width as usize * height as usize);
            for y in 0..height {
                for x in 0..width {
                    data.push((((x + y) % 256) * 256) as u16);
                }
            }
            self.placeholder = Some(Frame::new(width, height, Pixels::Mono16(data), 0)?);
        }

        let mut frame = self.placeholder.clone().ok_or(DeviceError::NotInitialized)?;
        frame.frame_number = self.frame_counter;
        frame.timestamp = chrono::Utc::now();
        self.frame_counter += 1;
        Ok(ImageItem::Frame(frame))
    }

    fn apply_roi(&mut self, roi: Roi) -> DeviceResult<()> {
        self.roi = roi;
        let was_recording = self.recording;
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        if was_recording {
            driver.stop()?;
        }
        driver.set_roi(roi.x + 1, roi.y + 1, roi.x + roi.width, roi.y + roi.height)?;
        if was_recording {
            driver.record(FIFO_DEPTH, RecordMode::Fifo)?;
        }
        Ok(())
    }
}

impl DeviceAdapter for PcoCamera {
    fn kind(&self) -> CameraKind {
        CameraKind::Pco
    }

    fn initialize(&mut self) -> DeviceResult<Bounds> {
        let Some(connector) = self.connector.take() else {
            return Ok(match self.driver {
                Some(_) => Bounds::Sensor {
                    width: self.max_width,
                    height: self.max_height,
                },
                None => Bounds::NoDevice {
                    reason: "device already released".to_string(),
                },
            });
        };

        match self.open(connector) {
            Ok((driver, width, height)) => {
                self.driver = Some(driver);
                self.max_width = width;
                self.max_height = height;
                self.roi = Roi::full(width, height);
                Ok(Bounds::Sensor { width, height })
            }
            Err(err) => Ok(Bounds::NoDevice {
                reason: err.to_string(),
            }),
        }
    }

    fn acquire_one(&mut self) -> DeviceResult<ImageItem> {
        match self.driver.as_mut() {
            Some(driver) => {
                driver.record(1, RecordMode::Sequence)?;
                self.read_frame()
            }
            None => self.placeholder_frame(),
        }
    }

    fn start_stream(&mut self) -> DeviceResult<()> {
        if let Some(driver) = self.driver.as_mut() {
            driver.record(FIFO_DEPTH, RecordMode::Fifo)?;
            self.recording = true;
        }
        Ok(())
    }

    fn acquire_streamed(&mut self) -> DeviceResult<ImageItem> {
        if self.driver.is_some() {
            self.read_frame()
        } else {
            self.placeholder_frame()
        }
    }

    fn stop_stream(&mut self) -> DeviceResult<()> {
        if !self.recording {
            return Ok(());
        }
        self.recording = false;
        match self.driver.as_mut() {
            Some(driver) => driver.stop(),
            None => Ok(()),
        }
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> DeviceResult<f64> {
        let applied = match self.driver.as_mut() {
            Some(driver) => {
                driver.set_exposure_s(exposure_ms / 1000.0)?;
                driver.exposure_s()? * 1000.0
            }
            None => exposure_ms,
        };
        self.exposure_ms = applied;
        Ok(applied)
    }

    fn crop(&mut self, roi: Roi) -> DeviceResult<()> {
        self.apply_roi(roi)
    }

    fn restore_full(&mut self) -> DeviceResult<()> {
        self.apply_roi(Roi::full(self.max_width, self.max_height))
    }

    fn status(&mut self) -> DeviceResult<Option<CameraStatus>> {
        match self.driver.as_mut() {
            Some(driver) => driver.status().map(Some),
            None => Ok(None),
        }
    }

    fn sensor_size(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    fn active_size(&self) -> (u32, u32) {
        (self.roi.width, self.roi.height)
    }

    fn frame_interval(&self, exposure_ms: f64) -> Duration {
        if self.driver.is_some() {
            Duration::ZERO
        } else {
            exposure_interval(exposure_ms)
        }
    }

    fn close(&mut self) -> DeviceResult<()> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };
        if self.recording {
            self.recording = false;
            let _ = driver.stop();
        }
        driver.close()
    }
}
