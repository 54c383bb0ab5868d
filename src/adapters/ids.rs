//! Adapter for sensors that write into a host-side image buffer (IDS family).
//!
//! Frames are 8-bit. A single image is captured with a blocking "freeze";
//! live mode lets the sensor overwrite the buffer continuously and the actor
//! polls it once per exposure.

use super::{AdapterSettings, Bounds, CameraKind, DeviceAdapter};
use crate::error::{DeviceError, DeviceResult};
use crate::frame::{Frame, ImageItem, Pixels};
use crate::messages::Roi;
use std::time::Duration;

/// Text pushed instead of a snapped image when no device is present.
pub const SNAP_PLACEHOLDER: &str = "String replacer of an image";

/// Text pushed instead of a streamed image when no device is present.
pub const LIVE_PLACEHOLDER: &str = "Live Image substituted by this string";

/// Native API of a polled image-buffer sensor.
pub trait BufferDriver {
    /// Current area of interest `(width, height)`, equal to the sensor on open.
    fn sensor_size(&mut self) -> DeviceResult<(u32, u32)>;
    /// Set exposure in milliseconds.
    fn set_exposure_ms(&mut self, exposure_ms: f64) -> DeviceResult<()>;
    /// Exposure in milliseconds as applied by the device.
    fn exposure_ms(&mut self) -> DeviceResult<f64>;
    /// Capture one image into the buffer, waiting up to `timeout`.
    fn freeze_video(&mut self, timeout: Duration) -> DeviceResult<()>;
    /// Start continuous capture into the buffer.
    fn capture_video(&mut self) -> DeviceResult<()>;
    /// Stop continuous capture.
    fn stop_live_video(&mut self) -> DeviceResult<()>;
    /// Copy of the buffer contents, one byte per pixel.
    fn read_buffer(&mut self) -> DeviceResult<Vec<u8>>;
    /// Set the area of interest and reallocate the buffer.
    fn set_aoi(&mut self, roi: Roi) -> DeviceResult<()>;
    /// Release the device.
    fn exit(&mut self) -> DeviceResult<()>;
}

/// Opens the native driver; runs on the worker thread.
pub type BufferConnector = Box<dyn FnOnce() -> DeviceResult<Box<dyn BufferDriver>> + Send>;

/// Connector for the vendor SDK. This build carries no SDK bindings, so it
/// always reports that no device is available.
pub fn system_connector() -> BufferConnector {
    Box::new(|| -> DeviceResult<Box<dyn BufferDriver>> {
        Err(DeviceError::NoDevice(
            "the IDS SDK is not linked into this build".to_string(),
        ))
    })
}

/// Polled image-buffer camera adapter.
pub struct IdsCamera {
    connector: Option<BufferConnector>,
    driver: Option<Box<dyn BufferDriver>>,
    max_width: u32,
    max_height: u32,
    roi: Roi,
    exposure_ms: f64,
    acquire_timeout: Duration,
    live: bool,
    frame_counter: u64,
}

impl IdsCamera {
    /// Adapter that opens its driver through `connector` on `initialize`.
    pub fn new(settings: &AdapterSettings, connector: BufferConnector) -> Self {
        Self {
            connector: Some(connector),
            driver: None,
            max_width: settings.width,
            max_height: settings.height,
            roi: Roi::full(settings.width, settings.height),
            exposure_ms: settings.exposure_ms,
            acquire_timeout: settings.acquire_timeout,
            live: false,
            frame_counter: 0,
        }
    }

    /// True when a real device is open.
    pub fn has_device(&self) -> bool {
        self.driver.is_some()
    }

    fn open(&mut self, connector: BufferConnector) -> DeviceResult<(Box<dyn BufferDriver>, u32, u32)> {
        let mut driver = connector()?;
        let configured = driver
            .sensor_size()
            .and_then(|size| driver.set_exposure_ms(self.exposure_ms).map(|()| size));
        match configured {
            Ok((width, height)) => Ok((driver, width, height)),
            Err(err) => {
                let _ = driver.exit();
                Err(err)
            }
        }
    }

    fn read_frame(&mut self) -> DeviceResult<ImageItem> {
        let driver = self.driver.as_mut().ok_or(DeviceError::NotInitialized)?;
        let data = driver.read_buffer()?;
        if data.is_empty() {
            return Err(DeviceError::FrameLost("image buffer is empty".to_string()));
        }
        let frame = Frame::new(self.roi.width, self.roi.height, Pixels::Mono8(data), self.frame_counter)?;
        self.frame_counter += 1;
        Ok(ImageItem::Frame(frame))
    }

    fn apply_aoi(&mut self, roi: Roi) -> DeviceResult<()> {
        let Some(driver) = self.driver.as_mut() else {
            self.roi = roi;
            return Ok(());
        };
        if self.live {
            driver.stop_live_video()?;
        }
        driver.set_aoi(roi)?;
        self.roi = roi;
        if self.live {
            driver.capture_video()?;
        }
        Ok(())
    }
}

impl DeviceAdapter for IdsCamera {
    fn kind(&self) -> CameraKind {
        CameraKind::Ids
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
        let timeout = self.acquire_timeout;
        match self.driver.as_mut() {
            Some(driver) => {
                driver.freeze_video(timeout)?;
                self.read_frame()
            }
            None => Ok(ImageItem::Placeholder(SNAP_PLACEHOLDER.to_string())),
        }
    }

    fn start_stream(&mut self) -> DeviceResult<()> {
        if let Some(driver) = self.driver.as_mut() {
            driver.capture_video()?;
            self.live = true;
        }
        Ok(())
    }

    fn acquire_streamed(&mut self) -> DeviceResult<ImageItem> {
        if self.driver.is_some() {
            self.read_frame()
        } else {
            Ok(ImageItem::Placeholder(LIVE_PLACEHOLDER.to_string()))
        }
    }

    fn stop_stream(&mut self) -> DeviceResult<()> {
        if !self.live {
            return Ok(());
        }
        self.live = false;
        match self.driver.as_mut() {
            Some(driver) => driver.stop_live_video(),
            None => Ok(()),
        }
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> DeviceResult<f64> {
        let applied = match self.driver.as_mut() {
            Some(driver) => {
                driver.set_exposure_ms(exposure_ms)?;
                driver.exposure_ms()?
            }
            None => exposure_ms,
        };
        self.exposure_ms = applied;
        Ok(applied)
    }

    fn crop(&mut self, roi: Roi) -> DeviceResult<()> {
        self.apply_aoi(roi)
    }

    fn restore_full(&mut self) -> DeviceResult<()> {
        self.apply_aoi(Roi::full(self.max_width, self.max_height))
    }

    fn sensor_size(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    fn active_size(&self) -> (u32, u32) {
        (self.roi.width, self.roi.height)
    }

    fn close(&mut self) -> DeviceResult<()> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };
        if self.live {
            self.live = false;
            let _ = driver.stop_live_video();
        }
        driver.exit()
    }
}
