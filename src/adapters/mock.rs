//! In-memory native drivers for exercising the physical adapters without
//! hardware.
//!
//! Both mocks share a [`DriverProbe`] that tests keep a handle to, so calls
//! made on the worker thread can be observed from the test thread. Faults are
//! injected with the `with_*` builders.

use super::ids::{BufferConnector, BufferDriver};
use super::pco::{FifoConnector, FifoDriver, RecordMode};
use super::CameraStatus;
use crate::error::{DeviceError, DeviceResult};
use crate::messages::Roi;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Call counters shared between a mock driver and the test that owns it.
#[derive(Debug, Default)]
pub struct DriverProbe {
    closes: AtomicUsize,
    stream_stops: AtomicUsize,
    frames: AtomicU64,
    region: Mutex<Option<(u32, u32, u32, u32)>>,
}

impl DriverProbe {
    /// Times the device was released.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Times a running acquisition was stopped.
    pub fn stream_stops(&self) -> usize {
        self.stream_stops.load(Ordering::SeqCst)
    }

    /// Images handed out by the driver.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Last region passed to the driver, in the driver's own convention.
    pub fn roi(&self) -> Option<(u32, u32, u32, u32)> {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_roi(&self, region: (u32, u32, u32, u32)) {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner) = Some(region);
    }
}

/// Scripted failures shared by both mocks.
#[derive(Debug, Clone, Default)]
struct Faults {
    /// Error returned for every image after this many were delivered
    after: Option<(u64, DeviceError)>,
    /// Every n-th image is lost
    lose_every: Option<u64>,
}

impl Faults {
    fn check(&self, delivered: u64) -> DeviceResult<()> {
        if let Some((limit, err)) = &self.after {
            if delivered >= *limit {
                return Err(err.clone());
            }
        }
        if let Some(n) = self.lose_every {
            if n > 0 && (delivered + 1) % n == 0 {
                return Err(DeviceError::FrameLost(format!("image {} dropped by the link", delivered + 1)));
            }
        }
        Ok(())
    }
}

/// Mock fifo-recording driver producing 16-bit gradient images.
#[derive(Debug)]
pub struct MockFifoDriver {
    width: u32,
    height: u32,
    region: (u32, u32, u32, u32),
    exposure_s: f64,
    min_exposure_s: f64,
    recording: Option<RecordMode>,
    frame_delay: Duration,
    close_delay: Duration,
    faults: Faults,
    delivered: u64,
    probe: Arc<DriverProbe>,
}

impl MockFifoDriver {
    /// Sensor of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            region: (1, 1, width, height),
            exposure_s: 0.01,
            min_exposure_s: 0.0,
            recording: None,
            frame_delay: Duration::from_millis(2),
            close_delay: Duration::ZERO,
            faults: Faults::default(),
            delivered: 0,
            probe: Arc::new(DriverProbe::default()),
        }
    }

    /// Report calls to `probe`.
    pub fn with_probe(mut self, probe: Arc<DriverProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Shortest exposure the device accepts; shorter requests are raised.
    pub fn with_min_exposure_s(mut self, seconds: f64) -> Self {
        self.min_exposure_s = seconds;
        self
    }

    /// Time each image takes to arrive.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Make `close` block, as a wedged driver would.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Fail every image after `frames` were delivered.
    pub fn failing_after(mut self, frames: u64, err: DeviceError) -> Self {
        self.faults.after = Some((frames, err));
        self
    }

    /// Lose every `n`-th image.
    pub fn losing_every(mut self, n: u64) -> Self {
        self.faults.lose_every = Some(n);
        self
    }

    /// Connector handing out this driver.
    pub fn connector(self) -> FifoConnector {
        Box::new(move || -> DeviceResult<Box<dyn FifoDriver>> { Ok(Box::new(self)) })
    }

    fn region_size(&self) -> (u32, u32) {
        let (x0, y0, x1, y1) = self.region;
        (x1 + 1 - x0, y1 + 1 - y0)
    }
}

impl FifoDriver for MockFifoDriver {
    fn sensor_size(&mut self) -> DeviceResult<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn set_exposure_s(&mut self, seconds: f64) -> DeviceResult<()> {
        self.exposure_s = seconds.max(self.min_exposure_s);
        Ok(())
    }

    fn exposure_s(&mut self) -> DeviceResult<f64> {
        Ok(self.exposure_s)
    }

    fn record(&mut self, _images: usize, mode: RecordMode) -> DeviceResult<()> {
        self.recording = Some(mode);
        Ok(())
    }

    fn wait_for_first_image(&mut self, timeout: Duration) -> DeviceResult<()> {
        if self.recording.is_none() {
            return Err(DeviceError::Driver("recorder is not armed".to_string()));
        }
        if self.frame_delay > timeout {
            std::thread::sleep(timeout);
            return Err(DeviceError::Timeout(timeout));
        }
        std::thread::sleep(self.frame_delay);
        Ok(())
    }

    fn image(&mut self) -> DeviceResult<(u32, u32, Vec<u16>)> {
        let delivered = self.delivered;
        self.delivered += 1;
        self.faults.check(delivered)?;

        let (width, height) = self.region_size();
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let val = ((u64::from(x) + u64::from(y) + delivered) % 256) * 100;
                data.push(val.min(u64::from(u16::MAX)) as u16);
            }
        }
        if self.recording == Some(RecordMode::Sequence) {
            self.recording = None;
        }
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok((width, height, data))
    }

    fn stop(&mut self) -> DeviceResult<()> {
        self.recording = None;
        self.probe.stream_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_roi(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> DeviceResult<()> {
        if x0 < 1 || y0 < 1 || x1 > self.width || y1 > self.height || x0 > x1 || y0 > y1 {
            return Err(DeviceError::Driver(format!(
                "region ({x0}, {y0}, {x1}, {y1}) outside {}x{} sensor",
                self.width, self.height
            )));
        }
        self.region = (x0, y0, x1, y1);
        self.probe.set_roi(self.region);
        Ok(())
    }

    fn status(&mut self) -> DeviceResult<CameraStatus> {
        Ok(CameraStatus {
            health: "no warnings, no errors".to_string(),
            acquire_mode: "auto".to_string(),
            trigger_mode: "auto sequence".to_string(),
            frame_rate_hz: 1.0 / self.exposure_s.max(f64::EPSILON),
        })
    }

    fn close(&mut self) -> DeviceResult<()> {
        std::thread::sleep(self.close_delay);
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock image-buffer driver producing 8-bit ramps.
#[derive(Debug)]
pub struct MockBufferDriver {
    width: u32,
    height: u32,
    aoi: Roi,
    exposure_ms: f64,
    min_exposure_ms: f64,
    live: bool,
    empty_buffers: bool,
    faults: Faults,
    delivered: u64,
    probe: Arc<DriverProbe>,
}

impl MockBufferDriver {
    /// Sensor of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aoi: Roi::full(width, height),
            exposure_ms: 10.0,
            min_exposure_ms: 0.0,
            live: false,
            empty_buffers: false,
            faults: Faults::default(),
            delivered: 0,
            probe: Arc::new(DriverProbe::default()),
        }
    }

    /// Report calls to `probe`.
    pub fn with_probe(mut self, probe: Arc<DriverProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Shortest exposure the device accepts; shorter requests are raised.
    pub fn with_min_exposure_ms(mut self, exposure_ms: f64) -> Self {
        self.min_exposure_ms = exposure_ms;
        self
    }

    /// Hand out empty buffers, as a sensor that never finished a readout.
    pub fn with_empty_buffers(mut self) -> Self {
        self.empty_buffers = true;
        self
    }

    /// Fail every read after `frames` were delivered.
    pub fn failing_after(mut self, frames: u64, err: DeviceError) -> Self {
        self.faults.after = Some((frames, err));
        self
    }

    /// Lose every `n`-th read.
    pub fn losing_every(mut self, n: u64) -> Self {
        self.faults.lose_every = Some(n);
        self
    }

    /// Connector handing out this driver.
    pub fn connector(self) -> BufferConnector {
        Box::new(move || -> DeviceResult<Box<dyn BufferDriver>> { Ok(Box::new(self)) })
    }
}

impl BufferDriver for MockBufferDriver {
    fn sensor_size(&mut self) -> DeviceResult<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn set_exposure_ms(&mut self, exposure_ms: f64) -> DeviceResult<()> {
        self.exposure_ms = exposure_ms.max(self.min_exposure_ms);
        Ok(())
    }

    fn exposure_ms(&mut self) -> DeviceResult<f64> {
        Ok(self.exposure_ms)
    }

    fn freeze_video(&mut self, _timeout: Duration) -> DeviceResult<()> {
        Ok(())
    }

    fn capture_video(&mut self) -> DeviceResult<()> {
        self.live = true;
        Ok(())
    }

    fn stop_live_video(&mut self) -> DeviceResult<()> {
        self.live = false;
        self.probe.stream_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_buffer(&mut self) -> DeviceResult<Vec<u8>> {
        let delivered = self.delivered;
        self.delivered += 1;
        self.faults.check(delivered)?;
        if self.empty_buffers {
            return Ok(Vec::new());
        }

        let len = self.aoi.width as usize * self.aoi.height as usize;
        let data = (0..len).map(|i| ((i as u64 + delivered) % 256) as u8).collect();
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn set_aoi(&mut self, roi: Roi) -> DeviceResult<()> {
        if roi.x + roi.width > self.width || roi.y + roi.height > self.height {
            return Err(DeviceError::Driver(format!("area of interest {roi:?} outside the sensor")));
        }
        self.aoi = roi;
        self.probe.set_roi((roi.x, roi.y, roi.width, roi.height));
        Ok(())
    }

    fn exit(&mut self) -> DeviceResult<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
