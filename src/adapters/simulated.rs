//! Synthetic camera producing uniformly distributed 8-bit noise.

use super::{AdapterSettings, Bounds, CameraKind, DeviceAdapter};
use crate::config::MIN_FRAME_EDGE;
use crate::error::{DeviceError, DeviceResult};
use crate::frame::{Frame, ImageItem, Pixels};
use crate::messages::Roi;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Simulated camera. Crop, restore and resize only change bookkeeping;
/// exposure only paces the live stream.
pub struct SimulatedCamera {
    max_width: u32,
    max_height: u32,
    width: u32,
    height: u32,
    frame_counter: u64,
    rng: StdRng,
}

impl SimulatedCamera {
    /// Camera with entropy-seeded noise.
    pub fn new(settings: &AdapterSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Camera with reproducible noise.
    pub fn with_seed(settings: &AdapterSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: &AdapterSettings, rng: StdRng) -> Self {
        Self {
            max_width: settings.width,
            max_height: settings.height,
            width: settings.width,
            height: settings.height,
            frame_counter: 0,
            rng,
        }
    }

    /// Generate a noise frame of the active size.
    pub fn generate_noise_frame(&mut self) -> DeviceResult<Frame> {
        let (width, height) = (self.width, self.height);
        if width < MIN_FRAME_EDGE || height < MIN_FRAME_EDGE {
            return Err(DeviceError::Dimension { width, height });
        }
        let mut data = vec![0u8; width as usize * height as usize];
        self.rng.fill(&mut data[..]);
        let frame = Frame::new(width, height, Pixels::Mono8(data), self.frame_counter)?;
        self.frame_counter += 1;
        Ok(frame)
    }

    /// Set the active size directly, without clamping (the actor clamps
    /// before calling [`DeviceAdapter::crop`]).
    pub fn set_active_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl DeviceAdapter for SimulatedCamera {
    fn kind(&self) -> CameraKind {
        CameraKind::Simulated
    }

    fn initialize(&mut self) -> DeviceResult<Bounds> {
        if self.max_width < MIN_FRAME_EDGE || self.max_height < MIN_FRAME_EDGE {
            return Err(DeviceError::Dimension {
                width: self.max_width,
                height: self.max_height,
            });
        }
        Ok(Bounds::Sensor {
            width: self.max_width,
            height: self.max_height,
        })
    }

    fn acquire_one(&mut self) -> DeviceResult<ImageItem> {
        self.generate_noise_frame().map(ImageItem::Frame)
    }

    fn start_stream(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn acquire_streamed(&mut self) -> DeviceResult<ImageItem> {
        self.generate_noise_frame().map(ImageItem::Frame)
    }

    fn stop_stream(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> DeviceResult<f64> {
        Ok(exposure_ms)
    }

    fn crop(&mut self, roi: Roi) -> DeviceResult<()> {
        self.set_active_size(roi.width, roi.height);
        Ok(())
    }

    fn restore_full(&mut self) -> DeviceResult<()> {
        self.set_active_size(self.max_width, self.max_height);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> DeviceResult<bool> {
        self.max_width = width;
        self.max_height = height;
        self.set_active_size(width, height);
        Ok(true)
    }

    fn sensor_size(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    fn active_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn close(&mut self) -> DeviceResult<()> {
        Ok(())
    }
}
