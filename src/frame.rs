//! Frames and the items carried by the Images channel.

use crate::error::{DeviceError, DeviceResult};
use chrono::{DateTime, Utc};

/// Pixel samples of a frame, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    /// 8-bit monochrome
    Mono8(Vec<u8>),
    /// 16-bit monochrome
    Mono16(Vec<u16>),
}

impl Pixels {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Pixels::Mono8(data) => data.len(),
            Pixels::Mono16(data) => data.len(),
        }
    }

    /// True if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per sample.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Pixels::Mono8(_) => 1,
            Pixels::Mono16(_) => 2,
        }
    }
}

/// A single acquired or synthesized image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Sample buffer, `width * height` long
    pub pixels: Pixels,
    /// Counter assigned by the adapter (for detecting dropped frames)
    pub frame_number: u64,
    /// Acquisition time
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Build a frame, checking that the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, pixels: Pixels, frame_number: u64) -> DeviceResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(DeviceError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            frame_number,
            timestamp: Utc::now(),
        })
    }

    /// Bytes per pixel of the underlying samples.
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixels.bytes_per_pixel()
    }

    /// `(height, width)`, the order image arrays are usually indexed in.
    pub fn shape(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Mean sample value; 0.0 for an empty frame.
    pub fn mean_intensity(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = match &self.pixels {
            Pixels::Mono8(data) => data.iter().map(|&v| v as u64).sum(),
            Pixels::Mono16(data) => data.iter().map(|&v| v as u64).sum(),
        };
        sum as f64 / self.pixels.len() as f64
    }
}

/// What the Images channel delivers.
///
/// In degraded (no hardware) operation some adapters emit a descriptive text
/// instead of pixels. Readers must not try to render a `Placeholder`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageItem {
    /// Real or synthesized pixels
    Frame(Frame),
    /// Text standing in for an image
    Placeholder(String),
}

impl ImageItem {
    /// The frame, if this item carries pixels.
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            ImageItem::Frame(frame) => Some(frame),
            ImageItem::Placeholder(_) => None,
        }
    }

    /// Consume the item, returning the frame if it carries pixels.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            ImageItem::Frame(frame) => Some(frame),
            ImageItem::Placeholder(_) => None,
        }
    }
}

impl From<Frame> for ImageItem {
    fn from(frame: Frame) -> Self {
        ImageItem::Frame(frame)
    }
}
