use image::GrayImage;

use crate::errors::{EqualizeError, Result};
use crate::profiler::PipelineProfile;

/// Number of intensity levels of an 8-bit single-channel image.
pub const INTENSITY_LEVELS: usize = 256;

/// Largest pixel count the pipeline accepts. Keeps every 32-bit counter and
/// the device-side normalization arithmetic free of overflow.
pub const MAX_PIXEL_COUNT: usize = 1 << 31;

/// 256 counters indexed by intensity level.
pub type Bins = [u32; INTENSITY_LEVELS];

/// Single-channel 8-bit image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(EqualizeError::InvalidInput {
                message: format!(
                    "pixel buffer holds {} bytes but {}x{} needs {}",
                    data.len(),
                    width,
                    height,
                    expected
                ),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Wraps a flat row of pixels as a `len x 1` image.
    pub fn from_row(data: Vec<u8>) -> Result<Self> {
        let width = row_width(data.len())?;
        let height = if width == 0 { 0 } else { 1 };
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn into_gray_image(self) -> Result<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data).ok_or_else(|| {
            EqualizeError::InvalidInput {
                message: "pixel buffer does not match its dimensions".to_string(),
            }
        })
    }
}

impl From<GrayImage> for PixelBuffer {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Width of a single-row image of `len` pixels. `MAX_PIXEL_COUNT` fits in a `u32`.
fn row_width(len: usize) -> Result<u32> {
    if len > MAX_PIXEL_COUNT {
        return Err(EqualizeError::ImageTooLarge {
            pixels: len,
            max: MAX_PIXEL_COUNT,
        });
    }
    Ok(len as u32)
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct Equalization {
    pub histogram: Bins,
    pub cumulative_histogram: Bins,
    pub lut: Bins,
    pub output: PixelBuffer,
    pub profile: PipelineProfile,
}
