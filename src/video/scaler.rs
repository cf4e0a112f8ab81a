use fast_image_resize as fr;
use fr::images::{Image, ImageRef};
use thiserror::Error;

use super::convert::convert_into;
use super::frame::{FrameDescriptor, PixelFormat, VideoFrame};

/// Malformed scaling requests.
///
/// These indicate a programming error in the caller (bad descriptor or
/// undersized buffer), not a runtime condition worth retrying.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("unsupported destination format: {0}")]
    UnsupportedDestination(PixelFormat),

    #[error("empty geometry {width}x{height}")]
    EmptyGeometry { width: u32, height: u32 },

    #[error("source buffer too small: need {expected} bytes, got {actual}")]
    SourceTooSmall { expected: usize, actual: usize },

    #[error("destination buffer too small: need {expected} bytes, got {actual}")]
    DestinationTooSmall { expected: usize, actual: usize },

    #[error("resize failed: {0}")]
    Resize(String),
}

/// Converts and resizes frames into caller-owned memory.
///
/// Holds a reusable resizer and staging buffer; no state carries over
/// between calls otherwise.
pub struct VideoScaler {
    resizer: fr::Resizer,
    staging: Vec<u8>,
}

impl VideoScaler {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
            staging: Vec::new(),
        }
    }

    /// Convert `src` into `dst` laid out as described by `target`.
    ///
    /// `dst` must be at least `target.byte_size()` bytes; only that prefix is
    /// written. Resolution changes go through `fast_image_resize`.
    pub fn scale(
        &mut self,
        src: &VideoFrame,
        dst: &mut [u8],
        target: FrameDescriptor,
    ) -> Result<(), ScaleError> {
        let pixel_type = pixel_type(target.format)?;

        for (width, height) in [(src.width(), src.height()), (target.width, target.height)] {
            if width == 0 || height == 0 {
                return Err(ScaleError::EmptyGeometry { width, height });
            }
        }
        if !src.is_complete() {
            return Err(ScaleError::SourceTooSmall {
                expected: src.descriptor().byte_size(),
                actual: src.data().len(),
            });
        }
        let dst_len = target.byte_size();
        if dst.len() < dst_len {
            return Err(ScaleError::DestinationTooSmall {
                expected: dst_len,
                actual: dst.len(),
            });
        }
        let dst = &mut dst[..dst_len];

        if (src.width(), src.height()) == (target.width, target.height) {
            convert_into(
                src.data(),
                src.format(),
                src.width(),
                src.height(),
                dst,
                target.format,
            );
            return Ok(());
        }

        // Convert at source resolution, then resample straight into `dst`.
        self.staging
            .resize(target.format.frame_size(src.width(), src.height()), 0);
        convert_into(
            src.data(),
            src.format(),
            src.width(),
            src.height(),
            &mut self.staging,
            target.format,
        );

        let src_image = ImageRef::new(src.width(), src.height(), &self.staging, pixel_type)
            .map_err(|e| ScaleError::Resize(e.to_string()))?;
        let mut dst_image = Image::from_slice_u8(target.width, target.height, dst, pixel_type)
            .map_err(|e| ScaleError::Resize(e.to_string()))?;
        self.resizer
            .resize(&src_image, &mut dst_image, None)
            .map_err(|e| ScaleError::Resize(e.to_string()))
    }
}

impl Default for VideoScaler {
    fn default() -> Self {
        Self::new()
    }
}

fn pixel_type(format: PixelFormat) -> Result<fr::PixelType, ScaleError> {
    match format.bytes_per_pixel() {
        Some(3) => Ok(fr::PixelType::U8x3),
        Some(4) => Ok(fr::PixelType::U8x4),
        _ => Err(ScaleError::UnsupportedDestination(format)),
    }
}
