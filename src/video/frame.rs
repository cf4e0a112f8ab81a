use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel layouts understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    /// Packed 4:2:2, `[Y0, U, Y1, V]` per pixel pair (YUY2).
    Yuyv422,
    /// Planar 4:2:0, Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel for packed RGB layouts, `None` for YUV.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Rgba | Self::Bgra => Some(4),
            Self::Yuyv422 | Self::Nv12 => None,
        }
    }

    /// Tightly packed byte size of a `width` x `height` frame.
    ///
    /// Odd dimensions round the chroma planes up.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Rgb24 | Self::Bgr24 => w * h * 3,
            Self::Rgba | Self::Bgra => w * h * 4,
            Self::Yuyv422 => w.div_ceil(2) * 4 * h,
            Self::Nv12 => w * h + w.div_ceil(2) * 2 * h.div_ceil(2),
        }
    }

    /// Row stride of the first plane.
    pub fn stride(self, width: u32) -> usize {
        let w = width as usize;
        match self {
            Self::Rgb24 | Self::Bgr24 => w * 3,
            Self::Rgba | Self::Bgra => w * 4,
            Self::Yuyv422 => w.div_ceil(2) * 4,
            Self::Nv12 => w,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Yuyv422 => "yuyv422",
            Self::Nv12 => "nv12",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry and layout of a frame, without pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.format.stride(self.width)
    }
}

/// A single decoded frame handed over by the pipeline.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    data: Vec<u8>,
    descriptor: FrameDescriptor,
    /// Capture timestamp in microseconds.
    timestamp_us: u64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            descriptor: FrameDescriptor::new(width, height, format),
            timestamp_us: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    pub fn descriptor(&self) -> FrameDescriptor {
        self.descriptor
    }

    /// Implied stride of the first plane; frames are always tightly packed.
    pub fn stride(&self) -> usize {
        self.descriptor.stride()
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Whether `data` holds at least a full frame for the declared geometry.
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.descriptor.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_sizes() {
        assert_eq!(PixelFormat::Rgba.frame_size(100, 100), 100 * 100 * 4);
        assert_eq!(PixelFormat::Bgra.frame_size(640, 480), 640 * 480 * 4);
        assert_eq!(PixelFormat::Rgb24.frame_size(3, 2), 18);
    }

    #[test]
    fn yuv_frame_sizes_round_chroma_up() {
        assert_eq!(PixelFormat::Yuyv422.frame_size(4, 2), 16);
        assert_eq!(PixelFormat::Yuyv422.frame_size(3, 1), 8);
        assert_eq!(PixelFormat::Nv12.frame_size(4, 2), 8 + 4);
        assert_eq!(PixelFormat::Nv12.frame_size(3, 3), 9 + 8);
    }

    #[test]
    fn only_rgb_formats_have_bytes_per_pixel() {
        assert_eq!(PixelFormat::Bgra.bytes_per_pixel(), Some(4));
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), Some(3));
        assert_eq!(PixelFormat::Nv12.bytes_per_pixel(), None);
        assert_eq!(PixelFormat::Yuyv422.bytes_per_pixel(), None);
    }

    #[test]
    fn frame_reports_descriptor_and_stride() {
        let frame = VideoFrame::new(vec![0; 24], 2, 3, PixelFormat::Bgra).with_timestamp(42);
        assert_eq!(frame.stride(), 8);
        assert_eq!(frame.timestamp_us(), 42);
        assert_eq!(frame.descriptor(), FrameDescriptor::new(2, 3, PixelFormat::Bgra));
        assert!(frame.is_complete());
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let frame = VideoFrame::new(vec![0; 10], 2, 2, PixelFormat::Rgb24);
        assert!(!frame.is_complete());
    }

    #[test]
    fn pixel_format_serialises_lowercase() {
        let json = serde_json::to_value(PixelFormat::Yuyv422).unwrap();
        assert_eq!(json, "yuyv422");
        let parsed: PixelFormat = serde_json::from_str("\"bgra\"").unwrap();
        assert_eq!(parsed, PixelFormat::Bgra);
    }
}
