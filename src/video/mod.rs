// Video frames, pixel formats and scaling.

pub mod convert;
pub mod frame;
pub mod scaler;

pub use frame::{FrameDescriptor, PixelFormat, VideoFrame};
pub use scaler::{ScaleError, VideoScaler};
