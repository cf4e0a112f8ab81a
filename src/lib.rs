//! Frame delivery for a media pipeline.
//!
//! A [`SinkClient`] receives decoded frames and forwards each one to an
//! out-of-process consumer through a double-buffered shared-memory segment,
//! to an in-process callback, or both. The segment format is defined by the
//! `vsink-shared` crate, which also provides the consumer-side reader.

pub mod diagnostics;
pub mod settings;
pub mod sink;
pub mod video;

pub use settings::types::SinkSettings;
pub use sink::client::{FrameCallback, SinkClient};
pub use sink::error::{Result, SinkError};
pub use sink::events::{EventCallback, SinkEvent};
pub use sink::publisher::{FrameConsumer, FramePublisher};
pub use sink::transport::{FrameTransport, NullTransport, PublishedFrame, SegmentInfo};
pub use video::frame::{FrameDescriptor, PixelFormat, VideoFrame};
pub use video::scaler::{ScaleError, VideoScaler};
