use serde::Serialize;
use tracing::info;

use crate::settings::types::SinkSettings;
use crate::sink::shm::ShmTransport;
use crate::video::frame::{FrameDescriptor, VideoFrame};

/// Outcome of one successful publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedFrame {
    pub generation: u32,
    /// Tightly packed size of the frame in the transport's format.
    pub bytes: usize,
    /// Geometry differs from the previous publication (or this is the first).
    pub geometry_changed: bool,
    pub descriptor: FrameDescriptor,
}

/// Live view of a transport's segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    pub name: String,
    pub slot_size: usize,
    pub mapped_size: usize,
    pub generation: u32,
    pub resize_count: u64,
}

/// Out-of-process delivery path of a sink.
///
/// Shared memory is one implementation; [`NullTransport`] stands in when it is
/// disabled so the sink keeps serving its callback.
pub trait FrameTransport: Send {
    /// Bring the transport up. Idempotent.
    fn start(&mut self) -> bool;

    /// Release all resources. Always succeeds.
    fn stop(&mut self) -> bool;

    /// Segment name for the consumer, empty when inactive.
    fn opened_name(&self) -> String;

    fn is_active(&self) -> bool;

    /// Publish one frame. Failures are logged and yield `None`.
    fn render_frame(&mut self, frame: &VideoFrame) -> Option<PublishedFrame>;

    fn segment_info(&self) -> Option<SegmentInfo> {
        None
    }
}

/// Transport used when shared memory is disabled. Never publishes.
#[derive(Debug, Default)]
pub struct NullTransport;

impl FrameTransport for NullTransport {
    fn start(&mut self) -> bool {
        true
    }

    fn stop(&mut self) -> bool {
        true
    }

    fn opened_name(&self) -> String {
        String::new()
    }

    fn is_active(&self) -> bool {
        false
    }

    fn render_frame(&mut self, _frame: &VideoFrame) -> Option<PublishedFrame> {
        None
    }
}

/// Pick the transport variant for `settings`.
pub fn create_transport(settings: &SinkSettings) -> Box<dyn FrameTransport> {
    if settings.shm_enabled {
        Box::new(ShmTransport::from_settings(settings))
    } else {
        info!("Shared memory disabled, frames go to the callback only");
        Box::new(NullTransport)
    }
}
