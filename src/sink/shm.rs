use tracing::{debug, error, info};
use vsink_shared::SharedFrameSegment;

use crate::settings::types::SinkSettings;
use crate::sink::error::Result;
use crate::sink::transport::{FrameTransport, PublishedFrame, SegmentInfo};
use crate::video::frame::{FrameDescriptor, PixelFormat, VideoFrame};
use crate::video::scaler::VideoScaler;

/// Owns one shared segment and renders frames into it in a fixed format.
pub struct ShmHolder {
    segment: SharedFrameSegment,
    format: PixelFormat,
    scaler: VideoScaler,
    geometry: Option<FrameDescriptor>,
}

impl ShmHolder {
    /// Create the backing segment. See [`SharedFrameSegment::create`] for naming.
    pub fn create(name: Option<&str>, prefix: &str, format: PixelFormat) -> Result<Self> {
        let segment = SharedFrameSegment::create(name, prefix)?;
        Ok(Self {
            segment,
            format,
            scaler: VideoScaler::new(),
            geometry: None,
        })
    }

    pub fn name(&self) -> &str {
        self.segment.name()
    }

    pub fn segment(&self) -> &SharedFrameSegment {
        &self.segment
    }

    /// Scale `frame` into the write window and publish it.
    ///
    /// Never fails to the caller: errors are logged and `None` returned, the
    /// segment staying at its previous size.
    pub fn render_frame(&mut self, frame: &VideoFrame) -> Option<PublishedFrame> {
        let target = FrameDescriptor::new(frame.width(), frame.height(), self.format);
        let bytes = target.byte_size();
        if bytes == 0 {
            debug!("ShmHolder[{}]: skipping empty frame", self.segment.name());
            return None;
        }

        if !self.segment.resize(bytes) {
            error!("ShmHolder[{}]: could not resize area", self.segment.name());
            return None;
        }

        let Some(window) = self.segment.write_window() else {
            error!("ShmHolder[{}]: no write window after resize", self.segment.name());
            return None;
        };

        if let Err(e) = self.scaler.scale(frame, window, target) {
            error!("ShmHolder[{}]: scale failed: {e}", self.segment.name());
            return None;
        }

        let generation = match self.segment.publish() {
            Ok(generation) => generation,
            Err(e) => {
                error!("ShmHolder[{}]: publish failed: {e}", self.segment.name());
                return None;
            }
        };

        let geometry_changed = self.geometry != Some(target);
        self.geometry = Some(target);
        Some(PublishedFrame {
            generation,
            bytes,
            geometry_changed,
            descriptor: target,
        })
    }
}

/// Shared-memory transport: a lazily created [`ShmHolder`].
pub struct ShmTransport {
    holder: Option<ShmHolder>,
    requested_name: Option<String>,
    prefix: String,
    format: PixelFormat,
}

impl ShmTransport {
    pub fn new(
        requested_name: Option<String>,
        prefix: impl Into<String>,
        format: PixelFormat,
    ) -> Self {
        Self {
            holder: None,
            requested_name,
            prefix: prefix.into(),
            format,
        }
    }

    pub fn from_settings(settings: &SinkSettings) -> Self {
        Self::new(
            settings.segment_name.clone(),
            settings.segment_prefix.clone(),
            settings.shm_format,
        )
    }
}

impl FrameTransport for ShmTransport {
    fn start(&mut self) -> bool {
        if self.holder.is_some() {
            return true;
        }
        match ShmHolder::create(self.requested_name.as_deref(), &self.prefix, self.format) {
            Ok(holder) => {
                info!("ShmHolder[{}]: created ({})", holder.name(), self.format);
                self.holder = Some(holder);
                true
            }
            Err(e) => {
                error!("ShmHolder ctor failure: {e}");
                false
            }
        }
    }

    fn stop(&mut self) -> bool {
        if let Some(holder) = self.holder.take() {
            info!("ShmHolder[{}]: released", holder.name());
        }
        true
    }

    fn opened_name(&self) -> String {
        self.holder
            .as_ref()
            .map(|h| h.name().to_string())
            .unwrap_or_default()
    }

    fn is_active(&self) -> bool {
        self.holder.is_some()
    }

    fn render_frame(&mut self, frame: &VideoFrame) -> Option<PublishedFrame> {
        self.holder.as_mut()?.render_frame(frame)
    }

    fn segment_info(&self) -> Option<SegmentInfo> {
        let segment = self.holder.as_ref()?.segment();
        Some(SegmentInfo {
            name: segment.name().to_string(),
            slot_size: segment.slot_size(),
            mapped_size: segment.mapped_size(),
            generation: segment.generation(),
            resize_count: segment.resize_count(),
        })
    }
}
