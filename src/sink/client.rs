use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::diagnostics::stats::{DeliverySnapshot, DeliveryStats, FpsCounter};
use crate::settings::types::SinkSettings;
use crate::sink::events::{EventCallback, SinkEvent};
use crate::sink::publisher::FrameConsumer;
use crate::sink::transport::{create_transport, FrameTransport, SegmentInfo};
use crate::video::frame::{FrameDescriptor, VideoFrame};
use crate::video::scaler::VideoScaler;

/// In-process frame consumer.
///
/// The buffer is tightly packed in the descriptor's format and only valid for
/// the duration of the call.
pub type FrameCallback = Box<dyn FnMut(&[u8], FrameDescriptor) + Send>;

struct CallbackTarget {
    callback: FrameCallback,
    data: Vec<u8>,
    scaler: VideoScaler,
}

/// Per-output-stream sink.
///
/// Forwards every delivered frame to its transport (while started) and to the
/// registered callback; either path may be absent. A transport that fails to
/// start leaves the callback path working.
///
/// Callbacks must not call back into `register_callback`/`clear_callback` on
/// the same sink.
pub struct SinkClient {
    id: String,
    settings: SinkSettings,
    transport: Mutex<Box<dyn FrameTransport>>,
    target: Mutex<Option<CallbackTarget>>,
    stats: Mutex<DeliveryStats>,
    fps: Mutex<FpsCounter>,
    on_event: Mutex<Option<EventCallback>>,
}

impl SinkClient {
    /// Create a sink with the transport variant `settings` select.
    pub fn new(id: impl Into<String>, settings: SinkSettings) -> Self {
        let transport = create_transport(&settings);
        Self::with_transport(id, settings, transport)
    }

    pub fn with_transport(
        id: impl Into<String>,
        settings: SinkSettings,
        transport: Box<dyn FrameTransport>,
    ) -> Self {
        Self {
            id: id.into(),
            settings,
            transport: Mutex::new(transport),
            target: Mutex::new(None),
            stats: Mutex::new(DeliveryStats::new()),
            fps: Mutex::new(FpsCounter::default()),
            on_event: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }

    /// Bring the transport up. Idempotent.
    ///
    /// Returns whether the transport started; `false` means it failed and the
    /// sink serves only its callback.
    pub fn start(&self) -> bool {
        let (started, name) = {
            let mut transport = self.transport.lock();
            let was_active = transport.is_active();
            let started = transport.start();
            let name = (!was_active && transport.is_active()).then(|| transport.opened_name());
            (started, name)
        };

        if let Some(name) = name {
            info!("{}: publishing frames to '{name}'", self.id);
            self.emit(&SinkEvent::Started {
                sink_id: self.id.clone(),
                name,
            });
        } else if !started {
            info!("{}: shared memory unavailable, callback only", self.id);
        }
        started
    }

    /// Release the transport. Always succeeds, also without a prior `start`.
    pub fn stop(&self) -> bool {
        let was_active = {
            let mut transport = self.transport.lock();
            let was_active = transport.is_active();
            transport.stop();
            was_active
        };
        if was_active {
            info!("{}: stopped", self.id);
            self.emit(&SinkEvent::Stopped {
                sink_id: self.id.clone(),
            });
        }
        true
    }

    /// Segment name to announce to the consumer, empty while inactive.
    pub fn opened_name(&self) -> String {
        self.transport.lock().opened_name()
    }

    pub fn is_active(&self) -> bool {
        self.transport.lock().is_active()
    }

    /// Attach the in-process consumer, replacing any previous one.
    pub fn register_callback(&self, callback: FrameCallback) {
        *self.target.lock() = Some(CallbackTarget {
            callback,
            data: Vec::new(),
            scaler: VideoScaler::new(),
        });
    }

    pub fn clear_callback(&self) {
        *self.target.lock() = None;
    }

    pub fn has_callback(&self) -> bool {
        self.target.lock().is_some()
    }

    pub fn set_event_callback(&self, callback: Option<EventCallback>) {
        *self.on_event.lock() = callback;
    }

    /// Forward one frame to the transport and the callback.
    pub fn deliver(&self, frame: &VideoFrame) {
        self.stats.lock().record_delivery(frame.timestamp_us());
        if self.settings.debug_fps {
            if let Some(fps) = self.fps.lock().tick() {
                debug!("{}: FPS {fps:.1}", self.id);
            }
        }

        self.render_to_transport(frame);
        self.render_to_callback(frame);
    }

    /// Live segment state, `None` while no segment exists.
    pub fn segment_info(&self) -> Option<SegmentInfo> {
        self.transport.lock().segment_info()
    }

    pub fn diagnostics(&self) -> DeliverySnapshot {
        self.stats.lock().snapshot()
    }

    fn render_to_transport(&self, frame: &VideoFrame) {
        let (published, name) = {
            let mut transport = self.transport.lock();
            if !transport.is_active() {
                return;
            }
            (transport.render_frame(frame), transport.opened_name())
        };

        let Some(published) = published else {
            self.stats.lock().record_failure();
            return;
        };
        self.stats.lock().record_publish(published.bytes);

        if published.geometry_changed {
            let descriptor = published.descriptor;
            info!(
                "{}: geometry {}x{} {} on '{name}'",
                self.id, descriptor.width, descriptor.height, descriptor.format
            );
            self.emit(&SinkEvent::GeometryChanged {
                sink_id: self.id.clone(),
                name,
                width: descriptor.width,
                height: descriptor.height,
                format: descriptor.format,
                generation: published.generation,
            });
        }
    }

    fn render_to_callback(&self, frame: &VideoFrame) {
        let mut target = self.target.lock();
        let Some(CallbackTarget {
            callback,
            data,
            scaler,
        }) = target.as_mut()
        else {
            return;
        };

        let (width, height) = match self.settings.callback_resolution {
            Some(resolution) => (resolution.width, resolution.height),
            None => (frame.width(), frame.height()),
        };
        let descriptor = FrameDescriptor::new(width, height, self.settings.callback_format);
        data.resize(descriptor.byte_size(), 0);

        match scaler.scale(frame, data, descriptor) {
            Ok(()) => {
                callback(&data[..], descriptor);
                self.stats.lock().record_callback();
            }
            Err(e) => {
                error!("{}: callback conversion failed: {e}", self.id);
                self.stats.lock().record_failure();
            }
        }
    }

    fn emit(&self, event: &SinkEvent) {
        let callback = self.on_event.lock().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

impl FrameConsumer for SinkClient {
    fn deliver(&self, frame: &VideoFrame) {
        SinkClient::deliver(self, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::types::Resolution;
    use crate::sink::transport::NullTransport;
    use crate::video::frame::PixelFormat;
    use std::sync::Arc;

    const PREFIX: &str = "vsink-client-test";

    fn settings() -> SinkSettings {
        SinkSettings {
            segment_prefix: PREFIX.to_string(),
            ..SinkSettings::default()
        }
    }

    fn rgb_frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame::new(
            vec![100; (width * height * 3) as usize],
            width,
            height,
            PixelFormat::Rgb24,
        )
    }

    fn recording_events(sink: &SinkClient) -> Arc<Mutex<Vec<SinkEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let callback: EventCallback = Arc::new(move |event: &SinkEvent| {
            sink_events.lock().push(event.clone());
        });
        sink.set_event_callback(Some(callback));
        events
    }

    #[test]
    fn name_is_empty_before_start_and_after_stop() {
        let sink = SinkClient::new("cam0", settings());
        assert_eq!(sink.opened_name(), "");
        assert!(sink.start());
        assert!(sink.opened_name().starts_with(&format!("/{PREFIX}_shm_")));
        assert!(sink.stop());
        assert_eq!(sink.opened_name(), "");
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let sink = SinkClient::new("cam0", settings());
        let events = recording_events(&sink);
        assert!(sink.stop());
        assert!(!sink.is_active());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn start_is_idempotent() {
        let sink = SinkClient::new("cam0", settings());
        let events = recording_events(&sink);
        assert!(sink.start());
        let name = sink.opened_name();
        assert!(sink.start());
        assert_eq!(sink.opened_name(), name);
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn restart_yields_usable_transport() {
        let sink = SinkClient::new("cam0", settings());
        assert!(sink.start());
        sink.deliver(&rgb_frame(8, 8));
        assert!(sink.stop());

        assert!(sink.start());
        assert!(!sink.opened_name().is_empty());
        sink.deliver(&rgb_frame(8, 8));
        let info = sink.segment_info().unwrap();
        assert_eq!(info.generation, 1);
        assert_eq!(info.slot_size, 8 * 8 * 4);
    }

    #[test]
    fn geometry_change_resizes_exactly_once() {
        let sink = SinkClient::new("cam0", settings());
        sink.start();

        sink.deliver(&rgb_frame(320, 240));
        let before = sink.segment_info().unwrap();
        assert_eq!(before.slot_size, (320 * 240 * 4 + 15) & !15);

        sink.deliver(&rgb_frame(640, 480));
        let after = sink.segment_info().unwrap();
        assert_eq!(after.resize_count - before.resize_count, 1);
        assert_eq!(after.slot_size, (640 * 480 * 4 + 15) & !15);
    }

    #[test]
    fn slot_size_tracks_latest_frame() {
        let sink = SinkClient::new("cam0", settings());
        sink.start();
        for (w, h) in [(17, 3), (64, 64), (2, 2), (33, 7)] {
            sink.deliver(&rgb_frame(w, h));
            let expected = ((w * h * 4) as usize + 15) & !15;
            assert_eq!(sink.segment_info().unwrap().slot_size, expected);
        }
    }

    #[test]
    fn generation_delta_matches_delivery_count() {
        let sink = SinkClient::new("cam0", settings());
        sink.start();
        let frame = rgb_frame(16, 16);
        sink.deliver(&frame);
        let start = sink.segment_info().unwrap().generation;
        for _ in 0..10 {
            sink.deliver(&frame);
        }
        let end = sink.segment_info().unwrap().generation;
        assert_eq!(end.wrapping_sub(start), 10);
    }

    #[test]
    fn callback_receives_exact_rgba_buffer() {
        let sink = SinkClient::new("cam0", settings());
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = sizes.clone();
        sink.register_callback(Box::new(move |data: &[u8], descriptor: FrameDescriptor| {
            seen.lock().push((data.len(), descriptor));
        }));

        sink.deliver(&rgb_frame(100, 100));

        let sizes = sizes.lock();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].0, 100 * 100 * 4);
        assert_eq!(sizes[0].1, FrameDescriptor::new(100, 100, PixelFormat::Rgba));
    }

    #[test]
    fn callback_resolution_override_scales() {
        let sink = SinkClient::new(
            "cam0",
            SinkSettings {
                callback_resolution: Some(Resolution {
                    width: 32,
                    height: 16,
                }),
                callback_format: PixelFormat::Bgra,
                ..settings()
            },
        );
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = sizes.clone();
        sink.register_callback(Box::new(move |data: &[u8], _| seen.lock().push(data.len())));

        sink.deliver(&rgb_frame(64, 48));
        sink.deliver(&rgb_frame(320, 240));

        assert_eq!(*sizes.lock(), vec![32 * 16 * 4, 32 * 16 * 4]);
    }

    #[test]
    fn shm_and_callback_fire_independently() {
        let sink = SinkClient::new("cam0", settings());
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        sink.register_callback(Box::new(move |_: &[u8], _| *counter.lock() += 1));

        // Callback only.
        sink.deliver(&rgb_frame(4, 4));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(sink.diagnostics().frames_published, 0);

        // Both.
        sink.start();
        sink.deliver(&rgb_frame(4, 4));
        assert_eq!(*calls.lock(), 2);
        assert_eq!(sink.diagnostics().frames_published, 1);

        // Shared memory only.
        sink.clear_callback();
        assert!(!sink.has_callback());
        sink.deliver(&rgb_frame(4, 4));
        assert_eq!(*calls.lock(), 2);
        assert_eq!(sink.diagnostics().frames_published, 2);
    }

    #[test]
    fn null_transport_serves_callback_only() {
        let sink = SinkClient::with_transport("cam0", settings(), Box::new(NullTransport));
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        sink.register_callback(Box::new(move |_: &[u8], _| *counter.lock() += 1));

        assert!(sink.start());
        assert!(!sink.is_active());
        assert_eq!(sink.opened_name(), "");
        sink.deliver(&rgb_frame(4, 4));

        assert_eq!(*calls.lock(), 1);
        assert_eq!(sink.segment_info(), None);
        assert_eq!(sink.diagnostics().failures, 0);
    }

    #[test]
    fn failed_start_degrades_to_callback() {
        let sink = SinkClient::new(
            "cam0",
            SinkSettings {
                segment_name: Some("/not/allowed".to_string()),
                ..settings()
            },
        );
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        sink.register_callback(Box::new(move |_: &[u8], _| *counter.lock() += 1));

        assert!(!sink.start());
        assert!(!sink.is_active());
        sink.deliver(&rgb_frame(4, 4));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn emits_lifecycle_and_geometry_events() {
        let sink = SinkClient::new("cam7", settings());
        let events = recording_events(&sink);

        sink.start();
        let name = sink.opened_name();
        sink.deliver(&rgb_frame(8, 4));
        sink.deliver(&rgb_frame(8, 4));
        sink.deliver(&rgb_frame(4, 8));
        sink.stop();

        let events = events.lock();
        assert_eq!(
            *events,
            vec![
                SinkEvent::Started {
                    sink_id: "cam7".to_string(),
                    name: name.clone(),
                },
                SinkEvent::GeometryChanged {
                    sink_id: "cam7".to_string(),
                    name: name.clone(),
                    width: 8,
                    height: 4,
                    format: PixelFormat::Bgra,
                    generation: 1,
                },
                SinkEvent::GeometryChanged {
                    sink_id: "cam7".to_string(),
                    name,
                    width: 4,
                    height: 8,
                    format: PixelFormat::Bgra,
                    generation: 3,
                },
                SinkEvent::Stopped {
                    sink_id: "cam7".to_string(),
                },
            ]
        );
    }

    #[test]
    fn diagnostics_count_deliveries_and_failures() {
        let sink = SinkClient::new("cam0", settings());
        sink.start();
        sink.register_callback(Box::new(|_: &[u8], _| {}));

        sink.deliver(&rgb_frame(4, 4).with_timestamp(1_000));
        sink.deliver(&VideoFrame::new(vec![0; 2], 4, 4, PixelFormat::Rgb24));

        let snapshot = sink.diagnostics();
        assert_eq!(snapshot.frames_delivered, 2);
        assert_eq!(snapshot.frames_published, 1);
        assert_eq!(snapshot.callbacks, 1);
        // The truncated frame fails on both paths.
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.bytes_published, 4 * 4 * 4);
    }

    #[test]
    fn delivers_through_publisher() {
        use crate::sink::publisher::FramePublisher;

        let sink = Arc::new(SinkClient::new("cam0", settings()));
        let publisher = FramePublisher::new();
        publisher.attach(sink.clone());

        publisher.publish(&rgb_frame(2, 2));
        assert_eq!(sink.diagnostics().frames_delivered, 1);
    }
}
