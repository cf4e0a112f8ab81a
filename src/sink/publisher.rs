use std::sync::Arc;

use parking_lot::Mutex;

use crate::video::frame::VideoFrame;

/// Anything that accepts frames pushed by the pipeline.
pub trait FrameConsumer: Send + Sync {
    fn deliver(&self, frame: &VideoFrame);
}

/// Fans each frame out to the attached consumers, in attach order.
#[derive(Default)]
pub struct FramePublisher {
    consumers: Mutex<Vec<Arc<dyn FrameConsumer>>>,
}

impl FramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, consumer: Arc<dyn FrameConsumer>) {
        self.consumers.lock().push(consumer);
    }

    /// Detach a previously attached consumer. Returns whether it was found.
    pub fn detach(&self, consumer: &Arc<dyn FrameConsumer>) -> bool {
        let mut consumers = self.consumers.lock();
        let before = consumers.len();
        consumers.retain(|c| !Arc::ptr_eq(c, consumer));
        consumers.len() != before
    }

    pub fn len(&self) -> usize {
        self.consumers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.lock().is_empty()
    }

    /// Deliver `frame` to every consumer.
    ///
    /// The list is snapshotted first so consumers may attach or detach from
    /// within `deliver`.
    pub fn publish(&self, frame: &VideoFrame) {
        let consumers = self.consumers.lock().clone();
        for consumer in &consumers {
            consumer.deliver(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::PixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        frames: AtomicUsize,
    }

    impl FrameConsumer for Counting {
        fn deliver(&self, _frame: &VideoFrame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::new(vec![0; 12], 2, 2, PixelFormat::Rgb24)
    }

    #[test]
    fn publish_reaches_every_consumer() {
        let publisher = FramePublisher::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        publisher.attach(a.clone());
        publisher.attach(b.clone());

        publisher.publish(&frame());
        publisher.publish(&frame());

        assert_eq!(a.frames.load(Ordering::SeqCst), 2);
        assert_eq!(b.frames.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detach_stops_delivery() {
        let publisher = FramePublisher::new();
        let a = Arc::new(Counting::default());
        let handle: Arc<dyn FrameConsumer> = a.clone();
        publisher.attach(handle.clone());
        assert_eq!(publisher.len(), 1);

        assert!(publisher.detach(&handle));
        assert!(!publisher.detach(&handle));
        assert!(publisher.is_empty());

        publisher.publish(&frame());
        assert_eq!(a.frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn publish_without_consumers_is_a_no_op() {
        FramePublisher::new().publish(&frame());
    }

    struct SelfDetaching {
        publisher: Arc<FramePublisher>,
        me: Mutex<Option<Arc<dyn FrameConsumer>>>,
    }

    impl FrameConsumer for SelfDetaching {
        fn deliver(&self, _frame: &VideoFrame) {
            if let Some(me) = self.me.lock().take() {
                self.publisher.detach(&me);
            }
        }
    }

    #[test]
    fn consumer_may_detach_itself_during_publish() {
        let publisher = Arc::new(FramePublisher::new());
        let consumer = Arc::new(SelfDetaching {
            publisher: publisher.clone(),
            me: Mutex::new(None),
        });
        let handle: Arc<dyn FrameConsumer> = consumer.clone();
        *consumer.me.lock() = Some(handle.clone());
        publisher.attach(handle);

        publisher.publish(&frame());
        assert!(publisher.is_empty());
    }
}
