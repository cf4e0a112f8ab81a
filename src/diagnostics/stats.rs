use serde::Serialize;
use std::time::{Duration, Instant};

/// Per-sink delivery counters.
pub struct DeliveryStats {
    frames_delivered: u64,
    frames_published: u64,
    callbacks: u64,
    failures: u64,
    bytes_published: u64,
    last_timestamp_us: Option<u64>,
    start_time: Instant,
}

/// Snapshot of delivery stats for serialisation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySnapshot {
    pub fps: f64,
    pub frames_delivered: u64,
    pub frames_published: u64,
    pub callbacks: u64,
    pub failures: u64,
    pub failure_rate: f64,
    pub bytes_published: u64,
    pub bandwidth_bps: u64,
    pub last_timestamp_us: Option<u64>,
}

impl DeliveryStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frames_delivered: 0,
            frames_published: 0,
            callbacks: 0,
            failures: 0,
            bytes_published: 0,
            last_timestamp_us: None,
            start_time: Instant::now(),
        }
    }

    /// Record a frame entering `deliver`.
    pub fn record_delivery(&mut self, timestamp_us: u64) {
        self.frames_delivered += 1;
        self.last_timestamp_us = Some(timestamp_us);
    }

    /// Record a frame published to shared memory.
    pub fn record_publish(&mut self, bytes: usize) {
        self.frames_published += 1;
        self.bytes_published += bytes as u64;
    }

    pub fn record_callback(&mut self) {
        self.callbacks += 1;
    }

    /// Record a render or scale failure.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    pub fn callbacks(&self) -> u64 {
        self.callbacks
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Average delivery rate since creation or the last reset.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frames_delivered as f64 / elapsed
    }

    /// Failures as a percentage of delivered frames (0.0 - 100.0).
    pub fn failure_rate(&self) -> f64 {
        if self.frames_delivered == 0 {
            return 0.0;
        }
        (self.failures as f64 / self.frames_delivered as f64) * 100.0
    }

    /// Shared-memory bandwidth in bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.bytes_published as f64 / elapsed) as u64
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            fps: self.fps(),
            frames_delivered: self.frames_delivered,
            frames_published: self.frames_published,
            callbacks: self.callbacks,
            failures: self.failures,
            failure_rate: self.failure_rate(),
            bytes_published: self.bytes_published,
            bandwidth_bps: self.bandwidth_bps(),
            last_timestamp_us: self.last_timestamp_us,
        }
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Windowed frame counter for debug FPS logging.
///
/// `tick` returns the rate once per elapsed interval and starts a new window.
pub struct FpsCounter {
    interval: Duration,
    frames: u32,
    window_start: Option<Instant>,
}

impl FpsCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            frames: 0,
            window_start: None,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.interval {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = Some(now);
        Some(fps)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn initialises_with_zero_values() {
        let stats = DeliveryStats::new();
        assert_eq!(stats.frames_delivered, 0);
        assert_eq!(stats.frames_published, 0);
        assert_eq!(stats.callbacks, 0);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.bytes_published, 0);
        assert_eq!(stats.last_timestamp_us, None);
    }

    #[test]
    fn record_delivery_tracks_count_and_timestamp() {
        let mut stats = DeliveryStats::new();
        stats.record_delivery(1_000);
        stats.record_delivery(34_333);
        assert_eq!(stats.frames_delivered(), 2);
        assert_eq!(stats.last_timestamp_us, Some(34_333));
    }

    #[test]
    fn record_publish_accumulates_bytes() {
        let mut stats = DeliveryStats::new();
        stats.record_publish(640 * 480 * 4);
        stats.record_publish(640 * 480 * 4);
        assert_eq!(stats.frames_published(), 2);
        assert_eq!(stats.bytes_published, 2 * 640 * 480 * 4);
    }

    #[test]
    fn failure_rate_returns_percentage() {
        let mut stats = DeliveryStats::new();
        for _ in 0..4 {
            stats.record_delivery(0);
        }
        stats.record_failure();
        assert!((stats.failure_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failure_rate_zero_when_nothing_delivered() {
        let stats = DeliveryStats::new();
        assert_eq!(stats.failure_rate(), 0.0);
    }

    #[test]
    fn bandwidth_bps_tracks_published_bytes() {
        let mut stats = DeliveryStats::new();
        stats.record_publish(10_000);
        thread::sleep(Duration::from_millis(50));
        let bps = stats.bandwidth_bps();
        assert!(bps > 0, "bandwidth should be positive, got {bps}");
    }

    #[test]
    fn snapshot_serialises_to_camelcase() {
        let mut stats = DeliveryStats::new();
        stats.record_delivery(7);
        stats.record_callback();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["framesDelivered"], 1);
        assert_eq!(json["callbacks"], 1);
        assert_eq!(json["lastTimestampUs"], 7);
        assert!(json["bandwidthBps"].is_number());
    }

    #[test]
    fn fps_counter_reports_once_per_interval() {
        let mut fps = FpsCounter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(fps.tick_at(t0), None);
        for i in 1..30 {
            assert_eq!(fps.tick_at(t0 + Duration::from_millis(i * 33)), None);
        }
        let rate = fps.tick_at(t0 + Duration::from_secs(1)).unwrap();
        assert!((rate - 31.0).abs() < 0.01, "got {rate}");
    }

    #[test]
    fn fps_counter_resets_after_reporting() {
        let mut fps = FpsCounter::new(Duration::from_millis(100));
        let t0 = Instant::now();
        fps.tick_at(t0);
        assert!(fps.tick_at(t0 + Duration::from_millis(100)).is_some());
        assert_eq!(fps.tick_at(t0 + Duration::from_millis(150)), None);
        let rate = fps.tick_at(t0 + Duration::from_millis(200)).unwrap();
        assert!((rate - 20.0).abs() < 0.01, "got {rate}");
    }
}
