// src/metrics.rs
//
// Pipeline observability. Counter handles are cheap clones shared across
// tasks; the status reporter reads while the frame loop increments.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_people: Arc<AtomicU64>,
    pub people_detected: Arc<AtomicU64>,
    pub entries_counted: Arc<AtomicU64>,
    pub exits_counted: Arc<AtomicU64>,
    pub anomalies_rejected: Arc<AtomicU64>,
    pub tracks_expired: Arc<AtomicU64>,
    pub detection_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_people: Arc::new(AtomicU64::new(0)),
            people_detected: Arc::new(AtomicU64::new(0)),
            entries_counted: Arc::new(AtomicU64::new(0)),
            exits_counted: Arc::new(AtomicU64::new(0)),
            anomalies_rejected: Arc::new(AtomicU64::new(0)),
            tracks_expired: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_people: self.frames_with_people.load(Ordering::Relaxed),
            people_detected: self.people_detected.load(Ordering::Relaxed),
            entries_counted: self.entries_counted.load(Ordering::Relaxed),
            exits_counted: self.exits_counted.load(Ordering::Relaxed),
            anomalies_rejected: self.anomalies_rejected.load(Ordering::Relaxed),
            tracks_expired: self.tracks_expired.load(Ordering::Relaxed),
            last_detection_us: self.detection_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_people: u64,
    pub people_detected: u64,
    pub entries_counted: u64,
    pub exits_counted: u64,
    pub anomalies_rejected: u64,
    pub tracks_expired: u64,
    pub last_detection_us: u64,
    pub elapsed_secs: f64,
}
