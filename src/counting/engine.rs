// src/counting/engine.rs
//
// Per-frame reconciliation: validates the ingress records, upserts tracks,
// turns confirmed side flips into at-most-once crossing credits, updates
// the ledger and the alert monitor, then prunes expired tracks. Per-track
// failures are local — a bad entry is dropped, never the frame, and a
// non-monotonic frame is dropped, never the run.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::alert::{AlertLevel, AlertMonitor, AlertTransition};
use super::geometry::{crossing_direction, CountingLine, Direction};
use super::ledger::{LedgerSnapshot, OccupancyLedger};
use super::track_store::TrackStore;

/// Fixed-shape ingress record from the upstream detector/tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackedBox {
    pub track_id: u32,
    pub bbox: [f32; 4],
}

impl TrackedBox {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }
}

/// A credited directional crossing, for the audit feed.
#[derive(Debug, Clone, Serialize)]
pub struct CrossingEvent {
    pub track_id: u32,
    pub direction: Direction,
    pub timestamp_ms: f64,
    pub position: (f32, f32),
}

/// Outcome of one frame: "processed" when `anomalies` is zero, otherwise
/// "processed with N anomalies".
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub timestamp_ms: f64,
    pub crossings: Vec<CrossingEvent>,
    pub anomalies: u32,
    pub expired_tracks: u32,
    pub live_tracks: usize,
    pub snapshot: LedgerSnapshot,
    pub alert: AlertLevel,
    pub alert_transition: Option<AlertTransition>,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.anomalies == 0
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub line: CountingLine,
    pub straddle_tolerance_px: f32,
    pub track_expiry_seconds: f64,
    pub low_threshold: u64,
    pub margin: u64,
}

pub struct CountingEngine {
    line: CountingLine,
    tolerance: f32,
    expiry_ms: f64,
    store: TrackStore,
    ledger: Arc<OccupancyLedger>,
    alert: AlertMonitor,
    last_frame_ts: Option<f64>,
}

impl CountingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            line: config.line,
            tolerance: config.straddle_tolerance_px,
            expiry_ms: config.track_expiry_seconds * 1000.0,
            store: TrackStore::new(),
            ledger: Arc::new(OccupancyLedger::new()),
            alert: AlertMonitor::new(config.low_threshold, config.margin),
            last_frame_ts: None,
        }
    }

    /// Active counting-line geometry, for overlay rendering.
    pub fn line(&self) -> &CountingLine {
        &self.line
    }

    /// Shared handle for concurrent snapshot readers.
    pub fn ledger(&self) -> Arc<OccupancyLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn process_frame(&mut self, detections: &[TrackedBox], timestamp_ms: f64) -> FrameReport {
        // Frame contract: strictly increasing timestamps.
        if let Some(last) = self.last_frame_ts {
            if timestamp_ms <= last {
                warn!(
                    "Frame at {:.1}ms not after {:.1}ms — frame dropped",
                    timestamp_ms, last
                );
                return FrameReport {
                    timestamp_ms,
                    crossings: Vec::new(),
                    anomalies: 1,
                    expired_tracks: 0,
                    live_tracks: self.store.len(),
                    snapshot: self.ledger.snapshot(),
                    alert: self.alert.level(),
                    alert_transition: None,
                };
            }
        }
        self.last_frame_ts = Some(timestamp_ms);

        let mut anomalies = 0u32;
        let mut crossings = Vec::new();
        let mut seen: HashSet<u32> = HashSet::with_capacity(detections.len());

        for detection in detections {
            if let Some(reason) = validate(detection) {
                warn!(
                    "Rejected detection for track {}: {}",
                    detection.track_id, reason
                );
                anomalies += 1;
                continue;
            }
            if !seen.insert(detection.track_id) {
                warn!(
                    "Duplicate track id {} within one frame — entry skipped",
                    detection.track_id
                );
                anomalies += 1;
                continue;
            }

            let center = detection.center();
            let (previous, current) =
                self.store
                    .upsert(detection.track_id, center, timestamp_ms, &self.line, self.tolerance);

            if let Some(direction) = crossing_direction(previous, current) {
                if let Some(event) = self.credit(detection.track_id, direction, center, timestamp_ms)
                {
                    crossings.push(event);
                }
            }
        }

        self.store.mark_missed(&seen);
        let expired = self.store.expire(timestamp_ms, self.expiry_ms);

        let snapshot = self.ledger.snapshot();
        let alert_transition = self.alert.update(snapshot.occupancy, timestamp_ms);

        FrameReport {
            timestamp_ms,
            crossings,
            anomalies,
            expired_tracks: expired.len() as u32,
            live_tracks: self.store.len(),
            snapshot,
            alert: self.alert.level(),
            alert_transition,
        }
    }

    /// At-most-once credit per direction per excursion. Crediting arms the
    /// direction's flag; the reverse flip disarms the opposite flag, so
    /// only a genuine re-crossing can credit the same direction again.
    fn credit(
        &mut self,
        track_id: u32,
        direction: Direction,
        position: (f32, f32),
        timestamp_ms: f64,
    ) -> Option<CrossingEvent> {
        let record = self.store.get_mut(track_id)?;
        let credited = match direction {
            Direction::In => {
                record.counted_out = false;
                if record.counted_in {
                    false
                } else {
                    record.counted_in = true;
                    true
                }
            }
            Direction::Out => {
                record.counted_in = false;
                if record.counted_out {
                    false
                } else {
                    record.counted_out = true;
                    true
                }
            }
        };

        if !credited {
            debug!(
                "Track {} already credited {} this excursion",
                track_id,
                direction.as_str()
            );
            return None;
        }

        match direction {
            Direction::In => self.ledger.record_entry(),
            Direction::Out => {
                self.ledger.record_exit();
            }
        }
        debug!(
            "{} crossing by track {} at {:.1}ms",
            direction.as_str(),
            track_id,
            timestamp_ms
        );

        Some(CrossingEvent {
            track_id,
            direction,
            timestamp_ms,
            position,
        })
    }
}

fn validate(detection: &TrackedBox) -> Option<&'static str> {
    let [x1, y1, x2, y2] = detection.bbox;
    if !x1.is_finite() || !y1.is_finite() || !x2.is_finite() || !y2.is_finite() {
        return Some("non-finite coordinates");
    }
    if x1 < 0.0 || y1 < 0.0 {
        return Some("negative coordinates");
    }
    if x2 <= x1 || y2 <= y1 {
        return Some("inverted or empty box");
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Line directed right→left, so "above" is the larger-y half plane and
    // a track moving toward smaller y crosses Above→Below, i.e. IN.
    fn engine() -> CountingEngine {
        engine_with_alert(10, 5)
    }

    fn engine_with_alert(low_threshold: u64, margin: u64) -> CountingEngine {
        CountingEngine::new(EngineConfig {
            line: CountingLine::new([100.0, 75.0], [0.0, 75.0]),
            straddle_tolerance_px: 2.0,
            track_expiry_seconds: 5.0,
            low_threshold,
            margin,
        })
    }

    fn person(id: u32, cx: f32, cy: f32) -> TrackedBox {
        TrackedBox {
            track_id: id,
            bbox: [cx - 15.0, cy - 30.0, cx + 15.0, cy + 30.0],
        }
    }

    #[test]
    fn test_single_entry_despite_oscillation_around_line() {
        let mut engine = engine();

        engine.process_frame(&[person(1, 50.0, 100.0)], 0.0);
        let report = engine.process_frame(&[person(1, 50.0, 50.0)], 33.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].direction, Direction::In);

        // ±1px jitter around y=75 stays inside the 2px straddle band.
        let mut ts = 66.0;
        for _ in 0..4 {
            for &y in &[76.0, 74.0] {
                let report = engine.process_frame(&[person(1, 50.0, y)], ts);
                assert!(report.crossings.is_empty());
                ts += 33.0;
            }
        }

        let snap = engine.ledger().snapshot();
        assert_eq!(snap.entered, 1);
        assert_eq!(snap.exited, 0);
        assert_eq!(snap.occupancy, 1);
    }

    #[test]
    fn test_first_observation_only_establishes_side() {
        let mut engine = engine();
        // Born inside the straddle band: side stays UNKNOWN, and the first
        // clear observation afterwards must not count as a crossing.
        engine.process_frame(&[person(5, 50.0, 75.5)], 0.0);
        let report = engine.process_frame(&[person(5, 50.0, 40.0)], 33.0);
        assert!(report.crossings.is_empty());
        assert_eq!(engine.ledger().snapshot().entered, 0);
    }

    #[test]
    fn test_reappear_same_side_before_expiry_is_not_recounted() {
        let mut engine = engine();
        engine.process_frame(&[person(7, 50.0, 100.0)], 0.0);
        engine.process_frame(&[person(7, 50.0, 40.0)], 33.0);
        assert_eq!(engine.ledger().snapshot().entered, 1);

        // Lost for a while, but well under the 5s expiry.
        for i in 0..10 {
            engine.process_frame(&[], 66.0 + i as f64 * 33.0);
        }

        let report = engine.process_frame(&[person(7, 50.0, 45.0)], 500.0);
        assert!(report.crossings.is_empty());
        assert_eq!(engine.ledger().snapshot().entered, 1);
    }

    #[test]
    fn test_expired_track_then_new_identity_counts_again() {
        let mut engine = engine();
        engine.process_frame(&[person(1, 50.0, 100.0)], 0.0);
        engine.process_frame(&[person(1, 50.0, 40.0)], 33.0);

        let report = engine.process_frame(&[], 6000.0);
        assert_eq!(report.expired_tracks, 1);
        assert_eq!(report.live_tracks, 0);

        engine.process_frame(&[person(2, 50.0, 100.0)], 6033.0);
        let report = engine.process_frame(&[person(2, 50.0, 40.0)], 6066.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(engine.ledger().snapshot().entered, 2);
    }

    #[test]
    fn test_reverse_crossing_resets_credit() {
        let mut engine = engine();
        engine.process_frame(&[person(3, 50.0, 100.0)], 0.0);
        engine.process_frame(&[person(3, 50.0, 40.0)], 33.0);

        let report = engine.process_frame(&[person(3, 50.0, 110.0)], 66.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].direction, Direction::Out);

        let snap = engine.ledger().snapshot();
        assert_eq!(snap.entered, 1);
        assert_eq!(snap.exited, 1);
        assert_eq!(snap.occupancy, 0);

        // A genuine re-crossing after leaving credits again.
        let report = engine.process_frame(&[person(3, 50.0, 40.0)], 99.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].direction, Direction::In);
        assert_eq!(engine.ledger().snapshot().entered, 2);
        assert_eq!(engine.ledger().snapshot().occupancy, 1);
    }

    #[test]
    fn test_exit_with_zero_occupancy_floors_display_keeps_audit() {
        let mut engine = engine();
        engine.process_frame(&[person(9, 50.0, 40.0)], 0.0);
        let report = engine.process_frame(&[person(9, 50.0, 110.0)], 33.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].direction, Direction::Out);

        let snap = engine.ledger().snapshot();
        assert_eq!(snap.entered, 0);
        assert_eq!(snap.exited, 1);
        assert_eq!(snap.occupancy, 0);
    }

    #[test]
    fn test_duplicate_track_id_within_frame_is_rejected() {
        let mut engine = engine();
        let report =
            engine.process_frame(&[person(1, 50.0, 100.0), person(1, 60.0, 100.0)], 0.0);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.live_tracks, 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_malformed_boxes_are_rejected_entry_local() {
        let mut engine = engine();
        let bad_negative = TrackedBox {
            track_id: 1,
            bbox: [-5.0, 40.0, 20.0, 60.0],
        };
        let bad_nan = TrackedBox {
            track_id: 2,
            bbox: [f32::NAN, 40.0, 20.0, 60.0],
        };
        let bad_inverted = TrackedBox {
            track_id: 3,
            bbox: [50.0, 50.0, 40.0, 60.0],
        };

        let report = engine.process_frame(
            &[bad_negative, bad_nan, bad_inverted, person(4, 50.0, 100.0)],
            0.0,
        );
        assert_eq!(report.anomalies, 3);
        // The good entry in the same frame still went through.
        assert_eq!(report.live_tracks, 1);
    }

    #[test]
    fn test_non_monotonic_frame_is_dropped_not_the_run() {
        let mut engine = engine();
        engine.process_frame(&[person(1, 50.0, 100.0)], 100.0);

        let report = engine.process_frame(&[person(1, 50.0, 40.0)], 100.0);
        assert_eq!(report.anomalies, 1);
        assert!(report.crossings.is_empty());
        assert_eq!(engine.ledger().snapshot().entered, 0);

        // The next well-formed frame processes normally.
        let report = engine.process_frame(&[person(1, 50.0, 40.0)], 133.0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(engine.ledger().snapshot().entered, 1);
    }

    #[test]
    fn test_alert_level_follows_occupancy() {
        let mut engine = engine_with_alert(2, 2);

        engine.process_frame(&[person(1, 30.0, 100.0), person(2, 60.0, 100.0)], 0.0);
        let report =
            engine.process_frame(&[person(1, 30.0, 40.0), person(2, 60.0, 40.0)], 33.0);
        assert_eq!(report.snapshot.occupancy, 2);
        assert_eq!(report.alert, AlertLevel::Warning);
        let transition = report.alert_transition.unwrap();
        assert_eq!(transition.from, AlertLevel::Normal);
        assert_eq!(transition.to, AlertLevel::Warning);

        engine.process_frame(&[person(3, 30.0, 100.0), person(4, 60.0, 100.0)], 66.0);
        let report =
            engine.process_frame(&[person(3, 30.0, 40.0), person(4, 60.0, 40.0)], 99.0);
        assert_eq!(report.snapshot.occupancy, 4);
        assert_eq!(report.alert, AlertLevel::Critical);
    }
}
