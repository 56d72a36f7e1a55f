// src/tracker.rs
//
// IoU-based tracker for person detections from a fixed camera.
//
// Design:
//   - Greedy IoU matching (sufficient for a hallway's worth of people)
//   - Tracks coast through brief detection gaps before pruning
//   - Tentative tracks need several consecutive hits before they are
//     confirmed and forwarded to the counting engine

use tracing::debug;

use crate::detection::Detection;
use crate::types::TrackerConfig;

/// Missed frames after which a confirmed track is demoted to Lost.
const LOST_AFTER_MISSES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: [f32; 4],
    pub state: TrackState,
    pub consecutive_hits: u32,
    pub age: u32,
    pub frames_since_hit: u32,
    pub last_confidence: f32,
}

impl Track {
    fn new(id: u32, detection: &Detection) -> Self {
        Self {
            id,
            bbox: detection.bbox,
            state: TrackState::Tentative,
            consecutive_hits: 1,
            age: 1,
            frames_since_hit: 0,
            last_confidence: detection.confidence,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    fn update_with_detection(&mut self, detection: &Detection, min_hits: u32) {
        self.bbox = detection.bbox;
        self.last_confidence = detection.confidence;
        self.consecutive_hits += 1;
        self.frames_since_hit = 0;
        self.age += 1;

        if self.state == TrackState::Tentative && self.consecutive_hits >= min_hits {
            self.state = TrackState::Confirmed;
            debug!(
                "✅ Track {} confirmed (conf {:.2})",
                self.id, self.last_confidence
            );
        }
        if self.state == TrackState::Lost {
            self.state = TrackState::Confirmed;
            self.consecutive_hits = 1;
        }
    }

    fn mark_missed(&mut self) {
        self.frames_since_hit += 1;
        self.consecutive_hits = 0;
        self.age += 1;
        if self.state == TrackState::Confirmed && self.frames_since_hit > LOST_AFTER_MISSES {
            self.state = TrackState::Lost;
        }
    }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

pub struct PersonTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl PersonTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
        }
    }

    /// Process one frame of detections. Returns the current track set.
    pub fn update(&mut self, detections: &[Detection]) -> &[Track] {
        let valid: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.config.min_confidence)
            .collect();

        // ── Greedy IoU matching ──────────────────────────────────────────
        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; valid.len()];

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, detection) in valid.iter().enumerate() {
                let score = iou(&track.bbox, &detection.bbox);
                if score >= self.config.min_iou {
                    pairs.push((ti, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let min_hits = self.config.min_hits_to_confirm;
        for (ti, di, _score) in &pairs {
            if matched_tracks[*ti] || matched_dets[*di] {
                continue;
            }
            matched_tracks[*ti] = true;
            matched_dets[*di] = true;
            self.tracks[*ti].update_with_detection(valid[*di], min_hits);
        }

        // ── Unmatched tracks → coast ─────────────────────────────────────
        for (ti, matched) in matched_tracks.iter().enumerate() {
            if !matched {
                self.tracks[ti].mark_missed();
            }
        }

        // ── Unmatched detections → new tracks ────────────────────────────
        for (di, matched) in matched_dets.iter().enumerate() {
            if !matched {
                let track = Track::new(self.next_id, valid[di]);
                debug!(
                    "🆕 Track {} created at [{:.0},{:.0},{:.0},{:.0}]",
                    self.next_id, track.bbox[0], track.bbox[1], track.bbox[2], track.bbox[3]
                );
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        // ── Prune dead tracks ────────────────────────────────────────────
        let max_coast = self.config.max_coast_frames;
        self.tracks.retain(|track| {
            if track.frames_since_hit > max_coast {
                debug!(
                    "🗑️  Track {} dropped (coasted {} frames)",
                    track.id, track.frames_since_hit
                );
                return false;
            }
            if track.state == TrackState::Tentative && track.age > min_hits * 3 {
                debug!("🗑️  Track {} dropped (never confirmed)", track.id);
                return false;
            }
            true
        });

        &self.tracks
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_confirmed())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: [x1, y1, x2, y2],
            confidence: 0.8,
        }
    }

    #[test]
    fn test_iou_overlap() {
        let a = [0.0, 0.0, 100.0, 100.0];
        let b = [50.0, 50.0, 150.0, 150.0];
        let score = iou(&a, &b);
        assert!((score - 2500.0 / 17500.0).abs() < 0.01);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = [0.0, 0.0, 50.0, 50.0];
        let b = [100.0, 100.0, 200.0, 200.0];
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_track_creation_and_confirmation() {
        let mut tracker = PersonTracker::new(TrackerConfig::default());

        let dets = vec![det(300.0, 120.0, 360.0, 260.0)];
        tracker.update(&dets);
        assert_eq!(tracker.tracks.len(), 1);
        assert_eq!(tracker.tracks[0].state, TrackState::Tentative);
        assert_eq!(tracker.confirmed().count(), 0);

        tracker.update(&dets);
        tracker.update(&dets);
        assert_eq!(tracker.tracks[0].state, TrackState::Confirmed);
        assert_eq!(tracker.confirmed().count(), 1);
    }

    #[test]
    fn test_track_keeps_id_across_small_motion() {
        let mut tracker = PersonTracker::new(TrackerConfig::default());

        tracker.update(&[det(300.0, 120.0, 360.0, 260.0)]);
        let id = tracker.tracks[0].id;

        tracker.update(&[det(310.0, 125.0, 370.0, 265.0)]);
        assert_eq!(tracker.tracks.len(), 1);
        assert_eq!(tracker.tracks[0].id, id);
    }

    #[test]
    fn test_coasting_track_is_pruned() {
        let config = TrackerConfig {
            max_coast_frames: 5,
            ..TrackerConfig::default()
        };
        let mut tracker = PersonTracker::new(config);

        for _ in 0..3 {
            tracker.update(&[det(300.0, 120.0, 360.0, 260.0)]);
        }
        assert_eq!(tracker.confirmed().count(), 1);

        for _ in 0..6 {
            tracker.update(&[]);
        }
        assert!(tracker.tracks.is_empty());
    }

    #[test]
    fn test_low_confidence_detections_are_ignored() {
        let mut tracker = PersonTracker::new(TrackerConfig::default());
        let weak = Detection {
            bbox: [300.0, 120.0, 360.0, 260.0],
            confidence: 0.2,
        };
        tracker.update(&[weak]);
        assert!(tracker.tracks.is_empty());
    }

    #[test]
    fn test_distinct_people_get_distinct_ids() {
        let mut tracker = PersonTracker::new(TrackerConfig::default());
        tracker.update(&[
            det(100.0, 120.0, 160.0, 260.0),
            det(400.0, 120.0, 460.0, 260.0),
        ]);
        assert_eq!(tracker.tracks.len(), 2);
        assert_ne!(tracker.tracks[0].id, tracker.tracks[1].id);
    }
}
