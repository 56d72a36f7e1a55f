// src/counting/track_store.rs
//
// Per-track state for the counting engine. The store owns the records
// exclusively: it shifts positions, recomputes side-of-line and prunes
// stale identities, but decides no crossings itself.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::geometry::{CountingLine, Side};

#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: u32,
    pub center: (f32, f32),
    pub prev_center: Option<(f32, f32)>,
    pub side: Side,
    /// Armed when an entry has been credited; disarmed by the reverse
    /// crossing. At most one outstanding credit per direction.
    pub counted_in: bool,
    pub counted_out: bool,
    pub last_seen_ms: f64,
    pub misses: u32,
}

#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<u32, TrackRecord>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
        }
    }

    /// Insert or update a record, shifting current → previous and
    /// recomputing side-of-line. Returns (previous side, new side).
    pub fn upsert(
        &mut self,
        id: u32,
        center: (f32, f32),
        timestamp_ms: f64,
        line: &CountingLine,
        tolerance: f32,
    ) -> (Side, Side) {
        match self.tracks.get_mut(&id) {
            Some(record) => {
                let previous = record.side;
                record.prev_center = Some(record.center);
                record.center = center;
                record.side = line.classify(center.0, center.1, tolerance, previous);
                record.last_seen_ms = timestamp_ms;
                record.misses = 0;
                (previous, record.side)
            }
            None => {
                let side = line.classify(center.0, center.1, tolerance, Side::Unknown);
                debug!("🆕 Track {} created on side {}", id, side.as_str());
                self.tracks.insert(
                    id,
                    TrackRecord {
                        id,
                        center,
                        prev_center: None,
                        side,
                        counted_in: false,
                        counted_out: false,
                        last_seen_ms: timestamp_ms,
                        misses: 0,
                    },
                );
                (Side::Unknown, side)
            }
        }
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TrackRecord> {
        self.tracks.get_mut(&id)
    }

    /// Bump the miss counter of every track absent from the current frame.
    pub fn mark_missed(&mut self, seen: &HashSet<u32>) {
        for record in self.tracks.values_mut() {
            if !seen.contains(&record.id) {
                record.misses += 1;
            }
        }
    }

    /// Remove tracks unseen for longer than `expiry_ms` of elapsed stream
    /// time. Counted flags die with the record. Returns the expired ids.
    pub fn expire(&mut self, now_ms: f64, expiry_ms: f64) -> Vec<u32> {
        let mut expired = Vec::new();
        self.tracks.retain(|id, record| {
            if now_ms - record.last_seen_ms > expiry_ms {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            debug!("🗑️  Expired {} stale track(s): {:?}", expired.len(), expired);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> CountingLine {
        CountingLine::new([0.0, 75.0], [100.0, 75.0])
    }

    #[test]
    fn test_upsert_shifts_positions() {
        let mut store = TrackStore::new();
        let line = line();

        store.upsert(1, (50.0, 100.0), 0.0, &line, 2.0);
        let record = store.get_mut(1).unwrap();
        assert_eq!(record.prev_center, None);
        assert_eq!(record.side, Side::Below);

        store.upsert(1, (52.0, 98.0), 33.0, &line, 2.0);
        let record = store.get_mut(1).unwrap();
        assert_eq!(record.prev_center, Some((50.0, 100.0)));
        assert_eq!(record.center, (52.0, 98.0));
        assert!((record.last_seen_ms - 33.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_side_is_sticky_inside_straddle_band() {
        let mut store = TrackStore::new();
        let line = line();

        store.upsert(1, (50.0, 100.0), 0.0, &line, 2.0);
        let (previous, current) = store.upsert(1, (50.0, 75.5), 33.0, &line, 2.0);
        assert_eq!(previous, Side::Below);
        assert_eq!(current, Side::Below);
    }

    #[test]
    fn test_mark_missed_counts_absent_tracks() {
        let mut store = TrackStore::new();
        let line = line();
        store.upsert(1, (50.0, 100.0), 0.0, &line, 2.0);
        store.upsert(2, (60.0, 100.0), 0.0, &line, 2.0);

        let seen: HashSet<u32> = [1].into_iter().collect();
        store.mark_missed(&seen);
        store.mark_missed(&seen);

        assert_eq!(store.get_mut(1).unwrap().misses, 0);
        assert_eq!(store.get_mut(2).unwrap().misses, 2);
    }

    #[test]
    fn test_expire_by_elapsed_time() {
        let mut store = TrackStore::new();
        let line = line();
        store.upsert(1, (50.0, 100.0), 0.0, &line, 2.0);
        store.upsert(2, (60.0, 100.0), 2500.0, &line, 2.0);

        // Track 1 last seen at 0ms, track 2 at 2500ms; expiry 3000ms.
        assert!(store.expire(2900.0, 3000.0).is_empty());
        let expired = store.expire(3100.0, 3000.0);
        assert_eq!(expired, vec![1]);
        assert_eq!(store.len(), 1);

        // A re-appearing identifier after expiry is a brand-new record.
        let (previous, _) = store.upsert(1, (50.0, 100.0), 3200.0, &line, 2.0);
        assert_eq!(previous, Side::Unknown);
        assert!(!store.get_mut(1).unwrap().counted_in);
    }
}
