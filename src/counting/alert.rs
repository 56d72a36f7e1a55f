// src/counting/alert.rs
//
// Occupancy → alert level mapping. The transition function is pure in
// (occupancy, low threshold, margin) and re-evaluated every frame; it is
// deliberately not debounced. The monitor remembers when the current level
// was entered so a consumer can layer hysteresis on top later.

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Pure threshold mapping: occupancy below `low` is NORMAL, at least
/// `low + margin` is CRITICAL, WARNING in between.
pub fn level_for(occupancy: u64, low_threshold: u64, margin: u64) -> AlertLevel {
    if occupancy >= low_threshold + margin {
        AlertLevel::Critical
    } else if occupancy >= low_threshold {
        AlertLevel::Warning
    } else {
        AlertLevel::Normal
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AlertTransition {
    pub from: AlertLevel,
    pub to: AlertLevel,
    pub occupancy: u64,
    pub timestamp_ms: f64,
}

pub struct AlertMonitor {
    low_threshold: u64,
    margin: u64,
    level: AlertLevel,
    since_ms: f64,
}

impl AlertMonitor {
    pub fn new(low_threshold: u64, margin: u64) -> Self {
        Self {
            low_threshold,
            margin,
            level: AlertLevel::Normal,
            since_ms: 0.0,
        }
    }

    pub fn level(&self) -> AlertLevel {
        self.level
    }

    /// Stream timestamp at which the current level was entered.
    pub fn since_ms(&self) -> f64 {
        self.since_ms
    }

    pub fn update(&mut self, occupancy: u64, timestamp_ms: f64) -> Option<AlertTransition> {
        let next = level_for(occupancy, self.low_threshold, self.margin);
        if next == self.level {
            return None;
        }

        let transition = AlertTransition {
            from: self.level,
            to: next,
            occupancy,
            timestamp_ms,
        };

        match next {
            AlertLevel::Critical => warn!(
                "🚨 Alert CRITICAL: occupancy {} ≥ {}",
                occupancy,
                self.low_threshold + self.margin
            ),
            AlertLevel::Warning => warn!(
                "⚠️  Alert WARNING: occupancy {} ≥ {}",
                occupancy, self.low_threshold
            ),
            AlertLevel::Normal => info!("✅ Alert back to NORMAL (occupancy {})", occupancy),
        }

        self.level = next;
        self.since_ms = timestamp_ms;
        Some(transition)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_with_low_10_margin_5() {
        assert_eq!(level_for(0, 10, 5), AlertLevel::Normal);
        assert_eq!(level_for(9, 10, 5), AlertLevel::Normal);
        assert_eq!(level_for(10, 10, 5), AlertLevel::Warning);
        assert_eq!(level_for(14, 10, 5), AlertLevel::Warning);
        assert_eq!(level_for(15, 10, 5), AlertLevel::Critical);
        assert_eq!(level_for(100, 10, 5), AlertLevel::Critical);
    }

    #[test]
    fn test_transitions_are_immediate_and_deterministic() {
        let mut monitor = AlertMonitor::new(10, 5);
        assert_eq!(monitor.level(), AlertLevel::Normal);

        let up = monitor.update(10, 1000.0).unwrap();
        assert_eq!(up.from, AlertLevel::Normal);
        assert_eq!(up.to, AlertLevel::Warning);
        assert!((monitor.since_ms() - 1000.0).abs() < f64::EPSILON);

        // Same level again: no transition, entry timestamp untouched.
        assert!(monitor.update(12, 2000.0).is_none());
        assert!((monitor.since_ms() - 1000.0).abs() < f64::EPSILON);

        // Straight to CRITICAL and straight back down.
        let up = monitor.update(15, 3000.0).unwrap();
        assert_eq!(up.to, AlertLevel::Critical);
        let down = monitor.update(0, 4000.0).unwrap();
        assert_eq!(down.from, AlertLevel::Critical);
        assert_eq!(down.to, AlertLevel::Normal);
    }
}
