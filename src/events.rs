// src/events.rs
//
// Decoupled event feed. The frame loop publishes crossing and alert
// events instead of reaching into the writers directly; consumers drain
// once per frame. Events are appended to a JSONL audit file, one object
// per line.

use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use tracing::warn;

use crate::counting::{AlertTransition, CrossingEvent};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Crossing(CrossingEvent),
    AlertChanged(AlertTransition),
}

pub struct EventBus {
    events: VecDeque<MonitorEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: MonitorEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        self.events.drain(..).collect()
    }
}

pub fn save_event(event: &MonitorEvent, file: &mut File) -> Result<()> {
    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;
    file.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
