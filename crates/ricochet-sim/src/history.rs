use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::Ball;

/// One authoritative ball snapshot, immutable once pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalState {
    pub timestamp: f64,
    pub ball: Ball,
}

/// Sliding window of past ball states used for rewind checks.
///
/// Pushed once per tick; entries older than the retention window are evicted
/// oldest-first. Queries outside the window return `None` and the caller
/// skips compensation instead of guessing.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoricalState>,
    window_ms: f64,
}

impl HistoryBuffer {
    pub fn new(window_ms: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            window_ms,
        }
    }

    pub fn push(&mut self, timestamp: f64, ball: Ball) {
        self.entries.push_back(HistoricalState { timestamp, ball });
        while let Some(front) = self.entries.front()
            && timestamp - front.timestamp > self.window_ms
        {
            self.entries.pop_front();
        }
    }

    /// The two entries bracketing `time`: the newest entry at or before it
    /// and the oldest entry strictly after it.
    pub fn query(&self, time: f64) -> Option<(&HistoricalState, &HistoricalState)> {
        let next_idx = self.entries.iter().position(|s| s.timestamp > time)?;
        if next_idx == 0 {
            return None; // requested time predates the window
        }
        let prev = &self.entries[next_idx - 1];
        let next = &self.entries[next_idx];
        debug_assert!(prev.timestamp <= time);
        Some((prev, next))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
