use serde::{Deserialize, Serialize};

use ricochet_core::player::Side;

/// The deferred transition a confirmed goal will trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Plain goal: respawn the ball after the countdown.
    Respawn,
    /// Goal that also fills the selection meter: open the selection screen.
    Selection,
}

/// A provisionally scored outcome waiting out its confirmation window.
///
/// Created by goal detection, resolved exactly once: either committed by the
/// gate after `confirmation_delay_ms` with no contradicting rewind, or
/// reverted by the input reconciler. While one is outstanding, goal
/// detection is locked so a second crossing cannot double-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOutcome {
    pub kind: OutcomeKind,
    pub scorer: Side,
    pub at_ms: f64,
}

impl PendingOutcome {
    pub fn new(kind: OutcomeKind, scorer: Side, at_ms: f64) -> Self {
        Self { kind, scorer, at_ms }
    }

    /// Whether the confirmation window has elapsed.
    pub fn ripe(&self, now_ms: f64, confirmation_delay_ms: f64) -> bool {
        now_ms - self.at_ms > confirmation_delay_ms
    }
}
