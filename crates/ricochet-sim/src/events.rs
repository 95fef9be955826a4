use serde::{Deserialize, Serialize};

use ricochet_core::player::Side;

use crate::effects::EffectId;

/// Semantic events emitted by a simulation step.
///
/// Downstream consumers (broadcast layer, audio/visual cues, logging) react
/// to these instead of diffing consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    PaddleHit { side: Side, crit: bool, speed: f32 },
    BallCaptured { side: Side },
    BallLaunched { side: Side },
    Scored { by: Side },
    SaveTriggered { side: Side },
    SealBlocked { owner: Side },
    WallHit { owner: Side, wall_id: u32 },
    WallBroken { owner: Side, wall_id: u32 },
    BallWrapped { side: Side },
    BeamDeflected { owner: Side },
    BallRespawned,
    SelectionOpened,
    EffectApplied { side: Side, id: EffectId },
    AbilityActivated { side: Side, id: EffectId },
    OutcomeReverted { defender: Side },
    StalemateReset,
    MatchOver { winner: Side },
}
