use ricochet_core::net::messages::SnapshotMsg;
use ricochet_core::player::Side;
use ricochet_sim::config::SimConfig;
use ricochet_sim::{GameState, Phase, Simulator};

use crate::ClientConfig;
use crate::{interpolator, predictor};

/// The client's visual mirror of the match.
///
/// Holds a derived, mutable copy of the authoritative state — never ground
/// truth. Snapshots replace everything except the visual positions the
/// prediction and interpolation passes own; those converge instead of
/// snapping. Rendering reads `state` and must never write into it.
pub struct ClientView {
    pub local_side: Side,
    sim_config: SimConfig,
    client_config: ClientConfig,
    state: Option<GameState>,
    authoritative: Option<GameState>,
    last_tick: u32,
}

impl ClientView {
    pub fn new(local_side: Side, sim_config: SimConfig, client_config: ClientConfig) -> Self {
        Self {
            local_side,
            sim_config,
            client_config,
            state: None,
            authoritative: None,
            last_tick: 0,
        }
    }

    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }

    /// Ingest one full-state snapshot. Undecodable payloads and reordered
    /// stale ticks are dropped; the next snapshot supersedes anyway.
    pub fn apply_snapshot(&mut self, snapshot: &SnapshotMsg) -> bool {
        if self.state.is_some() && snapshot.tick <= self.last_tick {
            tracing::debug!(
                tick = snapshot.tick,
                last_tick = self.last_tick,
                "Dropping stale snapshot"
            );
            return false;
        }
        let Some(authoritative) = Simulator::deserialize_state(&snapshot.state_data) else {
            tracing::debug!(tick = snapshot.tick, "Dropping undecodable snapshot");
            return false;
        };

        match &mut self.state {
            None => {
                self.state = Some(authoritative.clone());
            },
            Some(view) => {
                // Keep the visually-owned positions; everything else is
                // adopted wholesale from the host.
                let ball_x = view.ball.x;
                let ball_y = view.ball.y;
                let local = view.player(self.local_side).paddle.clone();
                let remote_y = view.player(self.local_side.opponent()).paddle.y;

                *view = authoritative.clone();
                view.ball.x = ball_x;
                view.ball.y = ball_y;
                let local_paddle = &mut view.player_mut(self.local_side).paddle;
                local_paddle.y = local.y;
                local_paddle.target_y = local.target_y;
                local_paddle.vy = local.vy;
                view.player_mut(self.local_side.opponent()).paddle.y = remote_y;
            },
        }
        self.authoritative = Some(authoritative);
        self.last_tick = snapshot.tick;
        true
    }

    /// Advance the mirror by one animation frame: predict the ball locally,
    /// blend toward the last authoritative snapshot, and smooth the remote
    /// paddle.
    pub fn advance(&mut self, dt: f32) {
        let Some(state) = &mut self.state else {
            return;
        };
        if matches!(state.phase, Phase::Live) {
            predictor::predict_ball(state, dt, &self.sim_config);
            if let Some(authoritative) = &self.authoritative {
                predictor::blend_ball_to_authoritative(
                    state,
                    authoritative,
                    dt,
                    &self.sim_config,
                    &self.client_config,
                );
            }
        }
        interpolator::interpolate_remote_paddle(
            state,
            self.local_side,
            dt,
            &self.sim_config,
            &self.client_config,
        );
    }

    /// Record the local paddle position driven by this client's own input.
    pub fn set_local_paddle(&mut self, y: f32, vy: f32) {
        let Some(state) = &mut self.state else {
            return;
        };
        let height = state.player(self.local_side).paddle.height;
        let clamped = y.clamp(0.0, self.sim_config.arena_height - height);
        let paddle = &mut state.player_mut(self.local_side).paddle;
        paddle.y = clamped;
        paddle.target_y = clamped;
        paddle.vy = vy;
    }
}
