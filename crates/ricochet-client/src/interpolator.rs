use ricochet_core::player::Side;
use ricochet_sim::GameState;
use ricochet_sim::config::SimConfig;
use ricochet_sim::physics::half_life_factor;

use crate::ClientConfig;

/// Smooth the remote (non-local) paddle for one client frame.
///
/// Extrapolates from the last reported velocity so the paddle keeps moving
/// through packet gaps, then blends the extrapolated position toward the
/// authoritative target so it cannot drift. A resting paddle close to its
/// target snaps into place to kill micro-jitter.
pub fn interpolate_remote_paddle(
    state: &mut GameState,
    local_side: Side,
    dt: f32,
    sim_config: &SimConfig,
    client_config: &ClientConfig,
) {
    let remote_side = local_side.opponent();
    let ball_y = state.ball.y;
    let remote = state.player_mut(remote_side);

    // Tracking mode is computed identically on host and client from the
    // same inputs, so it bypasses extrapolation and blending entirely.
    if remote.tracking_active {
        let y = (ball_y - remote.paddle.height / 2.0)
            .clamp(0.0, sim_config.arena_height - remote.paddle.height);
        remote.paddle.y = y;
        return;
    }

    let paddle = &mut remote.paddle;
    let extrapolated = paddle.y + paddle.vy * dt;
    let distance = paddle.target_y - extrapolated;

    if distance.abs() < client_config.snap_epsilon && paddle.vy == 0.0 {
        paddle.y = paddle.target_y;
        return;
    }

    let factor = half_life_factor(dt as f64 * 1000.0, client_config.paddle_half_life_ms);
    let corrected = extrapolated + distance * factor;
    paddle.y = corrected.clamp(0.0, sim_config.arena_height - paddle.height);
}
