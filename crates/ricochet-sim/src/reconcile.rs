use rand::Rng;

use ricochet_core::player::Side;

use crate::config::SimConfig;
use crate::effects::ids;
use crate::events::SimEvent;
use crate::history::HistoryBuffer;
use crate::physics::{self, Rect};
use crate::{GameState, PaddleInput, Phase};

/// Process one paddle movement report with lag compensation.
///
/// The report's target position always lands (last processed input wins).
/// If the claimed timestamp falls inside the retained history window, the
/// slice between its bracketing snapshots is scanned for a collision the
/// host missed: the ball is interpolated, the reporting paddle extrapolated
/// from its reported velocity, and the first overlapping sub-time wins. A
/// confirmed past hit is resolved with the live hit rule, fast-forwarded to
/// the present, and any outcome the host optimistically reached in the
/// meantime is rolled back.
#[allow(clippy::too_many_arguments)]
pub fn apply_paddle_input<R: Rng + ?Sized>(
    state: &mut GameState,
    history: &HistoryBuffer,
    side: Side,
    input: &PaddleInput,
    now_ms: f64,
    config: &SimConfig,
    rng: &mut R,
    events: &mut Vec<SimEvent>,
) {
    {
        let paddle = &mut state.player_mut(side).paddle;
        paddle.target_y = input.y.clamp(0.0, config.arena_height - paddle.height);
        paddle.vy = input.vy;
    }

    // Too stale or too fresh to bracket: skip compensation, the input is
    // treated as a plain target update.
    let Some((prev, next)) = history.query(input.client_timestamp) else {
        return;
    };
    let time_diff = next.timestamp - prev.timestamp;
    if time_diff <= 0.0 {
        return;
    }
    let prev_ball = prev.ball.clone();
    let next_ball = next.ball.clone();
    let prev_t = prev.timestamp;

    // A held or parked ball has no trajectory to rewind against.
    if prev_ball.attached.is_some() || (prev_ball.vx == 0.0 && prev_ball.vy == 0.0) {
        return;
    }

    let approaching = match side {
        Side::Left => prev_ball.vx < 0.0,
        Side::Right => prev_ball.vx > 0.0,
    };
    if !approaching {
        return;
    }

    let (paddle_x, paddle_width, paddle_height) = {
        let p = &state.player(side).paddle;
        (p.x, p.width, p.height)
    };

    // Scan evenly spaced sub-times across the bracketed slice so a fast
    // ball cannot slip between two checks.
    let mut impact = None;
    let substeps = config.rewind_substeps.max(1);
    for i in 1..=substeps {
        let fraction = i as f64 / substeps as f64;
        let sub_time = prev_t + time_diff * fraction;
        let t = fraction as f32;
        let ball_x = prev_ball.x + (next_ball.x - prev_ball.x) * t;
        let ball_y = prev_ball.y + (next_ball.y - prev_ball.y) * t;

        let elapsed_s = ((sub_time - input.client_timestamp) / 1_000.0) as f32;
        let rect = Rect {
            x: paddle_x,
            y: input.y + input.vy * elapsed_s,
            width: paddle_width,
            height: paddle_height,
        };

        if rect.overlaps_ball(ball_x, ball_y, prev_ball.radius) {
            impact = Some((sub_time, ball_x, ball_y, rect));
            break;
        }
    }
    let Some((impact_time, ball_x, ball_y, rect)) = impact else {
        return;
    };

    // Resolve the hit exactly as a live collision would, anchored at the
    // ball's position at the moment of impact.
    let mut ball = prev_ball.clone();
    ball.x = ball_x;
    ball.y = ball_y;
    let round = state.selection_round;
    let res = physics::resolve_paddle_hit(
        state.player_mut(side),
        rect,
        &ball,
        round,
        impact_time,
        rng,
        config,
    );
    ball.vx = res.vx;
    ball.vy = res.vy;
    ball.x = match side {
        Side::Left => rect.x + rect.width + ball.radius,
        Side::Right => rect.x - ball.radius,
    };
    ball.attached = None;
    ball.launch = None;
    ball.last_hit_by = Some(side);
    ball.last_paddle_hit_at = impact_time;

    // Fast-forward from the impact to the present in fixed steps. The
    // catch-up integration is straight-line only; walls and field effects
    // inside the window are not re-checked.
    let mut remaining = now_ms - impact_time;
    while remaining > 0.0 {
        let step_ms = remaining.min(config.resim_step_ms);
        let dt = (step_ms / 1_000.0) as f32;
        ball.x += ball.vx * dt;
        ball.y += ball.vy * dt;
        remaining -= config.resim_step_ms;
    }

    state.ball = ball;
    tracing::debug!(
        side = ?side,
        impact_time,
        now_ms,
        "Rewound input resolved to a past paddle hit"
    );
    events.push(SimEvent::PaddleHit {
        side,
        crit: res.crit,
        speed: state.ball.speed(),
    });

    revert_if_contradicted(state, side, events);
}

/// Roll back any outcome the host reached while this input was in flight:
/// a provisional goal, a respawn countdown, or an opened selection screen.
/// A committed-and-contradicted outcome must never survive; an outcome that
/// was never announced must not be double-reverted.
fn revert_if_contradicted(state: &mut GameState, defender: Side, events: &mut Vec<SimEvent>) {
    let in_spawn = matches!(state.phase, Phase::Spawn { .. });
    let in_selection = matches!(state.phase, Phase::Selection { .. }) || state.selection.is_some();
    let pending = state.pending;
    if !(in_spawn || in_selection || pending.is_some()) {
        return;
    }

    let scorer_side = defender.opponent();
    // With the pending marker still present, only revert a goal that was
    // actually credited against this defender.
    let goal_was_against_defender = pending.map(|p| p.scorer == scorer_side).unwrap_or(true);

    if goal_was_against_defender && state.player(scorer_side).score > 0 {
        state.player_mut(scorer_side).score -= 1;
        state.points_since_selection = state.points_since_selection.saturating_sub(1);

        let d = state.player_mut(defender);
        if d.has_effect(ids::DOUBLE_STRIKE) {
            d.double_strike_ready = false;
        }
        if d.has_effect(ids::GOAL_SAVE) {
            d.save_conceded = d.save_conceded.saturating_sub(1);
        }
    }

    state.pending = None;
    state.selection = None;
    state.phase = Phase::Live;
    state.pause_started_at = 0.0;

    tracing::info!(defender = ?defender, "Reverted provisional outcome after rewound hit");
    events.push(SimEvent::OutcomeReverted { defender });
}
