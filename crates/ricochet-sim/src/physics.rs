use rand::Rng;

use ricochet_core::player::Side;

use crate::config::SimConfig;
use crate::effects::ids;
use crate::events::SimEvent;
use crate::{Attached, Ball, GameState, Launch, Paddle, PlayerState, WellPolarity};

/// Axis-aligned collider rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Overlap test against the ball's bounding square, matching the paddle
    /// and wall checks everywhere else in the pipeline.
    pub fn overlaps_ball(&self, x: f32, y: f32, radius: f32) -> bool {
        x - radius <= self.x + self.width
            && x + radius >= self.x
            && y - radius <= self.y + self.height
            && y + radius >= self.y
    }
}

pub fn paddle_rect(paddle: &Paddle) -> Rect {
    Rect {
        x: paddle.x,
        y: paddle.y,
        width: paddle.width,
        height: paddle.height,
    }
}

/// Frame-rate independent exponential convergence factor: the fraction of
/// the remaining gap closed after `dt_ms`, with half the gap gone every
/// `half_life_ms`.
pub fn half_life_factor(dt_ms: f64, half_life_ms: f64) -> f32 {
    (1.0 - 0.5f64.powf(dt_ms / half_life_ms)) as f32
}

/// Diminishing-returns throttle on attack bonuses above a speed threshold.
/// Keeps stacked attack effects from compounding into unbounded speeds.
fn throttle_multiplier(speed: f32) -> f32 {
    const EFFICIENCY_FLOOR: f32 = 0.10;
    const SPEED_START: f32 = 300.0;
    const SPEED_MID: f32 = 1_500.0;
    const SPEED_END: f32 = 2_400.0;
    if speed < SPEED_START {
        1.0
    } else if speed <= SPEED_MID {
        1.0 + (speed - SPEED_START) * (0.5 - 1.0) / (SPEED_MID - SPEED_START)
    } else if speed <= SPEED_END {
        (0.5 + (speed - SPEED_MID) * (EFFICIENCY_FLOOR - 0.5) / (SPEED_END - SPEED_MID))
            .max(EFFICIENCY_FLOOR)
    } else {
        EFFICIENCY_FLOOR
    }
}

/// Outcome of a paddle hit resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResolution {
    pub vx: f32,
    pub vy: f32,
    pub crit: bool,
}

/// Compute the post-hit velocity for a paddle contact and consume the
/// hitter's one-shot charges. The same rule resolves live hits, sticky
/// releases, and rewound hits so a reconciled collision cannot diverge from
/// a live one.
pub fn resolve_paddle_hit<R: Rng + ?Sized>(
    hitter: &mut PlayerState,
    paddle: Rect,
    ball: &Ball,
    selection_round: u32,
    now_ms: f64,
    rng: &mut R,
    config: &SimConfig,
) -> HitResolution {
    // Held balls are steered by how far the paddle moved during the hold;
    // free balls by where they struck relative to the paddle center.
    const MAX_HOLD_INFLUENCE: f32 = 40.0;
    let normalized_offset = match ball.attached {
        Some(att) if att.owner == hitter.side && att.hold_start_y.is_some() => {
            let moved = paddle.y - att.hold_start_y.unwrap_or(paddle.y);
            (moved / MAX_HOLD_INFLUENCE).clamp(-1.0, 1.0)
        },
        _ => {
            let center = paddle.y + paddle.height / 2.0;
            let clamped_y = ball.y.clamp(paddle.y, paddle.y + paddle.height);
            (center - clamped_y) / (paddle.height / 2.0)
        },
    };
    let bounce_angle = normalized_offset * config.max_bounce_angle;

    let mut base_speed = match ball.attached {
        Some(att) if att.owner == hitter.side => att.captured_speed,
        _ => ball.speed(),
    };
    if base_speed == 0.0 {
        base_speed = config.initial_ball_speed + selection_round as f32 * config.speed_per_round;
    }

    let crit = rng.random::<f32>() < hitter.stats.crit_chance;
    let effective_attack = if crit {
        let attack_bonus = hitter.stats.attack - 1.0;
        1.0 + attack_bonus * (1.0 + hitter.stats.crit_force)
    } else {
        hitter.stats.attack
    };

    let throttle = throttle_multiplier(base_speed);
    let throttled_attack = 1.0 + (effective_attack - 1.0) * throttle;
    let mut new_speed = base_speed * throttled_attack;

    if hitter.overdrive_armed {
        new_speed *= config.overdrive_multiplier;
        hitter.overdrive_armed = false;
        let timer = hitter.timer_mut(ids::OVERDRIVE);
        timer.ready_at = now_ms + timer.cooldown_ms;
    } else if hitter.double_strike_ready {
        new_speed *= config.double_strike_multiplier;
        hitter.double_strike_ready = false;
    }

    if hitter.tracking_active {
        hitter.tracking_charges = hitter.tracking_charges.saturating_sub(1);
        if hitter.tracking_charges == 0 {
            hitter.tracking_active = false;
            let timer = hitter.timer_mut(ids::TRACKING);
            timer.ready_at = now_ms + timer.cooldown_ms;
        }
    }

    let direction = hitter.side.attack_direction();
    HitResolution {
        vx: direction * new_speed * bounce_angle.cos(),
        vy: -new_speed * bounce_angle.sin(),
        crit,
    }
}

/// Host-side paddle integrator: converge the simulated paddle toward the
/// client-reported target with extrapolation plus half-life blending, the
/// same scheme clients use for the remote paddle. Tracking mode follows the
/// ball deterministically instead.
pub fn advance_paddles(state: &mut GameState, dt: f32, config: &SimConfig) {
    const SNAP_EPSILON: f32 = 0.5;
    let ball_y = state.ball.y;
    for player in [&mut state.left, &mut state.right] {
        let paddle = &mut player.paddle;
        if player.tracking_active {
            let y = (ball_y - paddle.height / 2.0).clamp(0.0, config.arena_height - paddle.height);
            paddle.y = y;
            paddle.target_y = y;
            paddle.vy = 0.0;
            continue;
        }
        let extrapolated = paddle.y + paddle.vy * dt;
        let distance = paddle.target_y - extrapolated;
        if distance.abs() < SNAP_EPSILON && paddle.vy == 0.0 {
            paddle.y = paddle.target_y;
        } else {
            let factor = half_life_factor(dt as f64 * 1000.0, config.paddle_half_life_ms);
            paddle.y = extrapolated + distance * factor;
        }
        paddle.y = paddle.y.clamp(0.0, config.arena_height - paddle.height);
    }
}

/// Accelerations from field wells. Attracting wells also add a tangential
/// component that curves the ball around them.
pub fn apply_field_forces(state: &GameState, ball: &mut Ball, dt: f32) {
    const WELL_CORE_RADIUS: f32 = 20.0;
    const WELL_FALLOFF: f32 = 40_000.0;
    const WELL_ACCEL_SCALE: f32 = 3_600.0;

    for well in &state.arena.wells {
        let dx = well.x - ball.x;
        let dy = well.y - ball.y;
        let dist_sq = dx * dx + dy * dy;
        let dist = dist_sq.sqrt();
        if dist <= WELL_CORE_RADIUS {
            continue;
        }
        let falloff = WELL_FALLOFF / (dist_sq + WELL_FALLOFF);
        let radial = well.strength * falloff * WELL_ACCEL_SCALE * dt;
        match well.polarity {
            WellPolarity::Attract => {
                ball.vx += (dx / dist) * radial;
                ball.vy += (dy / dist) * radial;
                let orbital = well.orbit * falloff * WELL_ACCEL_SCALE * dt;
                ball.vx += (-dy / dist) * orbital;
                ball.vy += (dx / dist) * orbital;
            },
            WellPolarity::Repel => {
                ball.vx -= (dx / dist) * radial;
                ball.vy -= (dy / dist) * radial;
            },
        }
    }
}

/// Air drag above a speed threshold, scaling with the excess speed ratio.
pub fn apply_drag(ball: &mut Ball, dt: f32, config: &SimConfig) {
    const DRAG_THRESHOLD: f32 = 750.0;
    const DRAG_COEFFICIENT: f32 = 0.0525;
    let speed = ball.speed();
    if speed > DRAG_THRESHOLD {
        let excess =
            ((speed - DRAG_THRESHOLD) / (config.max_ball_speed - DRAG_THRESHOLD)).max(0.0);
        let factor = 1.0 - DRAG_COEFFICIENT * excess * dt;
        ball.vx *= factor;
        ball.vy *= factor;
    }
}

/// Advance the ball by one tick: attachment/launch bookkeeping, field
/// forces, drag, beam deflection, then substepped motion with collision
/// precedence seals > paddles > walls > boundary.
pub fn step_ball<R: Rng + ?Sized>(
    state: &mut GameState,
    dt: f32,
    now_ms: f64,
    rng: &mut R,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    const STICKY_FOLLOW_HALF_LIFE_MS: f64 = 250.0;
    const STICKY_RELEASE_TRACK_MS: f64 = 100.0;
    const LAUNCH_EASE_MS: f64 = 120.0;

    // A held ball follows its paddle and ignores free flight.
    if let Some(mut att) = state.ball.attached {
        let owner = state.player(att.owner);
        let (target_x, target_y) = {
            let p = &owner.paddle;
            let x = match att.owner {
                Side::Left => p.x + p.width + state.ball.radius,
                Side::Right => p.x - state.ball.radius,
            };
            (x, p.center_y())
        };
        let owner_paddle_y = owner.paddle.y;

        let factor = half_life_factor(dt as f64 * 1000.0, STICKY_FOLLOW_HALF_LIFE_MS);
        state.ball.x += (target_x - state.ball.x) * factor;
        state.ball.y += (target_y - state.ball.y) * factor;
        state.ball.vx = 0.0;
        state.ball.vy = 0.0;

        if now_ms > att.release_at && att.release_started_at == 0.0 {
            att.release_started_at = now_ms;
            att.hold_start_y = Some(owner_paddle_y);
            state.ball.attached = Some(att);
        }
        if att.release_started_at > 0.0
            && now_ms - att.release_started_at >= STICKY_RELEASE_TRACK_MS
        {
            let side = att.owner;
            let round = state.selection_round;
            let ball_snapshot = state.ball.clone();
            let rect = paddle_rect(&state.player(side).paddle);
            let res = resolve_paddle_hit(
                state.player_mut(side),
                rect,
                &ball_snapshot,
                round,
                now_ms,
                rng,
                config,
            );
            state.ball.attached = None;
            state.ball.launch = Some(Launch {
                from_vx: 0.0,
                from_vy: 0.0,
                to_vx: res.vx,
                to_vy: res.vy,
                started_at: now_ms,
            });
            state.ball.last_hit_by = Some(side);
            state.ball.last_paddle_hit_at = now_ms;
            events.push(SimEvent::BallLaunched { side });
        } else {
            state.ball.attached = Some(att);
        }
        return;
    }

    // Launch easing: ramp velocity toward the release target.
    if let Some(launch) = state.ball.launch {
        let elapsed = now_ms - launch.started_at;
        if elapsed >= LAUNCH_EASE_MS {
            state.ball.vx = launch.to_vx;
            state.ball.vy = launch.to_vy;
            state.ball.launch = None;
        } else {
            let t = (elapsed / LAUNCH_EASE_MS) as f32;
            let ease = 1.0 - (1.0 - t).powi(3);
            state.ball.vx = launch.from_vx + (launch.to_vx - launch.from_vx) * ease;
            state.ball.vy = launch.from_vy + (launch.to_vy - launch.from_vy) * ease;
        }
    }

    let mut ball = state.ball.clone();

    apply_field_forces(state, &mut ball, dt);
    apply_drag(&mut ball, dt, config);

    // Beam deflection spans the arena width, outside the substep loop.
    const BEAM_HIT_COOLDOWN_MS: f64 = 250.0;
    for beam in &state.arena.beams {
        if now_ms <= ball.last_beam_hit_at + BEAM_HIT_COOLDOWN_MS {
            continue;
        }
        let toward_owner = match beam.owner {
            Side::Left => ball.vx <= 0.0,
            Side::Right => ball.vx >= 0.0,
        };
        if toward_owner
            && ball.y + ball.radius > beam.y
            && ball.y - ball.radius < beam.y + beam.height
        {
            let current = ball.speed();
            let boosted = (current * 1.2)
                .max(config.max_ball_speed * 1.5)
                .min(config.max_ball_speed * 2.0);
            ball.vx = beam.owner.attack_direction() * boosted;
            ball.vy = 0.0;
            ball.last_hit_by = Some(beam.owner);
            ball.last_beam_hit_at = now_ms;
            events.push(SimEvent::BeamDeflected { owner: beam.owner });
        }
    }

    let total_x = ball.vx * dt;
    let total_y = ball.vy * dt;
    let move_distance = (total_x * total_x + total_y * total_y).sqrt();
    let substeps = ((move_distance / config.substep_threshold()).ceil() as u32).max(1);
    let sub_x = total_x / substeps as f32;
    let sub_y = total_y / substeps as f32;
    let prev_frame_x = ball.x;
    let midline = config.arena_width / 2.0;

    'motion: for _ in 0..substeps {
        ball.x += sub_x;
        ball.y += sub_y;

        // Midline seals block returns from the non-owning side.
        const SEAL_REFLECT_GAIN: f32 = 1.2;
        const SEAL_VY_KICK: f32 = 120.0;
        let mut sealed_by = None;
        for seal in &state.arena.seals {
            let Some(hitter) = ball.last_hit_by else {
                break;
            };
            if hitter == seal.owner {
                continue;
            }
            let crossing = match seal.owner {
                Side::Left => prev_frame_x > midline && ball.x <= midline,
                Side::Right => prev_frame_x < midline && ball.x >= midline,
            };
            if crossing {
                sealed_by = Some(seal.owner);
                break;
            }
        }
        if let Some(owner) = sealed_by {
            ball.vx *= -SEAL_REFLECT_GAIN;
            ball.vy += rng.random_range(-SEAL_VY_KICK..SEAL_VY_KICK);
            ball.x = midline + if ball.vx > 0.0 { 1.0 } else { -1.0 };
            ball.last_hit_by = None;
            events.push(SimEvent::SealBlocked { owner });
            break 'motion;
        }

        // Paddles.
        let mut hit_side = None;
        for side in [Side::Left, Side::Right] {
            let approaching = match side {
                Side::Left => ball.vx < 0.0,
                Side::Right => ball.vx > 0.0,
            };
            if !approaching {
                continue;
            }
            let rect = paddle_rect(&state.player(side).paddle);
            if rect.overlaps_ball(ball.x, ball.y, ball.radius) {
                hit_side = Some((side, rect));
                break;
            }
        }
        if let Some((side, rect)) = hit_side {
            if state.player(side).has_effect(ids::STICKY_PADDLE) {
                const STICKY_RELEASE_DELAY_MS: f64 = 150.0;
                ball.attached = Some(Attached {
                    owner: side,
                    release_at: now_ms + STICKY_RELEASE_DELAY_MS,
                    release_started_at: 0.0,
                    hold_start_y: None,
                    captured_speed: ball.speed(),
                });
                ball.vx = 0.0;
                ball.vy = 0.0;
                events.push(SimEvent::BallCaptured { side });
            } else {
                let round = state.selection_round;
                let res = resolve_paddle_hit(
                    state.player_mut(side),
                    rect,
                    &ball,
                    round,
                    now_ms,
                    rng,
                    config,
                );
                ball.vx = res.vx;
                ball.vy = res.vy;
                ball.x = match side {
                    Side::Left => rect.x + rect.width + ball.radius,
                    Side::Right => rect.x - ball.radius,
                };
                ball.last_hit_by = Some(side);
                ball.last_paddle_hit_at = now_ms;
                events.push(SimEvent::PaddleHit {
                    side,
                    crit: res.crit,
                    speed: ball.speed(),
                });
            }
            break 'motion;
        }

        // Deployable walls.
        let mut wall_hit = None;
        for (idx, wall) in state.arena.walls.iter().enumerate() {
            if wall.blocks_remaining == 0 {
                continue;
            }
            let threatening = match wall.owner {
                Side::Left => ball.vx < 0.0,
                Side::Right => ball.vx > 0.0,
            };
            if threatening
                && ball.x + ball.radius > wall.x
                && ball.x - ball.radius < wall.x + wall.width
                && ball.y + ball.radius > wall.y
                && ball.y - ball.radius < wall.y + wall.height
            {
                wall_hit = Some(idx);
                break;
            }
        }
        if let Some(idx) = wall_hit {
            let wall = &mut state.arena.walls[idx];
            ball.last_hit_by = None;
            let overlap_x = (ball.x + ball.radius - wall.x)
                .min(wall.x + wall.width - (ball.x - ball.radius));
            let overlap_y = (ball.y + ball.radius - wall.y)
                .min(wall.y + wall.height - (ball.y - ball.radius));
            if overlap_x < overlap_y {
                ball.vx = -ball.vx;
                ball.x = if ball.vx > 0.0 {
                    wall.x + wall.width + ball.radius
                } else {
                    wall.x - ball.radius
                };
            } else {
                ball.vy = -ball.vy;
                ball.y = if ball.vy > 0.0 {
                    wall.y + wall.height + ball.radius
                } else {
                    wall.y - ball.radius
                };
            }
            // A wall always sends the ball back out toward the attacker.
            let required = wall.owner.attack_direction();
            if ball.vx.signum() != required {
                ball.vx = ball.vx.abs() * required;
            }
            wall.blocks_remaining -= 1;
            events.push(SimEvent::WallHit {
                owner: wall.owner,
                wall_id: wall.id,
            });
            if wall.blocks_remaining == 0 {
                wall.cooldown_until = now_ms + wall.cooldown_ms;
                events.push(SimEvent::WallBroken {
                    owner: wall.owner,
                    wall_id: wall.id,
                });
            }
            break 'motion;
        }

        // Arena boundary: wrap while the last hitter holds the wrap effect,
        // reflect otherwise.
        let wrap_owner = ball
            .last_hit_by
            .filter(|s| state.player(*s).has_effect(ids::WRAP_FIELD));
        if let Some(side) = wrap_owner {
            if ball.y - ball.radius <= 0.0 {
                ball.y = config.arena_height - ball.radius;
                events.push(SimEvent::BallWrapped { side });
                break 'motion;
            } else if ball.y + ball.radius >= config.arena_height {
                ball.y = ball.radius;
                events.push(SimEvent::BallWrapped { side });
                break 'motion;
            }
        } else if ball.y - ball.radius < 0.0 || ball.y + ball.radius > config.arena_height {
            ball.vy = -ball.vy;
            ball.y = ball
                .y
                .clamp(ball.radius, config.arena_height - ball.radius);
            break 'motion;
        }
    }

    state.ball = ball;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{ActiveEffect, ids};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (GameState, SimConfig, StdRng) {
        let config = SimConfig::default();
        let mut state = GameState::new(&config);
        state.phase = crate::Phase::Live;
        state.ball.x = config.arena_width / 2.0;
        state.ball.y = config.arena_height / 2.0;
        (state, config, StdRng::seed_from_u64(99))
    }

    #[test]
    fn ball_moves_by_velocity() {
        let (mut state, config, mut rng) = setup();
        state.ball.vx = 200.0;
        state.ball.vy = 0.0;
        let x_before = state.ball.x;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!((state.ball.x - (x_before + 10.0)).abs() < 0.01);
    }

    #[test]
    fn fast_ball_does_not_tunnel_through_paddle() {
        let (mut state, config, mut rng) = setup();
        // Faster than a paddle width per tick: 2000 px/s * 50 ms = 100 px.
        state.ball.x = state.right.paddle.x - 60.0;
        state.ball.y = state.right.paddle.center_y();
        state.ball.vx = 2_000.0;
        state.ball.vy = 0.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::PaddleHit { side: Side::Right, .. })),
            "fast ball must still register the paddle hit: {events:?}"
        );
        assert!(state.ball.vx < 0.0, "hit must reverse the ball");
    }

    #[test]
    fn substep_count_covers_displacement() {
        let config = SimConfig::default();
        for speed in [100.0f32, 500.0, 1_000.0, 2_500.0] {
            let dt = 0.05f32;
            let displacement = speed * dt;
            let substeps = ((displacement / config.substep_threshold()).ceil() as u32).max(1);
            assert!(
                substeps as f32 * config.substep_threshold() >= displacement,
                "substeps {substeps} insufficient for displacement {displacement}"
            );
        }
    }

    #[test]
    fn boundary_reflects_and_clamps() {
        let (mut state, config, mut rng) = setup();
        state.ball.y = 5.0;
        state.ball.vx = 0.0;
        state.ball.vy = -300.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!(state.ball.vy > 0.0, "top wall must reflect");
        assert!(state.ball.y >= state.ball.radius);
    }

    #[test]
    fn wrap_effect_teleports_instead_of_reflecting() {
        let (mut state, config, mut rng) = setup();
        state.left.effects.push(ActiveEffect {
            id: ids::WRAP_FIELD.to_string(),
            stacks: 1,
        });
        state.ball.last_hit_by = Some(Side::Left);
        state.ball.y = 5.0;
        state.ball.vx = 0.0;
        state.ball.vy = -300.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::BallWrapped { side: Side::Left })),
            "wrap owner's ball must wrap: {events:?}"
        );
        assert!(state.ball.vy < 0.0, "velocity is preserved through a wrap");
        assert!(state.ball.y > config.arena_height / 2.0, "moved to far edge");
    }

    #[test]
    fn paddle_hit_angle_follows_offset() {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut player = PlayerState::new(Side::Left, &config);
        let rect = paddle_rect(&player.paddle);
        // Ball striking the upper half should leave upward (negative vy).
        let mut ball = Ball::parked(config.ball_radius);
        ball.x = rect.x + rect.width;
        ball.y = rect.y + rect.height * 0.25;
        ball.vx = -300.0;
        let res = resolve_paddle_hit(&mut player, rect, &ball, 0, 1_000.0, &mut rng, &config);
        assert!(res.vx > 0.0, "left paddle sends the ball rightward");
        assert!(res.vy < 0.0, "upper-half contact deflects upward");
    }

    #[test]
    fn zero_speed_hit_reseeds_from_serve_speed() {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut player = PlayerState::new(Side::Right, &config);
        let rect = paddle_rect(&player.paddle);
        let mut ball = Ball::parked(config.ball_radius);
        ball.x = rect.x;
        ball.y = rect.y + rect.height / 2.0;
        let res = resolve_paddle_hit(&mut player, rect, &ball, 2, 1_000.0, &mut rng, &config);
        let speed = (res.vx * res.vx + res.vy * res.vy).sqrt();
        let expected_base = config.initial_ball_speed + 2.0 * config.speed_per_round;
        assert!(
            speed >= expected_base,
            "speed {speed} below reseeded base {expected_base}"
        );
    }

    #[test]
    fn overdrive_charge_is_consumed_once() {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut player = PlayerState::new(Side::Left, &config);
        player.overdrive_armed = true;
        player.timer_mut(ids::OVERDRIVE).cooldown_ms = 20_000.0;
        let rect = paddle_rect(&player.paddle);
        let mut ball = Ball::parked(config.ball_radius);
        ball.x = rect.x + rect.width;
        ball.y = rect.y + rect.height / 2.0;
        ball.vx = -300.0;

        let boosted = resolve_paddle_hit(&mut player, rect, &ball, 0, 1_000.0, &mut rng, &config);
        assert!(!player.overdrive_armed, "charge must be consumed");
        assert_eq!(player.timer(ids::OVERDRIVE).ready_at, 21_000.0);

        let plain = resolve_paddle_hit(&mut player, rect, &ball, 0, 1_000.0, &mut rng, &config);
        let boosted_speed = (boosted.vx.powi(2) + boosted.vy.powi(2)).sqrt();
        let plain_speed = (plain.vx.powi(2) + plain.vy.powi(2)).sqrt();
        assert!(
            boosted_speed > plain_speed * 1.5,
            "overdrive hit should be much faster: {boosted_speed} vs {plain_speed}"
        );
    }

    #[test]
    fn throttle_dampens_attack_at_high_speed() {
        assert_eq!(throttle_multiplier(100.0), 1.0);
        let mid = throttle_multiplier(900.0);
        assert!(mid < 1.0 && mid > 0.5);
        let high = throttle_multiplier(2_000.0);
        assert!(high < 0.5);
        assert_eq!(throttle_multiplier(3_000.0), 0.10);
    }

    #[test]
    fn drag_only_bites_above_threshold() {
        let config = SimConfig::default();
        let mut slow = Ball::parked(config.ball_radius);
        slow.vx = 400.0;
        apply_drag(&mut slow, 0.05, &config);
        assert_eq!(slow.vx, 400.0);

        let mut fast = Ball::parked(config.ball_radius);
        fast.vx = 1_400.0;
        apply_drag(&mut fast, 0.05, &config);
        assert!(fast.vx < 1_400.0);
    }

    #[test]
    fn seal_blocks_opposing_return() {
        let (mut state, config, mut rng) = setup();
        state.arena.seals.push(crate::MidlineSeal {
            owner: Side::Left,
            expires_at: 10_000.0,
        });
        state.ball.last_hit_by = Some(Side::Right);
        state.ball.x = config.arena_width / 2.0 + 8.0;
        state.ball.vx = -400.0;
        state.ball.vy = 0.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::SealBlocked { owner: Side::Left })),
            "seal must block the crossing: {events:?}"
        );
        assert!(state.ball.vx > 0.0, "seal reflects the ball");
        assert!(state.ball.last_hit_by.is_none(), "attribution cleared");
    }

    #[test]
    fn wall_loses_blocks_and_breaks() {
        let (mut state, config, mut rng) = setup();
        state.arena.walls.push(crate::DeployableWall {
            id: 7,
            owner: Side::Left,
            x: 120.0,
            y: 334.0,
            width: 10.0,
            height: 100.0,
            blocks_remaining: 1,
            max_blocks: 3,
            cooldown_until: 0.0,
            cooldown_ms: 15_000.0,
        });
        state.ball.x = 150.0;
        state.ball.y = 384.0;
        state.ball.vx = -400.0;
        state.ball.vy = 0.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::WallBroken { wall_id: 7, .. })),
            "single-block wall must break: {events:?}"
        );
        assert_eq!(state.arena.walls[0].blocks_remaining, 0);
        assert_eq!(state.arena.walls[0].cooldown_until, 16_000.0);
        assert!(state.ball.vx > 0.0, "wall reflects toward the attacker");
    }

    #[test]
    fn sticky_paddle_captures_ball() {
        let (mut state, config, mut rng) = setup();
        state.left.effects.push(ActiveEffect {
            id: ids::STICKY_PADDLE.to_string(),
            stacks: 1,
        });
        state.ball.x = state.left.paddle.x + state.left.paddle.width + 15.0;
        state.ball.y = state.left.paddle.center_y();
        state.ball.vx = -500.0;
        let mut events = Vec::new();
        step_ball(&mut state, 0.05, 1_000.0, &mut rng, &config, &mut events);
        let att = state.ball.attached.expect("ball must attach");
        assert_eq!(att.owner, Side::Left);
        assert_eq!(att.captured_speed, 500.0);
        assert_eq!(state.ball.vx, 0.0);
        assert!(events.contains(&SimEvent::BallCaptured { side: Side::Left }));
    }

    #[test]
    fn held_ball_releases_into_launch() {
        let (mut state, config, mut rng) = setup();
        state.ball.attached = Some(Attached {
            owner: Side::Left,
            release_at: 1_000.0,
            release_started_at: 0.0,
            hold_start_y: None,
            captured_speed: 400.0,
        });
        state.ball.vx = 0.0;
        state.ball.vy = 0.0;

        let mut events = Vec::new();
        // First step past release_at starts the release tracking window.
        step_ball(&mut state, 0.05, 1_050.0, &mut rng, &config, &mut events);
        assert!(state.ball.attached.is_some());
        // Second step past the tracking window launches.
        step_ball(&mut state, 0.05, 1_200.0, &mut rng, &config, &mut events);
        assert!(state.ball.attached.is_none(), "release must complete");
        assert!(state.ball.launch.is_some(), "launch ease must be active");
        assert!(events.contains(&SimEvent::BallLaunched { side: Side::Left }));
    }

    #[test]
    fn half_life_factor_converges_without_overshoot() {
        let mut value = 0.0f32;
        let target = 100.0f32;
        let mut elapsed = 0.0;
        while elapsed < 2_000.0 {
            let f = half_life_factor(16.0, 120.0);
            assert!((0.0..=1.0).contains(&f));
            value += (target - value) * f;
            assert!(value <= target, "blend must never overshoot");
            elapsed += 16.0;
        }
        assert!(
            (target - value).abs() < 0.01,
            "blend must converge, residual {}",
            target - value
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ball_stays_inside_vertical_bounds(
                y in 20.0f32..748.0,
                vy in -2_000.0f32..2_000.0,
                dt in 0.01f32..0.1,
            ) {
                let (mut state, config, mut rng) = setup();
                state.ball.y = y;
                state.ball.vx = 0.0;
                state.ball.vy = vy;
                let mut events = Vec::new();
                step_ball(&mut state, dt, 1_000.0, &mut rng, &config, &mut events);
                prop_assert!(state.ball.y >= state.ball.radius - 0.01);
                prop_assert!(state.ball.y <= config.arena_height - state.ball.radius + 0.01);
            }

            #[test]
            fn substeps_satisfy_tunneling_guard(
                speed in 10.0f32..5_000.0,
                dt in 0.01f32..0.1,
            ) {
                let config = SimConfig::default();
                let displacement = speed * dt;
                let substeps = ((displacement / config.substep_threshold()).ceil() as u32).max(1);
                let needed = (displacement / (config.paddle_width / 2.0)).ceil() as u32;
                prop_assert!(substeps >= needed.max(1));
            }

            #[test]
            fn hit_speed_is_bounded_by_throttle(
                incoming in 100.0f32..2_400.0,
                offset in -0.9f32..0.9,
            ) {
                let config = SimConfig::default();
                let mut rng = StdRng::seed_from_u64(5);
                let mut player = PlayerState::new(Side::Left, &config);
                // A heavily stacked attacker.
                player.stats.attack = 2.0;
                let rect = paddle_rect(&player.paddle);
                let mut ball = Ball::parked(config.ball_radius);
                ball.x = rect.x + rect.width;
                ball.y = rect.y + rect.height / 2.0 + offset * rect.height / 2.0;
                ball.vx = -incoming;
                let res = resolve_paddle_hit(
                    &mut player, rect, &ball, 0, 1_000.0, &mut rng, &config,
                );
                let out_speed = (res.vx * res.vx + res.vy * res.vy).sqrt();
                // Even a doubled attack cannot exceed 2x incoming, and past
                // the throttle midpoint the bonus is at most half effective.
                prop_assert!(out_speed <= incoming * 2.0 + 1.0);
                if incoming >= 1_500.0 {
                    prop_assert!(out_speed <= incoming * 1.5 + 1.0);
                }
            }
        }
    }
}
