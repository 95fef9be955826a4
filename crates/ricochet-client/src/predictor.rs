use ricochet_core::player::Side;
use ricochet_sim::config::SimConfig;
use ricochet_sim::effects::ids;
use ricochet_sim::physics::{self, half_life_factor, paddle_rect};
use ricochet_sim::{Attached, GameState};

use crate::ClientConfig;

/// Run the reduced predictive physics pass for one client frame.
///
/// This re-executes ball motion from client-known state only: field forces,
/// drag, substepped paddle/wall/boundary collision. Bounces are resolved
/// with a deterministic rule (no crits, no on-hit effects) since those only
/// exist authoritatively; the blend pass absorbs the difference when the
/// next snapshot lands.
pub fn predict_ball(state: &mut GameState, dt: f32, config: &SimConfig) {
    const STICKY_FOLLOW_HALF_LIFE_MS: f64 = 250.0;

    // A held ball tracks its paddle; the host decides the release.
    if let Some(att) = state.ball.attached {
        let (target_x, target_y) = {
            let p = &state.player(att.owner).paddle;
            let x = match att.owner {
                Side::Left => p.x + p.width + state.ball.radius,
                Side::Right => p.x - state.ball.radius,
            };
            (x, p.center_y())
        };
        let factor = half_life_factor(dt as f64 * 1000.0, STICKY_FOLLOW_HALF_LIFE_MS);
        state.ball.x += (target_x - state.ball.x) * factor;
        state.ball.y += (target_y - state.ball.y) * factor;
        state.ball.vx = 0.0;
        state.ball.vy = 0.0;
        return;
    }

    let mut ball = state.ball.clone();
    physics::apply_field_forces(state, &mut ball, dt);
    physics::apply_drag(&mut ball, dt, config);

    let total_x = ball.vx * dt;
    let total_y = ball.vy * dt;
    let move_distance = (total_x * total_x + total_y * total_y).sqrt();
    let substeps = ((move_distance / ball.radius).ceil() as u32).max(1);
    let sub_x = total_x / substeps as f32;
    let sub_y = total_y / substeps as f32;

    'motion: for _ in 0..substeps {
        ball.x += sub_x;
        ball.y += sub_y;

        // Predictive paddle bounce, both sides.
        for side in [Side::Left, Side::Right] {
            let approaching = match side {
                Side::Left => ball.vx < 0.0,
                Side::Right => ball.vx > 0.0,
            };
            if !approaching {
                continue;
            }
            let rect = paddle_rect(&state.player(side).paddle);
            if !rect.overlaps_ball(ball.x, ball.y, ball.radius) {
                continue;
            }
            if state.player(side).has_effect(ids::STICKY_PADDLE) {
                // Predictive attach; the release stays host-driven.
                ball.attached = Some(Attached {
                    owner: side,
                    release_at: f64::MAX,
                    release_started_at: 0.0,
                    hold_start_y: None,
                    captured_speed: ball.speed(),
                });
                ball.vx = 0.0;
                ball.vy = 0.0;
                ball.x = match side {
                    Side::Left => rect.x + rect.width + ball.radius,
                    Side::Right => rect.x - ball.radius,
                };
                ball.y = rect.y + rect.height / 2.0;
            } else {
                let center = rect.y + rect.height / 2.0;
                let clamped_y = ball.y.clamp(rect.y, rect.y + rect.height);
                let offset = (center - clamped_y) / (rect.height / 2.0);
                let angle = offset * config.max_bounce_angle;
                let speed = ball.speed() * state.player(side).stats.attack;
                ball.vx = side.attack_direction() * speed * angle.cos();
                ball.vy = -speed * angle.sin();
                ball.x = match side {
                    Side::Left => rect.x + rect.width + ball.radius,
                    Side::Right => rect.x - ball.radius,
                };
            }
            break 'motion;
        }

        // Predictive wall bounce.
        for wall in &state.arena.walls {
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
                break 'motion;
            }
        }

        // Boundary: wrap while the last hitter holds the wrap effect.
        let wrap_owner = ball
            .last_hit_by
            .filter(|s| state.player(*s).has_effect(ids::WRAP_FIELD));
        if wrap_owner.is_some() {
            if ball.y - ball.radius <= 0.0 {
                ball.y = config.arena_height - ball.radius;
                break 'motion;
            } else if ball.y + ball.radius >= config.arena_height {
                ball.y = ball.radius;
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

/// Blend the predicted ball toward the latest authoritative position.
///
/// Never snaps on an ordinary correction; a discontinuity consistent with a
/// wrap teleport snaps the discontinuous axis while the other keeps
/// blending.
pub fn blend_ball_to_authoritative(
    state: &mut GameState,
    authoritative: &GameState,
    dt: f32,
    sim_config: &SimConfig,
    client_config: &ClientConfig,
) {
    let server_ball = &authoritative.ball;
    let ball = &mut state.ball;

    let y_difference = (server_ball.y - ball.y).abs();
    let teleport_threshold = sim_config.arena_height * client_config.teleport_fraction;
    let factor = half_life_factor(dt as f64 * 1000.0, client_config.ball_half_life_ms);

    if y_difference > teleport_threshold {
        ball.y = server_ball.y;
        ball.x += (server_ball.x - ball.x) * factor;
    } else {
        ball.x += (server_ball.x - ball.x) * factor;
        ball.y += (server_ball.y - ball.y) * factor;
    }
}
