use rand::Rng;

use ricochet_core::player::Side;

use crate::config::SimConfig;
use crate::effects::{ActiveEffect, AbilityKind, Effect, EffectId, EffectTable, SpawnAction, ids};
use crate::events::SimEvent;
use crate::pending::{OutcomeKind, PendingOutcome};
use crate::{
    Beam, BeamCharge, DeployableWall, GameState, MidlineSeal, Phase, SelectionSlots,
    SelectionState, Well, WellPolarity,
};

const WELL_STRENGTH: f32 = 8.0;
const WELL_ORBIT: f32 = 0.16;
const WELL_GOAL_OFFSET: f32 = 100.0;
const BEAM_CHARGE_MS: f64 = 1_200.0;
const BEAM_HEIGHT: f32 = 125.0;
const WALL_GOAL_DISTANCE: f32 = 120.0;
const TRACKING_CHARGES: u32 = 3;
const SAVE_VY_SPREAD: f32 = 180.0;

/// Serve the ball from the arena center with a freshly seeded velocity.
pub fn reset_ball<R: Rng + ?Sized>(
    state: &mut GameState,
    now_ms: f64,
    direction: f32,
    rng: &mut R,
    config: &SimConfig,
) {
    let speed =
        config.initial_ball_speed + state.selection_round as f32 * config.speed_per_round;
    let ball = &mut state.ball;
    ball.x = config.arena_width / 2.0;
    ball.y = config.arena_height / 2.0;
    ball.vx = speed * direction.signum();
    ball.vy = rng.random_range(-config.serve_vy_spread..config.serve_vy_spread);
    ball.last_hit_by = None;
    ball.attached = None;
    ball.launch = None;
    ball.last_paddle_hit_at = now_ms;
    ball.last_beam_hit_at = 0.0;
}

/// Park the ball and start the respawn countdown.
pub fn schedule_spawn(state: &mut GameState, now_ms: f64, config: &SimConfig) {
    let ball = &mut state.ball;
    ball.x = config.arena_width / 2.0;
    ball.y = -100.0;
    ball.vx = 0.0;
    ball.vy = 0.0;
    ball.last_hit_by = None;
    ball.attached = None;
    ball.launch = None;
    state.phase = Phase::Spawn { started_at: now_ms };
}

/// Goal-line detection. Locked while a pending outcome is outstanding so a
/// second crossing cannot double-score. A confirmed crossing only records a
/// provisional outcome; the gate or a rewind decides its fate.
pub fn detect_goal<R: Rng + ?Sized>(
    state: &mut GameState,
    now_ms: f64,
    rng: &mut R,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    if state.pending.is_some() || !matches!(state.phase, Phase::Live) {
        return;
    }

    let radius = state.ball.radius;
    let scorer = if state.ball.x + radius < 0.0 {
        if state.left.save_armed {
            trigger_save(state, Side::Left, rng, config, events);
            return;
        }
        Some(Side::Right)
    } else if state.ball.x - radius > config.arena_width {
        if state.right.save_armed {
            trigger_save(state, Side::Right, rng, config, events);
            return;
        }
        Some(Side::Left)
    } else {
        None
    };

    let Some(by) = scorer else { return };
    state.player_mut(by).score += 1;

    let defender = by.opponent();
    if state.player(defender).has_effect(ids::DOUBLE_STRIKE) {
        state.player_mut(defender).double_strike_ready = true;
    }
    if state.player(defender).has_effect(ids::GOAL_SAVE) {
        state.player_mut(defender).save_conceded += 1;
    }

    state.points_since_selection += 1;
    let kind = if state.points_since_selection >= state.points_needed {
        OutcomeKind::Selection
    } else {
        OutcomeKind::Respawn
    };
    state.pending = Some(PendingOutcome::new(kind, by, now_ms));
    events.push(SimEvent::Scored { by });
}

/// Armed goal save: cancel the concession and relaunch from the goal line.
fn trigger_save<R: Rng + ?Sized>(
    state: &mut GameState,
    side: Side,
    rng: &mut R,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    state.player_mut(side).save_armed = false;
    let ball = &mut state.ball;
    ball.vx = side.attack_direction() * config.save_return_speed;
    ball.vy = rng.random_range(-SAVE_VY_SPREAD..SAVE_VY_SPREAD);
    ball.x = match side {
        Side::Left => ball.radius + 1.0,
        Side::Right => config.arena_width - ball.radius - 1.0,
    };
    ball.attached = None;
    ball.launch = None;
    events.push(SimEvent::SaveTriggered { side });
}

/// Open the selection screen: freeze play, escalate the goal meter, and
/// draw each player's choices. Rerolls are granted to whoever trails.
pub fn open_selection<R: Rng + ?Sized>(
    state: &mut GameState,
    now_ms: f64,
    rng: &mut R,
    table: &EffectTable,
    allowed: Option<&[EffectId]>,
    config: &SimConfig,
) {
    state.phase = Phase::Selection { started_at: now_ms };
    state.pause_started_at = now_ms;
    state.points_since_selection = 0;
    state.selection_round += 1;
    state.points_needed = state.selection_round / 3 + 1;

    let (left_score, right_score) = (state.left.score, state.right.score);
    let left_rerolls = right_score.saturating_sub(left_score) / config.reroll_deficit_step;
    let right_rerolls = left_score.saturating_sub(right_score) / config.reroll_deficit_step;

    let left_choices = table.choices(
        rng,
        &state.left.effects,
        allowed,
        &[],
        state.left.stats.luck,
        config.selection_choice_count,
    );
    let right_choices = table.choices(
        rng,
        &state.right.effects,
        allowed,
        &[],
        state.right.stats.luck,
        config.selection_choice_count,
    );

    state.selection = Some(SelectionState {
        left: SelectionSlots {
            choices: left_choices,
            rerolls: left_rerolls,
            pick: None,
        },
        right: SelectionSlots {
            choices: right_choices,
            rerolls: right_rerolls,
            pick: None,
        },
    });
}

/// Once both players picked: unfreeze timers by the paused duration, apply
/// both effects, and start the respawn countdown.
pub fn resolve_selection(
    state: &mut GameState,
    now_ms: f64,
    table: &EffectTable,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    let Some(selection) = &state.selection else {
        return;
    };
    let (Some(left_pick), Some(right_pick)) =
        (selection.left.pick.clone(), selection.right.pick.clone())
    else {
        return;
    };

    if state.pause_started_at > 0.0 {
        let paused_for = now_ms - state.pause_started_at;
        state.shift_deadlines(paused_for);
        state.pause_started_at = 0.0;
    }

    state.selection = None;
    apply_effect(state, Side::Left, &left_pick, table, config, events);
    apply_effect(state, Side::Right, &right_pick, table, config, events);
    schedule_spawn(state, now_ms, config);
}

/// Record a selection pick if it is one of the offered choices.
pub fn record_pick(state: &mut GameState, side: Side, effect_id: &str, table: &EffectTable) {
    if table.get(effect_id).is_none() {
        tracing::debug!(side = ?side, effect_id, "Ignoring pick of unknown effect");
        return;
    }
    let Some(selection) = state.selection.as_mut() else {
        return;
    };
    let slots = match side {
        Side::Left => &mut selection.left,
        Side::Right => &mut selection.right,
    };
    if slots.pick.is_none() && slots.choices.iter().any(|c| c == effect_id) {
        slots.pick = Some(effect_id.to_string());
    }
}

/// Spend a reroll to replace one offered slot.
pub fn reroll_slot<R: Rng + ?Sized>(
    state: &mut GameState,
    side: Side,
    slot: usize,
    rng: &mut R,
    table: &EffectTable,
    allowed: Option<&[EffectId]>,
) {
    let (luck, owned) = {
        let player = state.player(side);
        (player.stats.luck, player.effects.clone())
    };
    let Some(selection) = state.selection.as_mut() else {
        return;
    };
    let slots = match side {
        Side::Left => &mut selection.left,
        Side::Right => &mut selection.right,
    };
    if slots.rerolls == 0 || slot >= slots.choices.len() || slots.pick.is_some() {
        return;
    }
    let current = slots.choices.clone();
    if let Some(replacement) = table.reroll(rng, &owned, allowed, &current, luck) {
        slots.choices[slot] = replacement;
        slots.rerolls -= 1;
    }
}

/// Apply one acquired effect generically from its table entry.
pub fn apply_effect(
    state: &mut GameState,
    side: Side,
    effect_id: &str,
    table: &EffectTable,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    let Some(def) = table.get(effect_id) else {
        tracing::warn!(side = ?side, effect_id, "Effect id missing from table");
        return;
    };

    {
        let player = state.player_mut(side);
        match player.effects.iter_mut().find(|e| e.id == effect_id) {
            Some(active) if active.stacks < def.max_stacks => active.stacks += 1,
            Some(_) => return,
            None => player.effects.push(ActiveEffect {
                id: effect_id.to_string(),
                stacks: 1,
            }),
        }
    }

    match def.effect {
        Effect::Stat(delta) => {
            let arena_height = config.arena_height;
            let player = state.player_mut(side);
            player.stats.attack += delta.attack;
            player.stats.crit_chance += delta.crit_chance;
            player.stats.crit_force += delta.crit_force;
            player.stats.move_speed += delta.move_speed;
            player.stats.luck += delta.luck;
            if delta.paddle_height != 0.0 {
                player.paddle.height += delta.paddle_height;
                // Grow from the center, not the top edge.
                player.paddle.y = (player.paddle.y - delta.paddle_height / 2.0)
                    .clamp(0.0, arena_height - player.paddle.height);
            }
            if delta.paddle_width != 0.0 {
                player.paddle.width += delta.paddle_width;
                if side == Side::Right {
                    player.paddle.x -= delta.paddle_width;
                }
            }
        },
        Effect::Spawn(SpawnAction::Wall {
            width,
            height,
            blocks,
            cooldown_ms,
        }) => {
            let id = state.next_wall_id;
            state.next_wall_id += 1;
            let x = match side {
                Side::Left => WALL_GOAL_DISTANCE,
                Side::Right => config.arena_width - WALL_GOAL_DISTANCE - width,
            };
            state.arena.walls.push(DeployableWall {
                id,
                owner: side,
                x,
                y: (config.arena_height - height) / 2.0,
                width,
                height,
                blocks_remaining: blocks,
                max_blocks: blocks,
                cooldown_until: 0.0,
                cooldown_ms,
            });
        },
        Effect::Ability(_) => {
            let cooldown_ms = def.cooldown_ms;
            let timer = state.player_mut(side).timer_mut(effect_id);
            timer.cooldown_ms = cooldown_ms;
        },
    }

    events.push(SimEvent::EffectApplied {
        side,
        id: effect_id.to_string(),
    });
}

/// Per-tick ability housekeeping: expire arena objects, regenerate wall
/// blocks, arm charge-based effects and autocast the periodic ones.
pub fn update_abilities<R: Rng + ?Sized>(
    state: &mut GameState,
    now_ms: f64,
    _rng: &mut R,
    table: &EffectTable,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    state.arena.wells.retain(|w| now_ms < w.expires_at);
    state.arena.seals.retain(|s| now_ms < s.expires_at);
    state.arena.beams.retain(|b| now_ms < b.expires_at);

    // Fire ripe beam charges, then keep beams glued to their paddle.
    let ripe: Vec<BeamCharge> = state
        .arena
        .beam_charges
        .iter()
        .copied()
        .filter(|c| now_ms >= c.fires_at)
        .collect();
    state.arena.beam_charges.retain(|c| now_ms < c.fires_at);
    for charge in ripe {
        let duration = table
            .get(ids::CHARGE_BEAM)
            .map(|d| d.duration_ms)
            .unwrap_or(0.0);
        let paddle_center = state.player(charge.owner).paddle.center_y();
        state.arena.beams.push(Beam {
            owner: charge.owner,
            y: paddle_center - BEAM_HEIGHT / 2.0,
            height: BEAM_HEIGHT,
            expires_at: now_ms + duration,
        });
    }
    let centers = (state.left.paddle.center_y(), state.right.paddle.center_y());
    for beam in &mut state.arena.beams {
        let center = match beam.owner {
            Side::Left => centers.0,
            Side::Right => centers.1,
        };
        beam.y = center - beam.height / 2.0;
    }

    for wall in &mut state.arena.walls {
        if wall.blocks_remaining == 0 && now_ms > wall.cooldown_until {
            wall.blocks_remaining = wall.max_blocks;
        }
    }

    for side in [Side::Left, Side::Right] {
        // Charge-based arming.
        if state.player(side).has_effect(ids::OVERDRIVE) {
            let player = state.player_mut(side);
            if !player.overdrive_armed && now_ms >= player.timer(ids::OVERDRIVE).ready_at {
                player.overdrive_armed = true;
            }
        }
        if state.player(side).has_effect(ids::GOAL_SAVE) {
            let arm_after = config.save_arm_after;
            let player = state.player_mut(side);
            if !player.save_armed && player.save_conceded >= arm_after {
                player.save_armed = true;
                player.save_conceded = 0;
            }
        }

        // Periodic autocasts.
        if state.player(side).has_effect(ids::ATTRACT_WELL)
            && now_ms >= state.player(side).timer(ids::ATTRACT_WELL).ready_at
        {
            let duration = table
                .get(ids::ATTRACT_WELL)
                .map(|d| d.duration_ms)
                .unwrap_or(0.0);
            state
                .arena
                .wells
                .retain(|w| !(w.owner == side && w.polarity == WellPolarity::Attract));
            let x = match side.opponent() {
                Side::Left => -WELL_GOAL_OFFSET,
                Side::Right => config.arena_width + WELL_GOAL_OFFSET,
            };
            state.arena.wells.push(Well {
                owner: side,
                polarity: WellPolarity::Attract,
                x,
                y: config.arena_height / 2.0,
                strength: WELL_STRENGTH,
                orbit: WELL_ORBIT,
                expires_at: now_ms + duration,
            });
            let timer = state.player_mut(side).timer_mut(ids::ATTRACT_WELL);
            timer.ready_at = now_ms + timer.cooldown_ms;
            timer.active_until = now_ms + duration;
            events.push(SimEvent::AbilityActivated {
                side,
                id: ids::ATTRACT_WELL.to_string(),
            });
        }
        if state.player(side).has_effect(ids::REPEL_WELL)
            && now_ms >= state.player(side).timer(ids::REPEL_WELL).ready_at
        {
            let duration = table
                .get(ids::REPEL_WELL)
                .map(|d| d.duration_ms)
                .unwrap_or(0.0);
            state
                .arena
                .wells
                .retain(|w| !(w.owner == side && w.polarity == WellPolarity::Repel));
            let x = match side {
                Side::Left => -WELL_GOAL_OFFSET,
                Side::Right => config.arena_width + WELL_GOAL_OFFSET,
            };
            state.arena.wells.push(Well {
                owner: side,
                polarity: WellPolarity::Repel,
                x,
                y: config.arena_height / 2.0,
                strength: WELL_STRENGTH,
                orbit: 0.0,
                expires_at: now_ms + duration,
            });
            let timer = state.player_mut(side).timer_mut(ids::REPEL_WELL);
            timer.ready_at = now_ms + timer.cooldown_ms;
            timer.active_until = now_ms + duration;
            events.push(SimEvent::AbilityActivated {
                side,
                id: ids::REPEL_WELL.to_string(),
            });
        }
        if state.player(side).has_effect(ids::MIDLINE_SEAL)
            && now_ms >= state.player(side).timer(ids::MIDLINE_SEAL).ready_at
        {
            let duration = table
                .get(ids::MIDLINE_SEAL)
                .map(|d| d.duration_ms)
                .unwrap_or(0.0);
            state.arena.seals.push(MidlineSeal {
                owner: side,
                expires_at: now_ms + duration,
            });
            let timer = state.player_mut(side).timer_mut(ids::MIDLINE_SEAL);
            timer.ready_at = now_ms + timer.cooldown_ms;
            events.push(SimEvent::AbilityActivated {
                side,
                id: ids::MIDLINE_SEAL.to_string(),
            });
        }
        if state.player(side).has_effect(ids::CHARGE_BEAM)
            && now_ms >= state.player(side).timer(ids::CHARGE_BEAM).ready_at
        {
            state.arena.beam_charges.push(BeamCharge {
                owner: side,
                fires_at: now_ms + BEAM_CHARGE_MS,
            });
            let timer = state.player_mut(side).timer_mut(ids::CHARGE_BEAM);
            timer.ready_at = now_ms + timer.cooldown_ms;
            events.push(SimEvent::AbilityActivated {
                side,
                id: ids::CHARGE_BEAM.to_string(),
            });
        }
    }
}

/// Manual ability trigger. Only paddle tracking is client-activated; the
/// rest arm or cast on their own timers.
pub fn activate_ability(
    state: &mut GameState,
    side: Side,
    effect_id: &str,
    now_ms: f64,
    table: &EffectTable,
    events: &mut Vec<SimEvent>,
) {
    let Some(def) = table.get(effect_id) else {
        return;
    };
    if !matches!(def.effect, Effect::Ability(AbilityKind::Tracking)) {
        return;
    }
    let player = state.player_mut(side);
    if player.has_effect(effect_id)
        && !player.tracking_active
        && now_ms >= player.timer(effect_id).ready_at
    {
        player.tracking_active = true;
        player.tracking_charges = TRACKING_CHARGES;
        events.push(SimEvent::AbilityActivated {
            side,
            id: effect_id.to_string(),
        });
    }
}

/// Forced reset after a long rally drought.
pub fn check_stalemate<R: Rng + ?Sized>(
    state: &mut GameState,
    now_ms: f64,
    rng: &mut R,
    config: &SimConfig,
    events: &mut Vec<SimEvent>,
) {
    if !matches!(state.phase, Phase::Live) {
        return;
    }
    if now_ms - state.ball.last_paddle_hit_at > config.stalemate_timeout_ms {
        let direction = if state.ball.vx > 0.0 { 1.0 } else { -1.0 };
        reset_ball(state, now_ms, direction, rng, config);
        events.push(SimEvent::StalemateReset);
    }
}

/// First player at the target score ends the match, once, unless endless
/// mode suppresses the check entirely.
pub fn check_win(state: &mut GameState, config: &SimConfig, events: &mut Vec<SimEvent>) {
    if state.endless || !matches!(state.phase, Phase::Live) {
        return;
    }
    let winner = if state.left.score >= config.winning_score {
        Some(Side::Left)
    } else if state.right.score >= config.winning_score {
        Some(Side::Right)
    } else {
        None
    };
    if let Some(winner) = winner {
        state.phase = Phase::Over { winner };
        events.push(SimEvent::MatchOver { winner });
    }
}
