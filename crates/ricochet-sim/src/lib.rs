pub mod config;
pub mod effects;
pub mod events;
pub mod history;
pub mod pending;
pub mod physics;
pub mod reconcile;
pub mod rules;

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use ricochet_core::player::Side;

use config::SimConfig;
use effects::{ActiveEffect, EffectId, EffectTable};
use events::SimEvent;
use history::HistoryBuffer;
use pending::{OutcomeKind, PendingOutcome};

/// A paddle. `y` is the simulated position; `target_y` is the latest
/// client-reported position the simulation converges toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub target_y: f32,
    pub vy: f32,
}

impl Paddle {
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// Per-player stat multipliers modified by stacked effects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub attack: f32,
    pub crit_chance: f32,
    pub crit_force: f32,
    pub move_speed: f32,
    pub luck: f32,
}

/// Absolute-deadline timer pair for one ability effect. Deadlines are match
/// clock milliseconds; 0 means unset. Storing deadlines rather than
/// countdowns lets a pause shift every timer in one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityTimer {
    pub ready_at: f64,
    pub active_until: f64,
    /// Cooldown length copied from the effect table at acquisition time.
    pub cooldown_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub side: Side,
    pub score: u32,
    pub paddle: Paddle,
    pub stats: Stats,
    pub effects: Vec<ActiveEffect>,
    pub timers: HashMap<EffectId, AbilityTimer>,
    /// Overdrive charge waiting to be consumed by the next hit.
    pub overdrive_armed: bool,
    /// One boosted return owed after conceding a goal.
    pub double_strike_ready: bool,
    /// Goal save ready to cancel the next concession.
    pub save_armed: bool,
    /// Goals conceded toward arming the save.
    pub save_conceded: u32,
    pub tracking_active: bool,
    pub tracking_charges: u32,
}

impl PlayerState {
    pub fn new(side: Side, config: &SimConfig) -> Self {
        Self {
            side,
            score: 0,
            paddle: Paddle {
                x: config.paddle_x(side),
                y: (config.arena_height - config.paddle_height) / 2.0,
                width: config.paddle_width,
                height: config.paddle_height,
                target_y: (config.arena_height - config.paddle_height) / 2.0,
                vy: 0.0,
            },
            stats: Stats {
                attack: config.attack_initial,
                crit_chance: config.crit_chance_initial,
                crit_force: config.crit_force_initial,
                move_speed: config.move_speed_initial,
                luck: config.luck_initial,
            },
            effects: Vec::new(),
            timers: HashMap::new(),
            overdrive_armed: false,
            double_strike_ready: false,
            save_armed: false,
            save_conceded: 0,
            tracking_active: false,
            tracking_charges: 0,
        }
    }

    pub fn has_effect(&self, id: &str) -> bool {
        self.effects.iter().any(|e| e.id == id)
    }

    pub fn effect_stacks(&self, id: &str) -> u32 {
        self.effects
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.stacks)
            .unwrap_or(0)
    }

    pub fn timer(&self, id: &str) -> AbilityTimer {
        self.timers.get(id).copied().unwrap_or_default()
    }

    pub fn timer_mut(&mut self, id: &str) -> &mut AbilityTimer {
        self.timers.entry(id.to_string()).or_default()
    }
}

/// Ball stuck to a paddle, waiting for its scheduled release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attached {
    pub owner: Side,
    /// When the release sequence begins.
    pub release_at: f64,
    /// Set once the release sequence has started; 0 until then.
    pub release_started_at: f64,
    /// Paddle y at release start; its movement during the hold steers the
    /// launch angle.
    pub hold_start_y: Option<f32>,
    /// Incoming speed captured at attach time.
    pub captured_speed: f32,
}

/// Short velocity ease applied when a held ball launches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub from_vx: f32,
    pub from_vy: f32,
    pub to_vx: f32,
    pub to_vy: f32,
    pub started_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    /// Owner attribution for scoring, wrap and seal checks.
    pub last_hit_by: Option<Side>,
    pub last_paddle_hit_at: f64,
    pub last_beam_hit_at: f64,
    pub attached: Option<Attached>,
    pub launch: Option<Launch>,
}

impl Ball {
    /// A motionless ball parked above the arena (pre-serve position).
    pub fn parked(radius: f32) -> Self {
        Self {
            x: 512.0,
            y: -100.0,
            vx: 0.0,
            vy: 0.0,
            radius,
            last_hit_by: None,
            last_paddle_hit_at: 0.0,
            last_beam_hit_at: 0.0,
            attached: None,
            launch: None,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WellPolarity {
    Attract,
    Repel,
}

/// Field-force emitter parked behind one of the goals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Well {
    pub owner: Side,
    pub polarity: WellPolarity,
    pub x: f32,
    pub y: f32,
    /// Peak acceleration scale.
    pub strength: f32,
    /// Tangential component (attracting wells only).
    pub orbit: f32,
    pub expires_at: f64,
}

/// Destructible wall deployed in front of its owner's goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableWall {
    pub id: u32,
    pub owner: Side,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub blocks_remaining: u32,
    pub max_blocks: u32,
    pub cooldown_until: f64,
    pub cooldown_ms: f64,
}

/// Horizontal beam that tracks its owner's paddle and deflects the ball
/// toward the opponent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub owner: Side,
    pub y: f32,
    pub height: f32,
    pub expires_at: f64,
}

/// Windup preceding a beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamCharge {
    pub owner: Side,
    pub fires_at: f64,
}

/// Midline barrier that bounces back returns from the non-owning side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidlineSeal {
    pub owner: Side,
    pub expires_at: f64,
}

/// Transient arena objects spawned by effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaState {
    pub wells: Vec<Well>,
    pub walls: Vec<DeployableWall>,
    pub beams: Vec<Beam>,
    pub beam_charges: Vec<BeamCharge>,
    pub seals: Vec<MidlineSeal>,
}

/// Coarse simulation phase. `pending` outcomes are orthogonal: a goal keeps
/// the phase Live until the gate confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    /// Respawn countdown; ball is parked.
    Spawn { started_at: f64 },
    Live,
    /// Selection screen is open; gameplay timers are frozen via the pause
    /// deadline shift when it closes.
    Selection { started_at: f64 },
    Over { winner: Side },
}

/// One player's selection offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSlots {
    pub choices: Vec<EffectId>,
    pub rerolls: u32,
    pub pick: Option<EffectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionState {
    pub left: SelectionSlots,
    pub right: SelectionSlots,
}

/// The entire authoritative match state. Exactly one instance lives on the
/// host; clients hold derived visual copies updated through snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub ball: Ball,
    pub left: PlayerState,
    pub right: PlayerState,
    pub arena: ArenaState,
    pub phase: Phase,
    pub pending: Option<PendingOutcome>,
    pub selection: Option<SelectionState>,
    pub points_since_selection: u32,
    pub points_needed: u32,
    pub selection_round: u32,
    pub endless: bool,
    /// Match clock ms when the current pause began; 0 while unpaused.
    pub pause_started_at: f64,
    pub next_wall_id: u32,
}

impl GameState {
    pub fn new(config: &SimConfig) -> Self {
        let mut ball = Ball::parked(config.ball_radius);
        ball.x = config.arena_width / 2.0;
        Self {
            ball,
            left: PlayerState::new(Side::Left, config),
            right: PlayerState::new(Side::Right, config),
            arena: ArenaState::default(),
            phase: Phase::Spawn { started_at: 0.0 },
            pending: None,
            selection: None,
            points_since_selection: 0,
            points_needed: 1,
            selection_round: 0,
            endless: false,
            pause_started_at: 0.0,
            next_wall_id: 1,
        }
    }

    pub fn player(&self, side: Side) -> &PlayerState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn player_mut(&mut self, side: Side) -> &mut PlayerState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Shift every non-zero absolute deadline forward by `by_ms` in one
    /// sweep, so a pause never silently eats cooldowns or expiries.
    pub fn shift_deadlines(&mut self, by_ms: f64) {
        for player in [&mut self.left, &mut self.right] {
            for timer in player.timers.values_mut() {
                if timer.ready_at > 0.0 {
                    timer.ready_at += by_ms;
                }
                if timer.active_until > 0.0 {
                    timer.active_until += by_ms;
                }
            }
        }
        if let Some(attached) = &mut self.ball.attached {
            attached.release_at += by_ms;
            if attached.release_started_at > 0.0 {
                attached.release_started_at += by_ms;
            }
        }
        for well in &mut self.arena.wells {
            well.expires_at += by_ms;
        }
        for beam in &mut self.arena.beams {
            beam.expires_at += by_ms;
        }
        for charge in &mut self.arena.beam_charges {
            charge.fires_at += by_ms;
        }
        for seal in &mut self.arena.seals {
            seal.expires_at += by_ms;
        }
        for wall in &mut self.arena.walls {
            if wall.cooldown_until > 0.0 {
                wall.cooldown_until += by_ms;
            }
        }
    }
}

/// One queued paddle movement report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleInput {
    pub y: f32,
    pub vy: f32,
    pub client_timestamp: f64,
}

/// The authoritative simulator. Owns the tuning, the effect lookup, the
/// rewind history and the RNG; the match state itself is owned by the host
/// loop and passed in exclusively each tick.
pub struct Simulator {
    config: SimConfig,
    table: EffectTable,
    allowed_effects: Option<Vec<EffectId>>,
    history: HistoryBuffer,
    rng: StdRng,
}

impl Simulator {
    pub fn new(config: SimConfig, table: EffectTable, allowed_effects: Option<Vec<EffectId>>) -> Self {
        let history = HistoryBuffer::new(config.history_window_ms);
        Self {
            config,
            table,
            allowed_effects,
            history,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic construction for tests and replays.
    pub fn with_seed(
        config: SimConfig,
        table: EffectTable,
        allowed_effects: Option<Vec<EffectId>>,
        seed: u64,
    ) -> Self {
        let history = HistoryBuffer::new(config.history_window_ms);
        Self {
            config,
            table,
            allowed_effects,
            history,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Advance the match by one tick. Inputs are everything that arrived
    /// since the previous tick, in arrival order (last one wins for the
    /// paddle target).
    pub fn step(
        &mut self,
        state: &mut GameState,
        dt: f32,
        now_ms: f64,
        inputs: &[(Side, PaddleInput)],
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();

        if let Phase::Over { .. } = state.phase {
            return events;
        }

        self.history.push(now_ms, state.ball.clone());

        for (side, input) in inputs {
            reconcile::apply_paddle_input(
                state,
                &self.history,
                *side,
                input,
                now_ms,
                &self.config,
                &mut self.rng,
                &mut events,
            );
        }

        // Two-phase gate: commit the deferred transition only after the
        // confirmation window passed without a contradicting rewind.
        if let Some(p) = state.pending
            && p.ripe(now_ms, self.config.confirmation_delay_ms)
        {
            state.pending = None;
            match p.kind {
                OutcomeKind::Selection => {
                    if state.points_since_selection >= state.points_needed {
                        rules::open_selection(
                            state,
                            now_ms,
                            &mut self.rng,
                            &self.table,
                            self.allowed_effects.as_deref(),
                            &self.config,
                        );
                        events.push(SimEvent::SelectionOpened);
                    }
                },
                OutcomeKind::Respawn => {
                    if state.selection.is_none() {
                        rules::schedule_spawn(state, now_ms, &self.config);
                    }
                },
            }
        }

        match state.phase {
            Phase::Over { .. } => return events,
            Phase::Spawn { started_at } => {
                if now_ms - started_at >= self.config.spawn_countdown_ms {
                    let direction = if rand::Rng::random_bool(&mut self.rng, 0.5) {
                        1.0
                    } else {
                        -1.0
                    };
                    rules::reset_ball(state, now_ms, direction, &mut self.rng, &self.config);
                    state.phase = Phase::Live;
                    events.push(SimEvent::BallRespawned);
                }
                return events;
            },
            Phase::Selection { .. } => {
                rules::resolve_selection(state, now_ms, &self.table, &self.config, &mut events);
                return events;
            },
            Phase::Live => {},
        }

        physics::advance_paddles(state, dt, &self.config);
        rules::update_abilities(
            state,
            now_ms,
            &mut self.rng,
            &self.table,
            &self.config,
            &mut events,
        );
        physics::step_ball(state, dt, now_ms, &mut self.rng, &self.config, &mut events);
        rules::detect_goal(state, now_ms, &mut self.rng, &self.config, &mut events);
        rules::check_stalemate(state, now_ms, &mut self.rng, &self.config, &mut events);
        rules::check_win(state, &self.config, &mut events);

        events
    }

    /// Selection-screen pick from one player.
    pub fn choose_item(&mut self, state: &mut GameState, side: Side, effect_id: &str) {
        rules::record_pick(state, side, effect_id, &self.table);
    }

    /// Reroll one selection slot.
    pub fn reroll_item(&mut self, state: &mut GameState, side: Side, slot: usize) {
        rules::reroll_slot(
            state,
            side,
            slot,
            &mut self.rng,
            &self.table,
            self.allowed_effects.as_deref(),
        );
    }

    /// Manual ability trigger (currently only paddle tracking).
    pub fn activate_ability(
        &mut self,
        state: &mut GameState,
        side: Side,
        effect_id: &str,
        now_ms: f64,
        events: &mut Vec<SimEvent>,
    ) {
        rules::activate_ability(state, side, effect_id, now_ms, &self.table, events);
    }

    /// Post-match continue: unfreeze the match with win checks disabled.
    pub fn continue_endless(&mut self, state: &mut GameState, now_ms: f64) {
        if let Phase::Over { .. } = state.phase {
            state.endless = true;
            rules::schedule_spawn(state, now_ms, &self.config);
        }
    }

    /// Serialize the authoritative state for network broadcast.
    pub fn serialize_state(state: &GameState) -> Vec<u8> {
        rmp_serde::to_vec(state).expect("game state serialization must succeed")
    }

    pub fn deserialize_state(data: &[u8]) -> Option<GameState> {
        rmp_serde::from_slice(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::ids;

    fn setup() -> (Simulator, GameState) {
        let config = SimConfig::default();
        let state = GameState::new(&config);
        let sim = Simulator::with_seed(config, EffectTable::builtin(), None, 42);
        (sim, state)
    }

    #[test]
    fn state_roundtrips_through_msgpack() {
        let (_, state) = setup();
        let bytes = Simulator::serialize_state(&state);
        let decoded = Simulator::deserialize_state(&bytes).expect("state must decode");
        assert_eq!(state, decoded);
    }

    #[test]
    fn spawn_countdown_leads_to_live_ball() {
        let (mut sim, mut state) = setup();
        let mut now = 0.0;
        let mut respawned = false;
        for _ in 0..60 {
            now += 50.0;
            let events = sim.step(&mut state, 0.05, now, &[]);
            if events.contains(&SimEvent::BallRespawned) {
                respawned = true;
                break;
            }
        }
        assert!(respawned, "spawn countdown never completed");
        assert_eq!(state.phase, Phase::Live);
        assert!(state.ball.speed() > 0.0, "serve must seed a velocity");
    }

    #[test]
    fn shift_deadlines_moves_every_timer() {
        let (_, mut state) = setup();
        state.left.timer_mut(ids::OVERDRIVE).ready_at = 10_000.0;
        state.right.timer_mut(ids::ATTRACT_WELL).active_until = 12_000.0;
        state.arena.seals.push(MidlineSeal {
            owner: Side::Left,
            expires_at: 9_000.0,
        });
        state.arena.walls.push(DeployableWall {
            id: 1,
            owner: Side::Right,
            x: 900.0,
            y: 300.0,
            width: 10.0,
            height: 80.0,
            blocks_remaining: 0,
            max_blocks: 3,
            cooldown_until: 20_000.0,
            cooldown_ms: 15_000.0,
        });

        state.shift_deadlines(500.0);

        assert_eq!(state.left.timer(ids::OVERDRIVE).ready_at, 10_500.0);
        assert_eq!(state.right.timer(ids::ATTRACT_WELL).active_until, 12_500.0);
        assert_eq!(state.arena.seals[0].expires_at, 9_500.0);
        assert_eq!(state.arena.walls[0].cooldown_until, 20_500.0);
    }

    #[test]
    fn shift_deadlines_skips_unset_timers() {
        let (_, mut state) = setup();
        state.left.timer_mut(ids::OVERDRIVE).ready_at = 0.0;
        state.shift_deadlines(500.0);
        assert_eq!(
            state.left.timer(ids::OVERDRIVE).ready_at,
            0.0,
            "unset deadline must stay unset"
        );
    }

    #[test]
    fn step_is_inert_after_match_over() {
        let (mut sim, mut state) = setup();
        state.phase = Phase::Over { winner: Side::Left };
        let before = state.clone();
        let events = sim.step(&mut state, 0.05, 99_999.0, &[]);
        assert!(events.is_empty());
        assert_eq!(state, before, "no mutation after match end");
    }
}
