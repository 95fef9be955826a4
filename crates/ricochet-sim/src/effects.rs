use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a selectable effect.
pub type EffectId = String;

/// Canonical effect ids used by the built-in table. The simulator only keys
/// behavior off these constants; balance data lives in the table entries.
pub mod ids {
    pub const ATTACK_UP: &str = "attack_up";
    pub const PADDLE_TALL: &str = "paddle_tall";
    pub const PADDLE_WIDE: &str = "paddle_wide";
    pub const CRIT_CHANCE: &str = "crit_chance";
    pub const MOVE_SPEED: &str = "move_speed";
    pub const LUCKY: &str = "lucky";
    pub const OVERDRIVE: &str = "overdrive";
    pub const STICKY_PADDLE: &str = "sticky_paddle";
    pub const GOAL_SAVE: &str = "goal_save";
    pub const DOUBLE_STRIKE: &str = "double_strike";
    pub const WRAP_FIELD: &str = "wrap_field";
    pub const TRACKING: &str = "tracking";
    pub const ATTRACT_WELL: &str = "attract_well";
    pub const REPEL_WELL: &str = "repel_well";
    pub const MIDLINE_SEAL: &str = "midline_seal";
    pub const CHARGE_BEAM: &str = "charge_beam";
    pub const BARRIER_WALL: &str = "barrier_wall";
}

/// Additive stat changes applied once per acquired stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatDelta {
    pub attack: f32,
    pub crit_chance: f32,
    pub crit_force: f32,
    pub move_speed: f32,
    pub luck: f32,
    pub paddle_height: f32,
    pub paddle_width: f32,
}

/// Arena object spawned immediately when the effect is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpawnAction {
    /// Defensive wall planted in front of the owner's goal.
    Wall {
        width: f32,
        height: f32,
        blocks: u32,
        cooldown_ms: f64,
    },
}

/// Timer- or flag-driven behavior the simulator executes generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Arms on cooldown; the next hit is multiplied and consumes the charge.
    Overdrive,
    /// Paddle captures the ball, releasing it after a short hold.
    Sticky,
    /// Arms after conceding enough goals; cancels one goal with a relaunch.
    Save,
    /// Next hit after conceding is boosted once.
    DoubleStrike,
    /// Top/bottom walls wrap instead of reflecting while the owner holds
    /// last-hit attribution.
    Wrap,
    /// Manually activated ball-following paddle with limited charges.
    Tracking,
    /// Periodically casts a pulling well behind the opponent's goal.
    AttractWell,
    /// Periodically casts a pushing well behind the owner's goal.
    RepelWell,
    /// Periodically seals the midline against opposing returns.
    MidlineSeal,
    /// Periodically charges and fires a paddle-tracking beam.
    Beam,
}

/// The effect variants the simulator knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Stat(StatDelta),
    Spawn(SpawnAction),
    Ability(AbilityKind),
}

/// One table entry: what the effect does plus its stacking and timing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDef {
    pub effect: Effect,
    pub max_stacks: u32,
    /// Cooldown for ability-kind effects (0 when not applicable).
    pub cooldown_ms: f64,
    /// Active duration for ability-kind effects (0 when not applicable).
    pub duration_ms: f64,
    /// Selection weight; higher values surface more often for lucky players.
    pub weight: u32,
}

/// One acquired effect with its stack count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub id: EffectId,
    pub stacks: u32,
}

/// Read-only id -> effect lookup consumed by the simulator. Content balance
/// is owned elsewhere; the simulator applies whatever the table describes.
#[derive(Debug, Clone)]
pub struct EffectTable {
    defs: HashMap<EffectId, EffectDef>,
}

impl EffectTable {
    pub fn new(defs: HashMap<EffectId, EffectDef>) -> Self {
        Self { defs }
    }

    pub fn get(&self, id: &str) -> Option<&EffectDef> {
        self.defs.get(id)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Draw `count` distinct selection choices for a player.
    ///
    /// Effects already at max stacks and ids outside `allowed` (when a
    /// restriction set is configured) are excluded. Luck adds extra weighted
    /// draws, keeping the best-weighted candidates.
    pub fn choices<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        owned: &[ActiveEffect],
        allowed: Option<&[EffectId]>,
        exclude: &[EffectId],
        luck: f32,
        count: usize,
    ) -> Vec<EffectId> {
        let mut pool: Vec<(&EffectId, u32)> = self
            .defs
            .iter()
            .filter(|(id, def)| {
                let stacks = owned
                    .iter()
                    .find(|e| &e.id == *id)
                    .map(|e| e.stacks)
                    .unwrap_or(0);
                if stacks >= def.max_stacks {
                    return false;
                }
                if exclude.iter().any(|x| x == *id) {
                    return false;
                }
                match allowed {
                    Some(set) => set.iter().any(|a| a == *id),
                    None => true,
                }
            })
            .map(|(id, def)| (id, def.weight))
            .collect();

        let mut picked = Vec::with_capacity(count);
        let extra_draws = (luck * 10.0).max(0.0) as usize;
        while picked.len() < count && !pool.is_empty() {
            // Weighted draw, with luck granting re-draws that keep the
            // heavier-weighted result.
            let mut best: Option<usize> = None;
            for _ in 0..=extra_draws {
                let total: u32 = pool.iter().map(|(_, w)| *w).sum();
                if total == 0 {
                    break;
                }
                let mut roll = rng.random_range(0..total);
                let mut idx = 0;
                for (i, (_, w)) in pool.iter().enumerate() {
                    if roll < *w {
                        idx = i;
                        break;
                    }
                    roll -= *w;
                }
                best = match best {
                    Some(b) if pool[b].1 >= pool[idx].1 => Some(b),
                    _ => Some(idx),
                };
            }
            let Some(idx) = best else { break };
            let (id, _) = pool.remove(idx);
            picked.push(id.clone());
        }
        picked
    }

    /// Draw a single replacement choice for a reroll, excluding the slots
    /// currently on offer.
    pub fn reroll<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        owned: &[ActiveEffect],
        allowed: Option<&[EffectId]>,
        current: &[EffectId],
        luck: f32,
    ) -> Option<EffectId> {
        self.choices(rng, owned, allowed, current, luck, 1)
            .into_iter()
            .next()
    }

    /// The built-in effect catalog. Serves as default match content and as
    /// the fixture for tests; a deployment can inject its own table.
    pub fn builtin() -> Self {
        let mut defs = HashMap::new();
        let mut stat = |id: &str, delta: StatDelta, max_stacks: u32, weight: u32| {
            defs.insert(
                id.to_string(),
                EffectDef {
                    effect: Effect::Stat(delta),
                    max_stacks,
                    cooldown_ms: 0.0,
                    duration_ms: 0.0,
                    weight,
                },
            );
        };
        stat(
            ids::ATTACK_UP,
            StatDelta {
                attack: 0.05,
                ..StatDelta::default()
            },
            10,
            100,
        );
        stat(
            ids::PADDLE_TALL,
            StatDelta {
                paddle_height: 25.0,
                ..StatDelta::default()
            },
            6,
            100,
        );
        stat(
            ids::PADDLE_WIDE,
            StatDelta {
                paddle_width: 5.0,
                ..StatDelta::default()
            },
            4,
            80,
        );
        stat(
            ids::CRIT_CHANCE,
            StatDelta {
                crit_chance: 0.05,
                crit_force: 0.05,
                ..StatDelta::default()
            },
            8,
            80,
        );
        stat(
            ids::MOVE_SPEED,
            StatDelta {
                move_speed: 50.0,
                ..StatDelta::default()
            },
            6,
            90,
        );
        stat(
            ids::LUCKY,
            StatDelta {
                luck: 0.1,
                ..StatDelta::default()
            },
            5,
            60,
        );

        let mut ability =
            |id: &str, kind: AbilityKind, cooldown_ms: f64, duration_ms: f64, weight: u32| {
                defs.insert(
                    id.to_string(),
                    EffectDef {
                        effect: Effect::Ability(kind),
                        max_stacks: 1,
                        cooldown_ms,
                        duration_ms,
                        weight,
                    },
                );
            };
        ability(ids::OVERDRIVE, AbilityKind::Overdrive, 20_000.0, 0.0, 50);
        ability(ids::STICKY_PADDLE, AbilityKind::Sticky, 0.0, 0.0, 40);
        ability(ids::GOAL_SAVE, AbilityKind::Save, 0.0, 0.0, 40);
        ability(ids::DOUBLE_STRIKE, AbilityKind::DoubleStrike, 0.0, 0.0, 40);
        ability(ids::WRAP_FIELD, AbilityKind::Wrap, 0.0, 0.0, 25);
        ability(ids::TRACKING, AbilityKind::Tracking, 45_000.0, 0.0, 15);
        ability(
            ids::ATTRACT_WELL,
            AbilityKind::AttractWell,
            40_000.0,
            7_000.0,
            15,
        );
        ability(
            ids::REPEL_WELL,
            AbilityKind::RepelWell,
            40_000.0,
            7_000.0,
            15,
        );
        ability(
            ids::MIDLINE_SEAL,
            AbilityKind::MidlineSeal,
            35_000.0,
            5_000.0,
            20,
        );
        ability(ids::CHARGE_BEAM, AbilityKind::Beam, 10_000.0, 2_000.0, 20);

        defs.insert(
            ids::BARRIER_WALL.to_string(),
            EffectDef {
                effect: Effect::Spawn(SpawnAction::Wall {
                    width: 10.0,
                    height: 80.0,
                    blocks: 3,
                    cooldown_ms: 15_000.0,
                }),
                max_stacks: 1,
                cooldown_ms: 0.0,
                duration_ms: 0.0,
                weight: 30,
            },
        );

        Self { defs }
    }
}
