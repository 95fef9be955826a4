use serde::{Deserialize, Serialize};

/// Data-driven tuning for the authoritative simulation.
///
/// Distances are in pixels, speeds in px/s, durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Arena width.
    pub arena_width: f32,
    /// Arena height.
    pub arena_height: f32,
    /// Paddle collider width.
    pub paddle_width: f32,
    /// Starting paddle height.
    pub paddle_height: f32,
    /// Gap between a goal line and its paddle face.
    pub paddle_margin: f32,
    /// Ball collider radius.
    pub ball_radius: f32,
    /// Serve speed at match start.
    pub initial_ball_speed: f32,
    /// Hard speed reference used by the hit throttle and drag curves.
    pub max_ball_speed: f32,
    /// Serve speed gained per completed selection round.
    pub speed_per_round: f32,
    /// Vertical serve velocity is drawn from +/- this value.
    pub serve_vy_spread: f32,
    /// Maximum bounce deflection off a paddle (radians).
    pub max_bounce_angle: f32,
    /// Starting attack multiplier applied to ball speed on hit.
    pub attack_initial: f32,
    /// Starting critical-hit probability.
    pub crit_chance_initial: f32,
    /// Bonus applied to the attack bonus on a critical hit.
    pub crit_force_initial: f32,
    /// Paddle travel speed (px/s), used by clients for local movement.
    pub move_speed_initial: f32,
    /// Starting luck stat (biases selection choices).
    pub luck_initial: f32,
    /// Speed multiplier consumed by an armed overdrive hit.
    pub overdrive_multiplier: f32,
    /// Speed multiplier consumed by a ready double strike.
    pub double_strike_multiplier: f32,
    /// Outgoing x-speed of a goal-line save relaunch.
    pub save_return_speed: f32,
    /// Goals conceded before a goal save arms itself.
    pub save_arm_after: u32,
    /// Score that ends the match outside endless mode.
    pub winning_score: u32,
    /// Ball respawn countdown.
    pub spawn_countdown_ms: f64,
    /// Window a pending outcome waits for late inputs before committing.
    pub confirmation_delay_ms: f64,
    /// Retention window of the rewind history buffer.
    pub history_window_ms: f64,
    /// Idle time without a paddle touch before a forced ball reset.
    pub stalemate_timeout_ms: f64,
    /// Choices offered per player on the selection screen.
    pub selection_choice_count: usize,
    /// One reroll is granted per this many points of score deficit.
    pub reroll_deficit_step: u32,
    /// Sub-times scanned between bracketing snapshots during a rewind.
    pub rewind_substeps: u32,
    /// Fixed step used to fast-forward the ball after a rewind hit.
    pub resim_step_ms: f64,
    /// Remote paddle blend half-life (also used host-side as the paddle
    /// integrator toward the reported target).
    pub paddle_half_life_ms: f64,
    /// Authoritative tick rate.
    pub tick_rate_hz: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena_width: 1024.0,
            arena_height: 768.0,
            paddle_width: 20.0,
            paddle_height: 120.0,
            paddle_margin: 20.0,
            ball_radius: 10.0,
            initial_ball_speed: 300.0,
            max_ball_speed: 1500.0,
            speed_per_round: 12.0,
            serve_vy_spread: 120.0,
            max_bounce_angle: std::f32::consts::FRAC_PI_4,
            attack_initial: 1.05,
            crit_chance_initial: 0.0,
            crit_force_initial: 0.25,
            move_speed_initial: 400.0,
            luck_initial: 0.0,
            overdrive_multiplier: 2.0,
            double_strike_multiplier: 1.5,
            save_return_speed: 420.0,
            save_arm_after: 5,
            winning_score: 100,
            spawn_countdown_ms: 1_500.0,
            confirmation_delay_ms: 200.0,
            history_window_ms: 300.0,
            stalemate_timeout_ms: 15_000.0,
            selection_choice_count: 3,
            reroll_deficit_step: 5,
            rewind_substeps: 5,
            resim_step_ms: 1_000.0 / 60.0,
            paddle_half_life_ms: 75.0,
            tick_rate_hz: 20,
        }
    }
}

impl SimConfig {
    /// Load config from environment or TOML file, falling back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("RICOCHET_SIM_CONFIG")
            && let Ok(contents) = std::fs::read_to_string(&path)
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        if let Ok(contents) = std::fs::read_to_string("config/sim.toml")
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        Self::default()
    }

    /// Substep length threshold: half the thinnest collider dimension so a
    /// fast ball cannot cross a paddle in a single motion step.
    pub fn substep_threshold(&self) -> f32 {
        self.paddle_width / 2.0
    }

    /// Paddle x position for the given goal side.
    pub fn paddle_x(&self, side: ricochet_core::player::Side) -> f32 {
        match side {
            ricochet_core::player::Side::Left => self.paddle_margin,
            ricochet_core::player::Side::Right => {
                self.arena_width - self.paddle_margin - self.paddle_width
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ricochet_core::player::Side;

    #[test]
    fn defaults_are_consistent() {
        let c = SimConfig::default();
        assert!(c.substep_threshold() > 0.0);
        assert!(c.paddle_x(Side::Right) > c.paddle_x(Side::Left));
        assert!(c.paddle_x(Side::Right) + c.paddle_width < c.arena_width);
    }

    #[test]
    fn toml_override_parses() {
        let parsed: SimConfig = toml::from_str("winning_score = 11\n").unwrap();
        assert_eq!(parsed.winning_score, 11);
        // untouched fields fall back to defaults
        assert_eq!(parsed.tick_rate_hz, 20);
    }
}
