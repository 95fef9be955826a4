pub mod interpolator;
pub mod predictor;
pub mod view;

use serde::{Deserialize, Serialize};

/// Smoothing tunables for the client-side mirror.
///
/// The ball gets a longer half-life than paddles: prediction errors on the
/// ball read as jitter and tolerate more latency, while paddles need to feel
/// snappy at the cost of showing more correction on a bad link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub ball_half_life_ms: f64,
    pub paddle_half_life_ms: f64,
    /// Residual below which a resting remote paddle snaps to its target.
    pub snap_epsilon: f32,
    /// Fraction of the arena height treated as a teleport discontinuity.
    pub teleport_fraction: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ball_half_life_ms: 120.0,
            paddle_half_life_ms: 75.0,
            snap_epsilon: 0.5,
            teleport_fraction: 0.8,
        }
    }
}
