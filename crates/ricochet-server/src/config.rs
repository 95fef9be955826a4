use serde::Deserialize;

use ricochet_sim::config::SimConfig;

/// Top-level server configuration, loaded from `ricochet.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub sim: SimConfig,
    /// Restrict matches to this effect set; `None` allows the whole table.
    pub allowed_effects: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            sim: SimConfig::default(),
            allowed_effects: None,
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            ws_rate_limit_per_sec: 60.0,
            player_message_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or TOML file, falling back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("RICOCHET_CONFIG")
            && let Ok(contents) = std::fs::read_to_string(&path)
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        if let Ok(contents) = std::fs::read_to_string("ricochet.toml")
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = ServerConfig::default();
        assert!(config.limits.max_ws_connections > 0);
        assert_eq!(config.sim.tick_rate_hz, 20);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:9000"

            [limits]
            max_ws_connections = 16

            [sim]
            winning_score = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.limits.max_ws_connections, 16);
        assert_eq!(config.sim.winning_score, 7);
        assert_eq!(config.limits.player_message_buffer, 256);
    }
}
