use crate::fleet::{GeoPoint, CAMPUS_CENTER, MAX_FLEET_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BUS_COUNT: usize = 8;
// Fleet positions refresh every 3 seconds
pub const DEFAULT_TICK_PERIOD_MS: u64 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BROADCAST_BUFFER: usize = 256;

/// Settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub bus_count: usize,
    pub tick_period_ms: u64,
    pub seed: Option<u64>,
    pub origin: GeoPoint,
}

impl SimulationConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bus_count: DEFAULT_BUS_COUNT,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            seed: None,
            origin: CAMPUS_CENTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub broadcast_buffer: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl Config {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be greater than zero".into()));
        }
        if self.simulation.bus_count == 0 || self.simulation.bus_count > MAX_FLEET_SIZE {
            return Err(ConfigError::Invalid(format!(
                "bus_count must be between 1 and {}, got {}",
                MAX_FLEET_SIZE, self.simulation.bus_count
            )));
        }
        if self.server.broadcast_buffer == 0 {
            return Err(ConfigError::Invalid("broadcast_buffer must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.bus_count, 8);
        assert_eq!(config.simulation.tick_period(), Duration::from_millis(3000));
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = Config::from_json(r#"{"simulation":{"bus_count":12,"seed":42}}"#).unwrap();
        assert_eq!(config.simulation.bus_count, 12);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.simulation.tick_period_ms, DEFAULT_TICK_PERIOD_MS);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_rejects_zero_tick_period() {
        let result = Config::from_json(r#"{"simulation":{"tick_period_ms":0}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_oversized_fleet() {
        let mut config = Config::default();
        config.simulation.bus_count = MAX_FLEET_SIZE + 1;
        assert!(config.validate().is_err());
        config.simulation.bus_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(Config::from_json("{not json"), Err(ConfigError::Parse(_))));
    }
}
