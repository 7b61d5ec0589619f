//! Typed, validated runtime configuration with `development()` and
//! `production()` presets, in the style of the teacher's
//! `message_router::config::RouterConfig`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that didn't parse.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvValue {
        /// The environment variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },
}

/// Execution Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-reactor concurrency ceiling.
    pub concurrency_ceiling: usize,
    /// Timeout applied when neither the atom nor its handler specify one.
    pub default_timeout_secs: u64,
    /// Maximum inter-packet call chain depth before `CALL_DEPTH_EXCEEDED`.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            concurrency_ceiling: 1000,
            default_timeout_secs: 30,
            max_call_depth: 32,
        }
    }
}

/// Router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Descriptors at or above this load factor are ineligible.
    pub load_threshold: f64,
    /// Scoring multiplier for a healthy descriptor.
    pub healthy_bonus: f64,
    /// Scoring multiplier for a degraded descriptor (still eligible).
    pub degraded_bonus: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            load_threshold: 0.95,
            healthy_bonus: 1.1,
            degraded_bonus: 0.5,
        }
    }
}

/// Health Tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTrackerConfig {
    /// Seconds between liveness pings.
    pub interval_secs: u64,
    /// Deadline for a single ping.
    pub ping_deadline_secs: u64,
    /// Consecutive failures before a descriptor is marked unhealthy.
    pub failure_threshold: u32,
}

impl Default for HealthTrackerConfig {
    fn default() -> Self {
        HealthTrackerConfig {
            interval_secs: 30,
            ping_deadline_secs: 5,
            failure_threshold: 3,
        }
    }
}

/// Gateway Front-End settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Maximum in-flight atoms per session before backpressure applies.
    pub max_in_flight_per_session: usize,
    /// Maximum accepted frame size, in bytes.
    pub max_frame_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            max_in_flight_per_session: 256,
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

/// The full runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PacketFlowConfig {
    /// This reactor's unique identifier.
    pub reactor_id: String,
    /// Port the Gateway binds.
    pub port: u16,
    /// `tracing` filter directive, e.g. `"info"`.
    pub log_level: String,
    /// Execution Engine settings.
    pub engine: EngineConfig,
    /// Router settings.
    pub router: RouterConfig,
    /// Health Tracker settings.
    pub health: HealthTrackerConfig,
    /// Gateway settings.
    pub gateway: GatewayConfig,
}

impl PacketFlowConfig {
    /// Settings tuned for local development: a fixed reactor id, a low
    /// port, verbose logging, and a shorter health-check interval for
    /// fast feedback.
    #[must_use]
    pub fn development() -> Self {
        PacketFlowConfig {
            reactor_id: "dev-reactor".to_string(),
            port: 7700,
            log_level: "debug".to_string(),
            engine: EngineConfig::default(),
            router: RouterConfig::default(),
            health: HealthTrackerConfig {
                interval_secs: 10,
                ping_deadline_secs: 2,
                failure_threshold: 2,
            },
            gateway: GatewayConfig::default(),
        }
    }

    /// Settings tuned for production: quieter logging and a larger
    /// concurrency ceiling.
    #[must_use]
    pub fn production() -> Self {
        PacketFlowConfig {
            reactor_id: "reactor".to_string(),
            port: 7070,
            log_level: "info".to_string(),
            engine: EngineConfig {
                concurrency_ceiling: 4000,
                ..EngineConfig::default()
            },
            router: RouterConfig::default(),
            health: HealthTrackerConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Load configuration from `REACTOR_ID`, `PORT`, `LOG_LEVEL`, layered
    /// over the `production()` preset; any variable that is absent or
    /// fails to parse falls back to its documented default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::production();

        if let Ok(id) = std::env::var("REACTOR_ID") {
            config.reactor_id = id;
        }

        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::InvalidEnvValue {
                    var: "PORT".to_string(),
                    reason: format!("{e}"),
                })?;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_preset_has_short_health_interval() {
        let config = PacketFlowConfig::development();
        assert_eq!(config.health.interval_secs, 10);
    }

    #[test]
    fn production_preset_has_larger_concurrency_ceiling() {
        let config = PacketFlowConfig::production();
        assert_eq!(config.engine.concurrency_ceiling, 4000);
    }

    #[test]
    fn from_env_rejects_unparseable_port() {
        std::env::set_var("PORT", "not-a-number");
        let result = PacketFlowConfig::from_env();
        std::env::remove_var("PORT");
        assert!(result.is_err());
    }
}
