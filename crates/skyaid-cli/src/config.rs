//! Driver configuration from environment.

use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Wall-clock milliseconds between simulation ticks
    pub tick_ms: u64,
    /// Stop the run after this many ticks even if the delivery is unfinished
    pub max_ticks: u64,
    pub seed: Option<u64>,
    /// Overrides the scenario's drone speed when set
    pub speed_kmh: Option<f64>,
    /// Overrides the scenario's simulated seconds per tick when set
    pub tick_seconds: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            max_ticks: 10_000,
            seed: None,
            speed_kmh: None,
            tick_seconds: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            tick_ms: lookup("SKYAID_TICK_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tick_ms),
            max_ticks: lookup("SKYAID_MAX_TICKS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_ticks),
            seed: lookup("SKYAID_SEED").and_then(|s| s.parse().ok()),
            speed_kmh: lookup("SKYAID_SPEED_KMH")
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| v.is_finite() && *v > 0.0),
            tick_seconds: lookup("SKYAID_TICK_SECONDS")
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| v.is_finite() && *v > 0.0),
        }
    }
}
