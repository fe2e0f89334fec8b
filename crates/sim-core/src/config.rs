//! Configuration System
//!
//! All tuning parameters are loaded from a TOML file. Every section is
//! optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use sim_events::EventLogLimits;

use crate::formula::Formula;

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub events: EventLogLimits,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub passive: PassiveConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub phenomenon: PhenomenonConfig,
}

impl SimConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// World setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the world RNG
    pub seed: u64,
    /// Calendar year of the first tick
    pub start_year: u64,
    /// Agents spawned at setup
    pub initial_population: usize,
    pub map_width: i32,
    pub map_height: i32,
    /// Ownerless sites scattered at setup
    pub site_count: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_year: 100,
            initial_population: 12,
            map_width: 32,
            map_height: 32,
            site_count: 6,
        }
    }
}

/// What happens when an action body returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorPolicy {
    /// Abort the whole tick
    #[default]
    FailFast,
    /// Mark the agent's action failed and emit a diagnostic event
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on execute rounds per tick
    pub max_local_rounds: u32,
    pub action_error_policy: ActionErrorPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_local_rounds: 3,
            action_error_policy: ActionErrorPolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Global cap on simultaneous outbound calls
    pub max_concurrent_calls: usize,
    /// Re-asks on malformed replies before giving up
    pub max_parse_retries: u32,
    /// Agents per decision request
    pub max_decide_batch: usize,
    /// Months a decided plan stays valid
    pub plan_expiry_months: Option<u64>,
    /// Extra commit attempts for a decided plan that cannot start
    pub plan_max_retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 8,
            max_parse_retries: 3,
            max_decide_batch: 4,
            plan_expiry_months: Some(6),
            plan_max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Chebyshev radius of what an agent sees
    pub observation_radius: i32,
    /// Chebyshev distance within which mutual actions may target someone
    pub interaction_range: i32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            observation_radius: 5,
            interaction_range: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Monthly death chance once past lifespan
    pub old_age_death_chance: f64,
    /// Monthly chance a new agent appears
    pub birth_chance: f64,
    pub lifespan_min_years: u64,
    pub lifespan_max_years: u64,
    pub initial_age_min_years: u64,
    pub initial_age_max_years: u64,
    pub base_hp: i32,
    pub starting_stones: i64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            old_age_death_chance: 0.1,
            birth_chance: 0.05,
            lifespan_min_years: 60,
            lifespan_max_years: 120,
            initial_age_min_years: 16,
            initial_age_max_years: 40,
            base_hp: 100,
            starting_stones: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveConfig {
    /// HP restored per month
    pub regen: Formula,
    pub fortune_chance: f64,
    pub misfortune_chance: f64,
    pub fortune_stones: i64,
    pub misfortune_damage: i32,
}

impl Default for PassiveConfig {
    fn default() -> Self {
        Self {
            regen: Formula::default_regen(),
            fortune_chance: 0.02,
            misfortune_chance: 0.02,
            fortune_stones: 30,
            misfortune_damage: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Age of a long-term objective before it may be replanned
    pub objective_refresh_months: u64,
    pub objective_replan_chance: f64,
    /// Major events needed before an agent earns a nickname
    pub nickname_major_events: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            objective_refresh_months: 60,
            objective_replan_chance: 0.2,
            nickname_major_events: 3,
        }
    }
}

/// A world-level modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenomenonSpec {
    pub name: String,
    pub description: String,
    /// Scales cultivation experience gains
    #[serde(default = "default_multiplier")]
    pub cultivation_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhenomenonConfig {
    /// Months before a new phenomenon is drawn
    pub duration_months: u64,
    pub catalogue: Vec<PhenomenonSpec>,
}

impl Default for PhenomenonConfig {
    fn default() -> Self {
        let spec = |name: &str, description: &str, cultivation_multiplier: f64| PhenomenonSpec {
            name: name.to_string(),
            description: description.to_string(),
            cultivation_multiplier,
        };
        Self {
            duration_months: 60,
            catalogue: vec![
                spec("Calm Heavens", "Nothing stirs beyond the ordinary.", 1.0),
                spec("Spirit Tide", "Qi floods the land and cultivation quickens.", 1.5),
                spec("Withered Veins", "The earth's veins run thin.", 0.6),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();

        assert_eq!(config.scheduler.max_local_rounds, 3);
        assert_eq!(config.scheduler.action_error_policy, ActionErrorPolicy::FailFast);
        assert_eq!(config.events.max_global_events, 5000);
        assert_eq!(config.events.max_index_events, 200);
        assert_eq!(config.perception.interaction_range, 2);
        assert_eq!(config.phenomenon.catalogue.len(), 3);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [simulation]
            seed = 7

            [scheduler]
            action_error_policy = "isolate"

            [events]
            max_index_events = 3
        "#;

        let config = SimConfig::from_str(toml).unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.initial_population, 12);
        assert_eq!(config.scheduler.action_error_policy, ActionErrorPolicy::Isolate);
        assert_eq!(config.scheduler.max_local_rounds, 3);
        assert_eq!(config.events.max_index_events, 3);
        assert_eq!(config.events.max_global_events, 5000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SimConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = SimConfig::from_str(&rendered).unwrap();

        assert_eq!(parsed.simulation.seed, config.simulation.seed);
        assert_eq!(parsed.passive.regen, config.passive.regen);
        assert_eq!(parsed.phenomenon.catalogue, config.phenomenon.catalogue);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        std::fs::write(&path, "[oracle]\nmax_concurrent_calls = 2\n").unwrap();

        let config = SimConfig::from_file(&path).unwrap();
        assert_eq!(config.oracle.max_concurrent_calls, 2);
        assert!(SimConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
