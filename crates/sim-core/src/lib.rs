//! Avatar Simulation Core
//!
//! A month-stepped world of cultivating avatars. Each agent holds one running
//! action and a queue of plans chosen by a decision oracle; the [`Simulator`]
//! drives every agent through a fixed sequence of phases per tick and records
//! what happened in an [`sim_events::EventLog`].

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;

pub mod actions;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod formula;
pub mod oracle;
pub mod runtime;
pub mod setup;
pub mod simulator;
pub mod systems;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod testing;

pub use config::SimConfig;
pub use error::{ActionError, OracleError, RegistryError, SimError};
pub use events::{EventLogger, TickEvents};
pub use oracle::{LanguageModel, Oracle, RuleBasedModel};
pub use simulator::Simulator;

/// Seeded RNG resource for deterministic simulation
#[derive(Resource)]
pub struct SimRng(pub SmallRng);
