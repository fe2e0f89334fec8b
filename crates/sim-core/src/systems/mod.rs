//! Tick Phases
//!
//! Synchronous phases are bevy systems run through a [`Schedule`]; phases
//! that talk to the oracle are async functions over the world that fan
//! calls out and gather them back before returning.

pub mod decision;
pub mod execute;
pub mod lifecycle;
pub mod narrative;
pub mod passive;
pub mod perception;
pub mod phenomenon;

use bevy_ecs::prelude::*;
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinSet;

use sim_events::MonthStamp;

use crate::components::{AgentId, Alive, WorldClock};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::events::TickEvents;
use crate::oracle::{ComposeRequest, Oracle};
use crate::runtime::Services;
use crate::SimRng;

pub use decision::{commit_plans, decide};
pub use execute::execute_actions;
pub use lifecycle::{age_agents, resolve_deaths, spawn_births};
pub use narrative::{grant_nicknames, refresh_objectives};
pub use passive::{regenerate, roll_fortunes};
pub use perception::{claim_sites, update_observations};
pub use phenomenon::rotate_phenomenon;

/// Configuration visible to schedule systems
#[derive(Resource, Clone)]
pub struct Settings(pub Arc<SimConfig>);

/// Insert the resources every phase expects.
pub fn install_resources(world: &mut World, services: &Services) {
    world.insert_resource(Settings(services.config.clone()));
    world.insert_resource(TickEvents::new());
}

/// Handle to the tick's event sink, created on first use.
pub fn tick_events(world: &mut World) -> TickEvents {
    world.get_resource_or_insert_with(TickEvents::new).clone()
}

/// The month being simulated.
pub fn current_month(world: &World) -> MonthStamp {
    world.get_resource::<WorldClock>().map(|c| c.now).unwrap_or_default()
}

/// Live agents ordered by id, so RNG draws happen in a stable order.
pub fn live_agents(world: &mut World) -> Vec<Entity> {
    let mut query = world.query_filtered::<(Entity, &AgentId), With<Alive>>();
    let mut agents: Vec<(String, Entity)> = query
        .iter(world)
        .map(|(entity, id)| (id.0.clone(), entity))
        .collect();
    agents.sort();
    agents.into_iter().map(|(_, entity)| entity).collect()
}

/// Bernoulli roll on the world RNG. Always false without one.
pub fn roll(world: &mut World, chance: f64) -> bool {
    let chance = chance.clamp(0.0, 1.0);
    world
        .get_resource_mut::<SimRng>()
        .map(|mut rng| rng.0.gen_bool(chance))
        .unwrap_or(false)
}

/// Fans compose requests out and gathers the texts back in request order.
async fn compose_all(
    oracle: &Arc<Oracle>,
    phase: &'static str,
    requests: Vec<(Entity, ComposeRequest)>,
) -> Result<Vec<(Entity, String)>, SimError> {
    let mut tasks = JoinSet::new();
    let mut entities = Vec::with_capacity(requests.len());
    for (index, (entity, request)) in requests.into_iter().enumerate() {
        entities.push(entity);
        let oracle = oracle.clone();
        tasks.spawn(async move { (index, oracle.compose(request).await) });
    }

    let mut texts: Vec<Option<String>> = vec![None; entities.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, reply) = joined?;
        texts[index] = Some(reply.map_err(|e| SimError::oracle(phase, e))?);
    }

    Ok(entities
        .into_iter()
        .zip(texts)
        .filter_map(|(entity, text)| text.map(|t| (entity, t)))
        .collect())
}
