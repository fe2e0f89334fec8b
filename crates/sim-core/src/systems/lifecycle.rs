//! Lifecycle System
//!
//! Deaths, aging, and new arrivals.

use bevy_ecs::prelude::*;
use tracing::info;

use sim_events::Event;

use super::{current_month, live_agents, roll, tick_events, Settings};
use crate::components::{Age, AgentId, AgentName, Alive, Deceased, Vitals};
use crate::runtime::preempt;
use crate::setup::spawn_random_agent;

/// Why an agent leaves the live population this month, if it does.
fn cause_of_death(world: &mut World, entity: Entity, old_age_chance: f64) -> Option<&'static str> {
    if world.get::<Vitals>(entity).is_some_and(|v| v.is_dead()) {
        return Some("fell in battle");
    }
    let past_lifespan = world.get::<Age>(entity).is_some_and(|a| a.past_lifespan());
    (past_lifespan && roll(world, old_age_chance)).then_some("died of old age")
}

/// Archives agents whose HP ran out or whose lifespan caught up with them.
///
/// The dead keep their components but lose [`Alive`]; their plans and running
/// action are dropped without finishing.
pub fn resolve_deaths(world: &mut World) {
    let Some(Settings(config)) = world.get_resource::<Settings>().cloned() else {
        return;
    };
    let now = current_month(world);
    let events = tick_events(world);

    for entity in live_agents(world) {
        let Some(reason) = cause_of_death(world, entity, config.population.old_age_death_chance) else {
            continue;
        };

        preempt(world, entity);
        let id = world.get::<AgentId>(entity).map(|id| id.0.clone()).unwrap_or_default();
        let name = world.get::<AgentName>(entity).map(|n| n.0.clone()).unwrap_or_else(|| id.clone());
        if let Some(mut agent) = world.get_entity_mut(entity) {
            agent.remove::<Alive>();
            agent.insert(Deceased {
                at: now,
                reason: reason.to_string(),
            });
        }

        info!(agent = %id, reason, "agent died");
        events.push(Event::new(now, format!("{} {}", name, reason)).with_agents([id]).major());
    }
}

/// System to advance every live agent's age by one month
pub fn age_agents(mut agents: Query<&mut Age, With<Alive>>) {
    for mut age in agents.iter_mut() {
        age.months += 1;
    }
}

/// Occasionally spawns a newcomer at a random spot on the map.
pub fn spawn_births(world: &mut World) {
    let Some(Settings(config)) = world.get_resource::<Settings>().cloned() else {
        return;
    };
    if !roll(world, config.population.birth_chance) {
        return;
    }

    let now = current_month(world);
    let entity = spawn_random_agent(world, &config.population);
    let id = world.get::<AgentId>(entity).map(|id| id.0.clone()).unwrap_or_default();
    let name = world.get::<AgentName>(entity).map(|n| n.0.clone()).unwrap_or_else(|| id.clone());

    info!(agent = %id, "agent born");
    tick_events(world).push(Event::new(now, format!("{} sets out into the world", name)).with_agents([id]));
}
