//! Perception System
//!
//! Refreshes what each agent can see and lets the first agent to notice an
//! ownerless site claim it.

use bevy_ecs::prelude::*;

use sim_events::Event;

use super::Settings;
use crate::components::{AgentId, AgentName, Alive, Observation, Position, Site, WorldClock};
use crate::events::TickEvents;

/// System to refresh each agent's view of live agents within its radius
pub fn update_observations(
    settings: Res<Settings>,
    others: Query<(Entity, &AgentId, &Position), With<Alive>>,
    mut observers: Query<(Entity, &Position, &mut Observation), With<Alive>>,
) {
    let radius = settings.0.perception.observation_radius;
    let mut everyone: Vec<(&str, Entity, Position)> = others
        .iter()
        .map(|(entity, id, pos)| (id.0.as_str(), entity, *pos))
        .collect();
    everyone.sort_by(|a, b| a.0.cmp(b.0));

    for (entity, position, mut observation) in observers.iter_mut() {
        observation.visible = everyone
            .iter()
            .filter(|(_, other, pos)| *other != entity && position.distance(pos) <= radius)
            .map(|(_, other, _)| *other)
            .collect();
    }
}

/// System to hand ownerless sites to the first agent, by id, within radius
pub fn claim_sites(
    settings: Res<Settings>,
    clock: Res<WorldClock>,
    events: Res<TickEvents>,
    agents: Query<(&AgentId, &AgentName, &Position), With<Alive>>,
    mut sites: Query<(&mut Site, &Position)>,
) {
    let radius = settings.0.perception.observation_radius;
    let mut scanners: Vec<_> = agents.iter().collect();
    scanners.sort_by(|a, b| a.0 .0.cmp(&b.0 .0));

    for (mut site, site_pos) in sites.iter_mut() {
        if site.owner.is_some() {
            continue;
        }
        let finder = scanners
            .iter()
            .find(|(_, _, pos)| pos.distance(site_pos) <= radius);
        if let Some((id, name, _)) = finder {
            site.owner = Some(id.0.clone());
            events.push(
                Event::new(clock.now, format!("{} claims {}", name.0, site.name))
                    .with_agents([id.0.clone()]),
            );
        }
    }
}
