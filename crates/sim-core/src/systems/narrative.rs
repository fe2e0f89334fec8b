//! Narrative System
//!
//! Long-term objectives and nicknames, both composed by the oracle for
//! many agents at once.

use bevy_ecs::prelude::*;
use tracing::debug;

use sim_events::{Event, EventFilter, MonthStamp};

use super::{compose_all, current_month, live_agents, roll, tick_events};
use crate::components::{AgentId, AgentName, History, Mind};
use crate::error::SimError;
use crate::oracle::{ComposeKind, ComposeRequest};
use crate::runtime::{agent_brief, PlanQueue, Services};

/// History lines given as context for an objective
const OBJECTIVE_CONTEXT: usize = 8;
/// Major deeds given as context for a nickname
const NICKNAME_CONTEXT: usize = 5;

fn history_lines(world: &World, entity: Entity, filter: EventFilter, limit: usize) -> Vec<String> {
    let (Some(id), Some(history)) = (world.get::<AgentId>(entity), world.get_resource::<History>()) else {
        return Vec::new();
    };
    history
        .0
        .by_agent_filtered(&id.0, filter, limit)
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn compose_request(world: &World, entity: Entity, now: MonthStamp, kind: ComposeKind, context: Vec<String>) -> Option<ComposeRequest> {
    Some(ComposeRequest {
        tick: now,
        kind,
        subject: agent_brief(world, entity)?,
        other: None,
        context,
    })
}

fn display_name(world: &World, entity: Entity) -> (String, String) {
    let id = world.get::<AgentId>(entity).map(|id| id.0.clone()).unwrap_or_default();
    let name = world.get::<AgentName>(entity).map(|n| n.0.clone()).unwrap_or_else(|| id.clone());
    (id, name)
}

/// Gives a long-term objective to agents without one, and occasionally
/// replaces stale ones. Replanned agents drop their queued plans.
pub async fn refresh_objectives(world: &mut World, services: &Services) -> Result<(), SimError> {
    let narrative = &services.config.narrative;
    let now = current_month(world);

    let mut requests = Vec::new();
    for entity in live_agents(world) {
        let set_at = match world.get::<Mind>(entity) {
            Some(mind) if mind.long_term_objective.is_none() => None,
            Some(mind) => mind.objective_set_at,
            None => continue,
        };
        let due = match set_at {
            None => true,
            Some(at) => {
                now.since(at) >= narrative.objective_refresh_months
                    && roll(world, narrative.objective_replan_chance)
            }
        };
        if !due {
            continue;
        }
        let context = history_lines(world, entity, EventFilter::All, OBJECTIVE_CONTEXT);
        if let Some(request) = compose_request(world, entity, now, ComposeKind::Objective, context) {
            requests.push((entity, request));
        }
    }
    if requests.is_empty() {
        return Ok(());
    }

    let events = tick_events(world);
    for (entity, objective) in compose_all(&services.oracle, "objectives", requests).await? {
        if let Some(mut mind) = world.get_mut::<Mind>(entity) {
            mind.long_term_objective = Some(objective.clone());
            mind.objective_set_at = Some(now);
        }
        if let Some(mut plans) = world.get_mut::<PlanQueue>(entity) {
            plans.clear();
        }
        let (id, name) = display_name(world, entity);
        debug!(agent = %id, "objective set");
        events.push(Event::new(now, format!("{} resolves: {}", name, objective)).with_agents([id]));
    }
    Ok(())
}

/// Names agents whose major deeds have reached the configured count.
pub async fn grant_nicknames(world: &mut World, services: &Services) -> Result<(), SimError> {
    let threshold = services.config.narrative.nickname_major_events;
    let now = current_month(world);

    let mut requests = Vec::new();
    for entity in live_agents(world) {
        let unnamed = world.get::<Mind>(entity).is_some_and(|m| m.nickname.is_none());
        let Some(id) = world.get::<AgentId>(entity).map(|id| id.0.clone()) else {
            continue;
        };
        let deeds = world
            .get_resource::<History>()
            .map(|h| h.0.major_count(&id))
            .unwrap_or(0);
        if !unnamed || deeds < threshold.max(1) {
            continue;
        }
        let context = history_lines(world, entity, EventFilter::Major, NICKNAME_CONTEXT);
        if let Some(request) = compose_request(world, entity, now, ComposeKind::Nickname, context) {
            requests.push((entity, request));
        }
    }
    if requests.is_empty() {
        return Ok(());
    }

    let events = tick_events(world);
    for (entity, nickname) in compose_all(&services.oracle, "nicknames", requests).await? {
        if let Some(mut mind) = world.get_mut::<Mind>(entity) {
            mind.nickname = Some(nickname.clone());
        }
        let (id, name) = display_name(world, entity);
        events.push(
            Event::new(now, format!("{} becomes known as \"{}\"", name, nickname))
                .with_agents([id])
                .major(),
        );
    }
    Ok(())
}
