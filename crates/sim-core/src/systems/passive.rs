//! Passive Effects
//!
//! Monthly regeneration, plus random strokes of fortune and misfortune whose
//! narration is composed by the oracle.

use bevy_ecs::prelude::*;
use tokio::task::JoinSet;
use tracing::debug;

use sim_events::Event;

use super::{current_month, live_agents, roll, tick_events, Settings};
use crate::components::{Age, Alive, Cultivation, History, Purse, Vitals};
use crate::error::{OracleError, SimError};
use crate::formula::StatBlock;
use crate::oracle::{ComposeKind, ComposeRequest};
use crate::runtime::{agent_brief, Services};

/// System to heal every live agent by the configured regen formula
pub fn regenerate(
    settings: Res<Settings>,
    mut agents: Query<(&mut Vitals, &Cultivation, &Age, &Purse), With<Alive>>,
) {
    let regen = &settings.0.passive.regen;
    for (mut vitals, cultivation, age, purse) in agents.iter_mut() {
        let stats = StatBlock {
            hp: f64::from(vitals.hp),
            max_hp: f64::from(vitals.max_hp),
            level: f64::from(cultivation.level),
            age_years: age.years() as f64,
            stones: purse.stones as f64,
        };
        let amount = regen.eval(&stats).round() as i32;
        if amount > 0 {
            vitals.heal(amount);
        }
    }
}

/// Recent history lines handed to the narrator
const FORTUNE_CONTEXT: usize = 3;

/// Rolls fortune, then misfortune, for each live agent; narration calls run
/// concurrently and push straight into the tick's event sink. Effects are
/// applied once every call is back, to agents still alive.
pub async fn roll_fortunes(world: &mut World, services: &Services) -> Result<(), SimError> {
    let passive = services.config.passive.clone();
    let now = current_month(world);
    let sink = tick_events(world);

    let mut struck = Vec::new();
    for entity in live_agents(world) {
        let kind = if roll(world, passive.fortune_chance) {
            ComposeKind::Fortune
        } else if roll(world, passive.misfortune_chance) {
            ComposeKind::Misfortune
        } else {
            continue;
        };
        let Some(subject) = agent_brief(world, entity) else {
            continue;
        };
        let context = match world.get_resource::<History>() {
            Some(history) => history
                .0
                .by_agent(&subject.id, FORTUNE_CONTEXT)
                .iter()
                .map(|e| e.to_string())
                .collect(),
            None => Vec::new(),
        };
        let id = subject.id.clone();
        let request = ComposeRequest {
            tick: now,
            kind,
            subject,
            other: None,
            context,
        };
        struck.push((entity, kind, id, request));
    }
    if struck.is_empty() {
        return Ok(());
    }

    let mut tasks = JoinSet::new();
    let mut effects = Vec::with_capacity(struck.len());
    for (entity, kind, id, request) in struck {
        effects.push((entity, kind));
        let oracle = services.oracle.clone();
        let sink = sink.clone();
        tasks.spawn(async move {
            let text = oracle.compose(request).await?;
            sink.push(Event::new(now, text).with_agents([id]).major());
            Ok::<(), OracleError>(())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined?.map_err(|e| SimError::oracle("passive", e))?;
    }

    for (entity, kind) in effects {
        if world.get::<Alive>(entity).is_none() {
            continue;
        }
        match kind {
            ComposeKind::Fortune => {
                if let Some(mut purse) = world.get_mut::<Purse>(entity) {
                    purse.stones += passive.fortune_stones;
                }
            }
            _ => {
                if let Some(mut vitals) = world.get_mut::<Vitals>(entity) {
                    vitals.damage(passive.misfortune_damage);
                }
            }
        }
        debug!(?entity, ?kind, "passive effect applied");
    }
    Ok(())
}
