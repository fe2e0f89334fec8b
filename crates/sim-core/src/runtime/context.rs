//! Action Context
//!
//! What an action body may touch while it runs: the ECS world, its owner,
//! the month, shared services, and the tick's tracker of spawned oracle calls.

use bevy_ecs::prelude::*;
use bevy_ecs::world::Mut;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

use sim_events::MonthStamp;

use super::registry::ActionRegistry;
use crate::components::{
    Age, AgentDirectory, AgentId, AgentName, Alive, Cultivation, History, Mind, Position, Purse,
    Vitals, WorldClock,
};
use crate::config::SimConfig;
use crate::error::{ActionError, SimError};
use crate::oracle::{AgentBrief, Oracle};
use crate::SimRng;

/// Shared, read-only collaborators handed to every phase and action.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<ActionRegistry>,
    pub oracle: Arc<Oracle>,
    pub config: Arc<SimConfig>,
}

/// Oracle calls spawned during a round, awaited before the next one starts.
#[derive(Default)]
pub struct PendingCalls {
    tasks: JoinSet<()>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a call on the runtime and tracks it.
    pub fn spawn<F>(&mut self, call: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(call);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every tracked call. Returns how many finished.
    pub async fn settle(&mut self) -> Result<usize, SimError> {
        let mut settled = 0;
        while let Some(joined) = self.tasks.join_next().await {
            joined?;
            settled += 1;
        }
        Ok(settled)
    }
}

/// Mutable view of the world for one acting agent.
pub struct ActionContext<'w> {
    pub world: &'w mut World,
    pub actor: Entity,
    pub now: MonthStamp,
    pub services: &'w Services,
    pub calls: &'w mut PendingCalls,
}

impl<'w> ActionContext<'w> {
    /// Builds a context stamped with the world clock.
    pub fn new(world: &'w mut World, actor: Entity, services: &'w Services, calls: &'w mut PendingCalls) -> Self {
        let now = world.get_resource::<WorldClock>().map(|c| c.now).unwrap_or_default();
        Self {
            world,
            actor,
            now,
            services,
            calls,
        }
    }

    /// Reborrows the context for another agent.
    pub fn for_agent(&mut self, actor: Entity) -> ActionContext<'_> {
        ActionContext {
            world: &mut *self.world,
            actor,
            now: self.now,
            services: self.services,
            calls: &mut *self.calls,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.services.config
    }

    pub fn component<T: Component>(&self, entity: Entity) -> Result<&T, ActionError> {
        self.world
            .get::<T>(entity)
            .ok_or_else(|| ActionError::MissingComponent(format!("{:?}", entity), std::any::type_name::<T>()))
    }

    pub fn component_mut<T: Component>(&mut self, entity: Entity) -> Result<Mut<'_, T>, ActionError> {
        self.world
            .get_mut::<T>(entity)
            .ok_or_else(|| ActionError::MissingComponent(format!("{:?}", entity), std::any::type_name::<T>()))
    }

    pub fn agent_id(&self, entity: Entity) -> Result<String, ActionError> {
        self.component::<AgentId>(entity).map(|id| id.0.clone())
    }

    pub fn actor_id(&self) -> Result<String, ActionError> {
        self.agent_id(self.actor)
    }

    /// Display name, falling back to the id.
    pub fn name_of(&self, entity: Entity) -> String {
        self.world
            .get::<AgentName>(entity)
            .map(|n| n.0.clone())
            .or_else(|| self.world.get::<AgentId>(entity).map(|id| id.0.clone()))
            .unwrap_or_else(|| "someone".to_string())
    }

    pub fn find_agent(&self, id: &str) -> Option<Entity> {
        self.world.get_resource::<AgentDirectory>()?.get(id)
    }

    pub fn is_live(&self, entity: Entity) -> bool {
        self.world.get::<Alive>(entity).is_some()
    }

    /// Resolves a live agent id, with a user-facing reason on failure.
    pub fn live_agent(&self, id: &str) -> Result<Entity, String> {
        match self.find_agent(id) {
            Some(entity) if self.is_live(entity) => Ok(entity),
            Some(_) => Err(format!("{} is no longer among the living", id)),
            None => Err(format!("no one called {}", id)),
        }
    }

    pub fn distance(&self, a: Entity, b: Entity) -> Option<i32> {
        let pa = self.world.get::<Position>(a)?;
        let pb = self.world.get::<Position>(b)?;
        Some(pa.distance(pb))
    }

    pub fn brief(&self, entity: Entity) -> Result<AgentBrief, ActionError> {
        agent_brief(&*self.world, entity)
            .ok_or_else(|| ActionError::MissingComponent(format!("{:?}", entity), "AgentBrief"))
    }

    /// Recent history lines for an agent, oldest first.
    pub fn memories(&self, entity: Entity, limit: usize) -> Vec<String> {
        let Ok(id) = self.agent_id(entity) else {
            return Vec::new();
        };
        match self.world.get_resource::<History>() {
            Some(history) => history.0.by_agent(&id, limit).iter().map(|e| e.to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// History shared by exactly these two agents, oldest first.
    pub fn shared_memories(&self, a: Entity, b: Entity, limit: usize) -> Vec<String> {
        let (Ok(a), Ok(b)) = (self.agent_id(a), self.agent_id(b)) else {
            return Vec::new();
        };
        match self.world.get_resource::<History>() {
            Some(history) => history.0.by_pair(&a, &b, limit).iter().map(|e| e.to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// Bernoulli roll on the world RNG. Always false without one.
    pub fn roll(&mut self, chance: f64) -> bool {
        let chance = chance.clamp(0.0, 1.0);
        self.world
            .get_resource_mut::<SimRng>()
            .map(|mut rng| rng.0.gen_bool(chance))
            .unwrap_or(false)
    }

    /// Uniform draw from `lo..=hi` on the world RNG; `lo` without one.
    pub fn range(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        self.world
            .get_resource_mut::<SimRng>()
            .map(|mut rng| rng.0.gen_range(lo..=hi))
            .unwrap_or(lo)
    }
}

/// Snapshot of an agent for oracle requests.
pub fn agent_brief(world: &World, entity: Entity) -> Option<AgentBrief> {
    let id = world.get::<AgentId>(entity)?;
    let position = world.get::<Position>(entity).copied().unwrap_or_default();
    let vitals = world.get::<Vitals>(entity).copied().unwrap_or(Vitals::full(1));
    let cultivation = world.get::<Cultivation>(entity).copied().unwrap_or_default();
    let mind = world.get::<Mind>(entity);

    Some(AgentBrief {
        id: id.0.clone(),
        name: world
            .get::<AgentName>(entity)
            .map(|n| n.0.clone())
            .unwrap_or_else(|| id.0.clone()),
        x: position.x,
        y: position.y,
        hp: vitals.hp,
        max_hp: vitals.max_hp,
        level: cultivation.level,
        exp: cultivation.exp,
        exp_to_breakthrough: cultivation.exp_to_breakthrough(),
        stones: world.get::<Purse>(entity).map(|p| p.stones).unwrap_or(0),
        age_years: world.get::<Age>(entity).map(|a| a.years()).unwrap_or(0),
        nickname: mind.and_then(|m| m.nickname.clone()),
        long_term_objective: mind.and_then(|m| m.long_term_objective.clone()),
    })
}
