//! Simulator
//!
//! Drives one simulated month through every phase in a fixed order. Each
//! phase finishes for all agents before the next one starts; events pile up
//! in the [`TickEvents`] sink and are flushed into the history at the end.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use std::sync::Arc;
use tracing::{info, warn};

use sim_events::{Event, EventLog, MonthStamp};

use crate::actions::builtin_registry;
use crate::components::{History, WorldClock};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::oracle::{LanguageModel, Oracle};
use crate::runtime::{ActionRegistry, PendingCalls, Services};
use crate::setup::{init_world, place_sites, spawn_population};
use crate::systems::{
    age_agents, claim_sites, commit_plans, decide, execute_actions, grant_nicknames, install_resources,
    live_agents, refresh_objectives, regenerate, resolve_deaths, roll_fortunes, rotate_phenomenon,
    spawn_births, tick_events, update_observations,
};

fn schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule
}

/// Owns the world and runs the monthly tick.
pub struct Simulator {
    world: World,
    services: Services,
    calls: PendingCalls,
    perception: Schedule,
    upkeep: Schedule,
    passive: Schedule,
    phenomenon: Schedule,
}

impl Simulator {
    /// A populated world with the built-in action catalogue.
    pub fn new(config: SimConfig, model: Arc<dyn LanguageModel>) -> Result<Self, SimError> {
        Self::with_registry(config, builtin_registry()?, model)
    }

    /// A populated world with a custom action catalogue.
    pub fn with_registry(
        config: SimConfig,
        registry: ActionRegistry,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, SimError> {
        let mut world = World::new();
        init_world(&mut world, &config);
        spawn_population(&mut world, config.simulation.initial_population, &config.population);
        place_sites(&mut world, config.simulation.site_count);

        let services = Services {
            registry: Arc::new(registry),
            oracle: Arc::new(Oracle::new(model, &config.oracle)),
            config: Arc::new(config),
        };
        Ok(Self::from_parts(world, services))
    }

    /// Wraps an already initialised world.
    pub fn from_parts(mut world: World, services: Services) -> Self {
        install_resources(&mut world, &services);

        let mut perception = schedule();
        perception.add_systems((update_observations, claim_sites).chain());
        let mut upkeep = schedule();
        upkeep.add_systems((age_agents, spawn_births).chain());
        let mut passive = schedule();
        passive.add_systems(regenerate);
        let mut phenomenon = schedule();
        phenomenon.add_systems(rotate_phenomenon);

        Self {
            world,
            services,
            calls: PendingCalls::new(),
            perception,
            upkeep,
            passive,
            phenomenon,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn history(&self) -> &EventLog {
        &self.world.resource::<History>().0
    }

    pub fn now(&self) -> MonthStamp {
        self.world.resource::<WorldClock>().now
    }

    pub fn live_count(&mut self) -> usize {
        live_agents(&mut self.world).len()
    }

    /// Simulates one month and returns its events in phase order.
    ///
    /// On error the month is abandoned: nothing is flushed into the history
    /// and the clock does not advance.
    pub async fn step(&mut self) -> Result<Vec<Event>, SimError> {
        let now = self.now();
        if let Err(err) = self.run_phases().await {
            // Calls still in flight run to completion; their replies are
            // judged for staleness when the owning action is next stepped.
            if let Err(join) = self.calls.settle().await {
                warn!(tick = %now, error = %join, "pending call failed during abort");
                self.calls = PendingCalls::new();
            }
            let dropped = tick_events(&mut self.world).drain().len();
            warn!(tick = %now, dropped, error = %err, "tick aborted");
            return Err(err);
        }

        let events = self.flush();
        self.world.resource_mut::<WorldClock>().advance();

        let alive = self.live_count();
        let major = events.iter().filter(|e| e.is_major).count();
        info!(tick = %now, events = events.len(), major, alive, "tick complete");
        Ok(events)
    }

    /// Runs `months` ticks, handing each month's events to `sink`.
    pub async fn run<F>(&mut self, months: u64, mut sink: F) -> Result<(), SimError>
    where
        F: FnMut(MonthStamp, &[Event]),
    {
        for _ in 0..months {
            let now = self.now();
            let events = self.step().await?;
            sink(now, &events);
        }
        Ok(())
    }

    async fn run_phases(&mut self) -> Result<(), SimError> {
        let world = &mut self.world;
        let services = &self.services;

        self.perception.run(world);
        refresh_objectives(world, services).await?;
        decide(world, services).await?;
        commit_plans(world, services, &mut self.calls)?;
        execute_actions(world, services, &mut self.calls).await?;
        resolve_deaths(world);
        self.upkeep.run(world);
        self.passive.run(world);
        roll_fortunes(world, services).await?;
        grant_nicknames(world, services).await?;
        self.phenomenon.run(world);
        Ok(())
    }

    /// Moves the month's events into the history.
    fn flush(&mut self) -> Vec<Event> {
        let events = tick_events(&mut self.world).drain();
        let mut history = self.world.resource_mut::<History>();
        let added = history.0.extend(events.iter().cloned());
        if added < events.len() {
            warn!(duplicates = events.len() - added, "duplicate events skipped");
        }
        events
    }
}
