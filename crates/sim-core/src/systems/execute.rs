//! Action Execution
//!
//! Steps every running action in bounded local rounds. Oracle calls spawned
//! during a round are awaited before the next round starts, so replies and
//! freshly force-assigned actions can be handled within the same month.
//! Whatever is still pending when the round cap is hit stays in its slot
//! and continues next tick.

use bevy_ecs::prelude::*;
use tracing::{debug, warn};

use sim_events::Event;

use super::{current_month, live_agents, tick_events};
use crate::components::{AgentId, AgentName};
use crate::config::ActionErrorPolicy;
use crate::error::{ActionError, SimError};
use crate::events::TickEvents;
use crate::runtime::{ActionContext, ActionInstance, ActionSlot, ActionStatus, PendingCalls, Services};

/// Applies the configured error policy to a failed action body.
///
/// Oracle hard failures always abort the tick, tagged with `phase`. For
/// other failures fail-fast turns them into the tick's error; isolation logs
/// them, leaves the agent idle, and records a diagnostic event.
pub(crate) fn contain_failure(
    world: &World,
    services: &Services,
    phase: &'static str,
    entity: Entity,
    action: &str,
    error: ActionError,
    events: &TickEvents,
) -> Result<(), SimError> {
    let error = match error {
        ActionError::Oracle(source) => return Err(SimError::oracle(phase, source)),
        other => other,
    };
    let agent = world.get::<AgentId>(entity).map(|id| id.0.clone()).unwrap_or_default();
    match services.config.scheduler.action_error_policy {
        ActionErrorPolicy::FailFast => Err(SimError::Action {
            agent,
            action: action.to_string(),
            source: error,
        }),
        ActionErrorPolicy::Isolate => {
            warn!(agent = %agent, action, error = %error, "action failed");
            let now = current_month(world);
            let name = world.get::<AgentName>(entity).map(|n| n.0.clone()).unwrap_or_else(|| agent.clone());
            events.push(
                Event::new(now, format!("{}'s {} came to nothing: {}", name, action, error)).with_agents([agent]),
            );
            Ok(())
        }
    }
}

/// Whether an agent's action should be stepped in this round.
///
/// The first round steps every running action once. Later rounds only pick
/// up actions that have not been stepped yet or are waiting on a reply.
fn due_for_step(world: &World, entity: Entity, first_round: bool) -> bool {
    let Some(slot) = world.get::<ActionSlot>(entity) else {
        return false;
    };
    match &slot.current {
        None => false,
        Some(_) if first_round => true,
        Some(instance) => slot.fresh || instance.action.awaiting_reply(),
    }
}

enum Stepped {
    /// Still running; goes back into the slot
    Continue(Vec<Event>),
    /// Completed and finished, or failed; the slot lets go of it
    Done(Vec<Event>),
}

async fn advance(ctx: &mut ActionContext<'_>, instance: &mut ActionInstance) -> Result<Stepped, ActionError> {
    let outcome = instance.action.step(ctx, &instance.params)?;
    instance.status = outcome.status;
    match outcome.status {
        ActionStatus::Completed => {
            let mut events = outcome.events;
            events.extend(instance.action.finish(ctx, &instance.params).await?);
            Ok(Stepped::Done(events))
        }
        ActionStatus::Failed => Ok(Stepped::Done(outcome.events)),
        ActionStatus::Running | ActionStatus::Blocked => Ok(Stepped::Continue(outcome.events)),
    }
}

/// Steps one agent's running action.
///
/// The instance is taken out of the slot while it runs. A completed instance
/// is finished even if it replaced itself meanwhile; a running one is put
/// back only if nothing else took its place.
async fn step_agent(
    world: &mut World,
    services: &Services,
    calls: &mut PendingCalls,
    entity: Entity,
    events: &TickEvents,
) -> Result<(), SimError> {
    let taken = world
        .get_mut::<ActionSlot>(entity)
        .and_then(|mut slot| slot.take_for_step());
    let Some((mut instance, generation)) = taken else {
        return Ok(());
    };
    let name = instance.name().to_string();

    let result = {
        let mut ctx = ActionContext::new(world, entity, services, calls);
        advance(&mut ctx, &mut instance).await
    };

    match result {
        Ok(Stepped::Continue(produced)) => {
            events.extend(produced);
            let restored = world
                .get_mut::<ActionSlot>(entity)
                .is_some_and(|mut slot| slot.restore(instance, generation));
            if !restored {
                debug!(?entity, action = %name, "superseded while stepping");
            }
            Ok(())
        }
        Ok(Stepped::Done(produced)) => {
            debug!(?entity, action = %name, status = ?instance.status, "action done");
            events.extend(produced);
            Ok(())
        }
        Err(error) => contain_failure(world, services, "execute", entity, &name, error, events),
    }
}

/// Runs the execute phase.
pub async fn execute_actions(world: &mut World, services: &Services, calls: &mut PendingCalls) -> Result<(), SimError> {
    let max_rounds = services.config.scheduler.max_local_rounds.max(1);
    let events = tick_events(world);

    for round in 1..=max_rounds {
        let due: Vec<Entity> = live_agents(world)
            .into_iter()
            .filter(|&entity| due_for_step(world, entity, round == 1))
            .collect();
        if due.is_empty() {
            break;
        }

        for &entity in &due {
            step_agent(world, services, calls, entity, &events).await?;
        }
        let settled = calls.settle().await?;
        debug!(round, stepped = due.len(), settled, "execute round");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::runtime::{ActionDescriptor, ActionParams, ActionPlan, ActionRegistry, Temporal};
    use crate::testing::{ScriptedModel, StubAction, StubLog, TestWorld};
    use std::sync::Arc;

    fn stub_world(config: SimConfig, stub: impl Fn() -> StubAction + Send + Sync + 'static) -> TestWorld {
        let mut registry = ActionRegistry::new();
        registry
            .register(
                ActionDescriptor::new("Stub", "test action", Temporal::Instant)
                    .with_factory(move || Box::new(stub())),
                true,
            )
            .unwrap();
        registry
            .register(
                ActionDescriptor::new("Steady", "always works", Temporal::Instant)
                    .with_factory(|| Box::new(StubAction::new("Steady"))),
                true,
            )
            .unwrap();
        let mut tw = TestWorld::with_parts(config, registry, Arc::new(ScriptedModel::default()));
        crate::systems::install_resources(&mut tw.world, &tw.services);
        tw
    }

    fn commit(tw: &mut TestWorld, agent: Entity, action: &str) {
        let plan = ActionPlan::new(action, ActionParams::new());
        let mut calls = PendingCalls::new();
        let mut ctx = ActionContext::new(&mut tw.world, agent, &tw.services, &mut calls);
        crate::runtime::commit_plan(&mut ctx, &plan).unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_instant_action_finished_and_cleared() {
        let log = Arc::new(StubLog::default());
        let shared = log.clone();
        let mut tw = stub_world(SimConfig::default(), move || StubAction::new("Stub").with_log(shared.clone()));
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        commit(&mut tw, agent, "Stub");

        let mut calls = PendingCalls::new();
        execute_actions(&mut tw.world, &tw.services, &mut calls).await.unwrap();

        assert_eq!(log.finishes(), 1);
        assert_eq!(log.steps().len(), 1);
        assert!(tw.world.get::<ActionSlot>(agent).unwrap().is_idle());
        assert_eq!(tw.world.resource::<TickEvents>().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_action_stepped_once_per_tick() {
        let log = Arc::new(StubLog::default());
        let shared = log.clone();
        let mut tw = stub_world(SimConfig::default(), move || {
            StubAction::new("Stub").timed(3).with_log(shared.clone())
        });
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        commit(&mut tw, agent, "Stub");

        let mut calls = PendingCalls::new();
        execute_actions(&mut tw.world, &tw.services, &mut calls).await.unwrap();

        assert_eq!(log.steps().len(), 1);
        assert_eq!(log.finishes(), 0);
        let slot = tw.world.get::<ActionSlot>(agent).unwrap();
        assert_eq!(slot.current_name(), Some("Stub"));
        assert!(!slot.fresh);
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_action_error() {
        let mut tw = stub_world(SimConfig::default(), || StubAction::new("Stub").failing());
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        commit(&mut tw, agent, "Stub");

        let mut calls = PendingCalls::new();
        let err = execute_actions(&mut tw.world, &tw.services, &mut calls).await.unwrap_err();
        match err {
            SimError::Action { agent, action, .. } => {
                assert_eq!(agent, "avatar_0001");
                assert_eq!(action, "Stub");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_isolate_policy_contains_failure() {
        let mut config = SimConfig::default();
        config.scheduler.action_error_policy = ActionErrorPolicy::Isolate;
        let log = Arc::new(StubLog::default());
        let shared = log.clone();
        let mut tw = stub_world(config, move || StubAction::new("Stub").failing().with_log(shared.clone()));
        let faulty = tw.spawn_agent("avatar_0001", (0, 0));
        let healthy = tw.spawn_agent("avatar_0002", (0, 0));
        commit(&mut tw, faulty, "Stub");
        commit(&mut tw, healthy, "Steady");

        let mut calls = PendingCalls::new();
        execute_actions(&mut tw.world, &tw.services, &mut calls).await.unwrap();

        assert!(tw.world.get::<ActionSlot>(faulty).unwrap().is_idle());
        assert!(tw.world.get::<ActionSlot>(healthy).unwrap().is_idle());
        assert_eq!(log.finishes(), 0);
        let events = tw.world.resource::<TickEvents>().drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events.iter().filter(|e| e.content.contains("came to nothing")).count(), 1);
        assert!(events.iter().any(|e| e.content.contains("ends Steady")));
    }
}
