//! Decision and Commit
//!
//! Idle agents are batched into decision requests that run concurrently; the
//! returned plans are queued, and the commit phase then starts the first
//! viable plan of every idle agent.

use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use tokio::task::JoinSet;
use tracing::debug;

use super::execute::contain_failure;
use super::{current_month, live_agents, tick_events};
use crate::components::{
    AgentDirectory, AgentId, AgentName, Alive, Cultivation, History, Mind, Observation, Position, Relations,
    WorldPhenomenon,
};
use crate::error::SimError;
use crate::oracle::{AgentDecision, DecideRequest, DecideSubject, Neighbour};
use crate::runtime::{
    agent_brief, commit_next_plan, ActionContext, ActionPlan, ActionSlot, PendingCalls, PlanQueue, Services,
};

/// History lines shown to the oracle per agent
const DECISION_MEMORIES: usize = 10;

fn is_idle(world: &World, entity: Entity) -> bool {
    world.get::<ActionSlot>(entity).map_or(true, |slot| slot.is_idle())
}

fn has_plans(world: &World, entity: Entity) -> bool {
    world.get::<PlanQueue>(entity).is_some_and(|queue| !queue.is_empty())
}

fn neighbour(world: &World, viewer: Entity, entity: Entity) -> Option<Neighbour> {
    world.get::<Alive>(entity)?;
    let id = world.get::<AgentId>(entity)?;
    let position = world.get::<Position>(entity).copied().unwrap_or_default();
    Some(Neighbour {
        id: id.0.clone(),
        name: world
            .get::<AgentName>(entity)
            .map(|n| n.0.clone())
            .unwrap_or_else(|| id.0.clone()),
        x: position.x,
        y: position.y,
        level: world.get::<Cultivation>(entity).map(|c| c.level).unwrap_or(0),
        relation: world
            .get::<Relations>(viewer)
            .and_then(|r| r.get(&id.0))
            .map(|r| r.label().to_string()),
    })
}

fn decide_subject(world: &World, entity: Entity) -> Option<DecideSubject> {
    let agent = agent_brief(world, entity)?;
    let neighbours = world
        .get::<Observation>(entity)
        .map(|o| o.visible.iter().filter_map(|&v| neighbour(world, entity, v)).collect())
        .unwrap_or_default();
    let memories = world
        .get_resource::<History>()
        .map(|h| {
            h.0.by_agent(&agent.id, DECISION_MEMORIES)
                .iter()
                .map(|e| e.to_string())
                .collect()
        })
        .unwrap_or_default();
    Some(DecideSubject {
        agent,
        neighbours,
        memories,
    })
}

/// Queues a decision's plans and records the reasoning behind it.
fn load_decision(world: &mut World, entity: Entity, decision: AgentDecision, services: &Services) {
    let oracle = &services.config.oracle;
    let now = current_month(world);
    let expiry = oracle.plan_expiry_months.map(|months| now.plus(months));

    let plans = decision.plans.into_iter().map(|planned| {
        let plan = ActionPlan::new(planned.action, planned.params).with_retries(oracle.plan_max_retries);
        match expiry {
            Some(tick) => plan.expires_at(tick),
            None => plan,
        }
    });
    if let Some(mut queue) = world.get_mut::<PlanQueue>(entity) {
        queue.0.extend(plans);
    }
    if let Some(mut mind) = world.get_mut::<Mind>(entity) {
        mind.thinking = decision.thinking;
        mind.short_term_objective = decision.short_term_objective;
    }
}

/// Asks the oracle for plans for every agent with nothing to do.
pub async fn decide(world: &mut World, services: &Services) -> Result<(), SimError> {
    let idle: Vec<Entity> = live_agents(world)
        .into_iter()
        .filter(|&e| is_idle(world, e) && !has_plans(world, e))
        .collect();
    if idle.is_empty() {
        return Ok(());
    }

    let now = current_month(world);
    let phenomenon = world
        .get_resource::<WorldPhenomenon>()
        .map(|p| format!("{}: {}", p.spec.name, p.spec.description))
        .unwrap_or_default();
    let actions = services.registry.choices();
    let subjects: Vec<DecideSubject> = idle.iter().filter_map(|&e| decide_subject(world, e)).collect();

    let batch = services.config.oracle.max_decide_batch.max(1);
    let mut tasks = JoinSet::new();
    let mut batches: Vec<Vec<String>> = Vec::new();
    for (index, chunk) in subjects.chunks(batch).enumerate() {
        batches.push(chunk.iter().map(|s| s.agent.id.clone()).collect());
        let request = DecideRequest {
            tick: now,
            phenomenon: phenomenon.clone(),
            actions: actions.clone(),
            subjects: chunk.to_vec(),
        };
        let oracle = services.oracle.clone();
        tasks.spawn(async move { (index, oracle.decide(request).await) });
    }

    let mut replies = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, reply) = joined?;
        replies.insert(index, reply.map_err(|e| SimError::oracle("decision", e))?);
    }
    debug!(agents = subjects.len(), batches = batches.len(), "decisions received");

    for (index, mut reply) in replies {
        for id in &batches[index] {
            let Some(decision) = reply.decisions.remove(id) else {
                continue;
            };
            let entity = world.get_resource::<AgentDirectory>().and_then(|d| d.get(id));
            if let Some(entity) = entity.filter(|&e| world.get::<Alive>(e).is_some()) {
                load_decision(world, entity, decision, services);
            }
        }
    }
    Ok(())
}

/// Starts the best viable plan of every idle agent.
pub fn commit_plans(world: &mut World, services: &Services, calls: &mut PendingCalls) -> Result<(), SimError> {
    let events = tick_events(world);

    for entity in live_agents(world) {
        if !is_idle(world, entity) || !has_plans(world, entity) {
            continue;
        }
        let next = world
            .get::<PlanQueue>(entity)
            .and_then(|q| q.peek_best())
            .map(|p| p.action_name.clone())
            .unwrap_or_default();

        let committed = {
            let mut ctx = ActionContext::new(world, entity, services, calls);
            commit_next_plan(&mut ctx)
        };
        match committed {
            Ok(Some(event)) => events.push(event),
            Ok(None) => debug!(?entity, "no viable plan"),
            Err(error) => contain_failure(world, services, "commit", entity, &next, error, &events)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::events::TickEvents;
    use crate::runtime::ActionParams;
    use crate::testing::{ScriptedModel, TestWorld};
    use std::sync::Arc;

    const TWO_DECISIONS: &str = r#"{"decisions": {
        "avatar_0001": {"plans": [{"action": "Rest"}, {"action": "Cultivate"}], "thinking": "build strength", "short_term_objective": "train"},
        "avatar_0002": {"plans": [{"action": "Move", "params": {"dx": 1}}]}
    }}"#;

    fn test_world(config: SimConfig, model: Arc<ScriptedModel>) -> TestWorld {
        let registry = crate::actions::builtin_registry().unwrap();
        let mut tw = TestWorld::with_parts(config, registry, model);
        crate::systems::install_resources(&mut tw.world, &tw.services);
        tw
    }

    #[tokio::test]
    async fn test_decisions_loaded_with_expiry() {
        let model = Arc::new(ScriptedModel::new([TWO_DECISIONS]));
        let mut tw = test_world(SimConfig::default(), model.clone());
        let a = tw.spawn_agent("avatar_0001", (0, 0));
        let b = tw.spawn_agent("avatar_0002", (3, 3));
        let now = current_month(&tw.world);

        decide(&mut tw.world, &tw.services).await.unwrap();

        assert_eq!(model.calls(), 1);
        let queue = tw.world.get::<PlanQueue>(a).unwrap();
        let names: Vec<_> = queue.0.iter().map(|p| p.action_name.as_str()).collect();
        assert_eq!(names, vec!["Rest", "Cultivate"]);
        assert_eq!(queue.0[0].expiry_tick, Some(now.plus(6)));
        assert_eq!(tw.world.get::<Mind>(a).unwrap().short_term_objective, "train");
        assert_eq!(tw.world.get::<PlanQueue>(b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batches_fan_out_separately() {
        let mut config = SimConfig::default();
        config.oracle.max_decide_batch = 1;
        let model = Arc::new(ScriptedModel::new([TWO_DECISIONS, TWO_DECISIONS]));
        let mut tw = test_world(config, model.clone());
        let a = tw.spawn_agent("avatar_0001", (0, 0));
        let b = tw.spawn_agent("avatar_0002", (3, 3));

        decide(&mut tw.world, &tw.services).await.unwrap();

        assert_eq!(model.calls(), 2);
        // Each agent only takes plans from its own batch's reply
        assert_eq!(tw.world.get::<PlanQueue>(a).unwrap().len(), 2);
        assert_eq!(tw.world.get::<PlanQueue>(b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_agents_not_asked() {
        let model = Arc::new(ScriptedModel::default());
        let mut tw = test_world(SimConfig::default(), model.clone());
        let a = tw.spawn_agent("avatar_0001", (0, 0));
        tw.world
            .get_mut::<PlanQueue>(a)
            .unwrap()
            .push(ActionPlan::new("Cultivate", ActionParams::new()));

        decide(&mut tw.world, &tw.services).await.unwrap();
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_fatal() {
        let mut tw = test_world(SimConfig::default(), Arc::new(ScriptedModel::new(["no json here"])));
        tw.spawn_agent("avatar_0001", (0, 0));

        let err = decide(&mut tw.world, &tw.services).await.unwrap_err();
        assert!(matches!(err, SimError::Oracle { phase: "decision", .. }));
    }

    #[test]
    fn test_commit_skips_plans_that_cannot_start() {
        let mut tw = test_world(SimConfig::default(), Arc::new(ScriptedModel::default()));
        let a = tw.spawn_agent("avatar_0001", (0, 0));
        {
            let mut queue = tw.world.get_mut::<PlanQueue>(a).unwrap();
            // Full health, so resting is refused
            queue.push(ActionPlan::new("Rest", ActionParams::new()));
            queue.push(ActionPlan::new("Cultivate", ActionParams::new()));
        }

        let mut calls = PendingCalls::new();
        commit_plans(&mut tw.world, &tw.services, &mut calls).unwrap();

        let slot = tw.world.get::<ActionSlot>(a).unwrap();
        assert_eq!(slot.current_name(), Some("Cultivate"));
        assert!(slot.fresh);
        assert!(tw.world.get::<PlanQueue>(a).unwrap().is_empty());
        assert_eq!(tw.world.resource::<TickEvents>().len(), 1);
    }
}
