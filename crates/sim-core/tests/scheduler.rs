//! Monthly scheduler tests
//!
//! Whole-tick behaviour: history flushing, clock handling, and aborted months.

use bevy_ecs::prelude::*;
use std::sync::Arc;

use sim_core::actions::builtin_registry;
use sim_core::components::{Alive, Mind, WorldClock};
use sim_core::runtime::{ActionDescriptor, ActionParams, ActionPlan, ActionSlot, PlanQueue, Temporal, TARGET_PARAM};
use sim_core::testing::{ScriptedModel, StubAction, TestWorld};
use sim_core::{RuleBasedModel, SimConfig, SimError, Simulator, TickEvents};

fn config(seed: u64) -> SimConfig {
    let mut config = SimConfig::default();
    config.simulation.seed = seed;
    config.simulation.initial_population = 6;
    config.simulation.map_width = 8;
    config.simulation.map_height = 8;
    config
}

#[tokio::test]
async fn test_two_years_fill_the_history() {
    let mut sim = Simulator::new(config(11), Arc::new(RuleBasedModel::new(11))).unwrap();
    let start = sim.now();
    let mut returned = 0;

    sim.run(24, |month, events| {
        assert!(events.iter().all(|e| e.tick <= month));
        returned += events.len();
    })
    .await
    .unwrap();

    assert_eq!(sim.now(), start.plus(24));
    assert!(returned > 0);
    assert_eq!(sim.history().len(), returned);
    assert!(sim.world().resource::<TickEvents>().is_empty());
}

#[tokio::test]
async fn test_objectives_are_set_in_the_first_month() {
    let mut sim = Simulator::new(config(5), Arc::new(RuleBasedModel::new(5))).unwrap();
    sim.step().await.unwrap();

    let world = sim.world_mut();
    let mut query = world.query_filtered::<&Mind, bevy_ecs::query::With<Alive>>();
    assert!(query.iter(world).all(|mind| mind.long_term_objective.is_some()));
}

#[tokio::test]
async fn test_oracle_failure_abandons_the_month() {
    let mut tw = TestWorld::with_model(Arc::new(ScriptedModel::default()));
    tw.spawn_agent("avatar_0001", (0, 0));
    tw.spawn_agent("avatar_0002", (3, 3));
    let mut sim = Simulator::from_parts(tw.world, tw.services);
    let start = sim.now();

    let err = sim.step().await.unwrap_err();

    assert!(matches!(err, SimError::Oracle { phase: "objectives", .. }), "{}", err);
    assert_eq!(sim.now(), start);
    assert!(sim.history().is_empty());
    assert!(sim.world().resource::<TickEvents>().is_empty());
}

fn settle_in(tw: &mut TestWorld, agent: Entity, plans: Vec<ActionPlan>) {
    let now = tw.world.resource::<WorldClock>().now;
    let mut mind = tw.world.get_mut::<Mind>(agent).unwrap();
    mind.long_term_objective = Some("Keep to the path".to_string());
    mind.objective_set_at = Some(now);
    let mut queue = tw.world.get_mut::<PlanQueue>(agent).unwrap();
    for plan in plans {
        queue.push(plan);
    }
}

#[tokio::test]
async fn test_aborted_month_lets_reaction_calls_finish() {
    let mut registry = builtin_registry().unwrap();
    registry
        .register(
            ActionDescriptor::new("Faulty", "breaks when stepped", Temporal::Instant)
                .with_factory(|| Box::new(StubAction::new("Faulty").failing())),
            true,
        )
        .unwrap();
    registry
        .register(
            ActionDescriptor::new("Wait", "waits a year", Temporal::timed(12))
                .with_factory(|| Box::new(StubAction::new("Wait").timed(12))),
            true,
        )
        .unwrap();
    let mut config = SimConfig::default();
    config.population.birth_chance = 0.0;
    config.passive.fortune_chance = 0.0;
    config.passive.misfortune_chance = 0.0;
    let reject = r#"{"reaction": "Reject", "thinking": "not now"}"#;
    let mut tw = TestWorld::with_parts(config, registry, Arc::new(ScriptedModel::new([reject])));

    let initiator = tw.spawn_agent("avatar_0001", (0, 0));
    let target = tw.spawn_agent("avatar_0002", (1, 0));
    let faulty = tw.spawn_agent("avatar_0003", (5, 5));
    let talk = ActionParams::new().with(TARGET_PARAM, "avatar_0002");
    settle_in(&mut tw, initiator, vec![ActionPlan::new("Talk", talk)]);
    settle_in(&mut tw, target, vec![ActionPlan::new("Wait", ActionParams::new())]);
    settle_in(
        &mut tw,
        faulty,
        vec![
            ActionPlan::new("Faulty", ActionParams::new()).with_priority(1),
            ActionPlan::new("Cultivate", ActionParams::new()),
        ],
    );
    let mut sim = Simulator::from_parts(tw.world, tw.services);

    let err = sim.step().await.unwrap_err();
    assert!(matches!(err, SimError::Action { ref action, .. } if action == "Faulty"), "{}", err);
    assert_eq!(sim.world().get::<ActionSlot>(initiator).unwrap().current_name(), Some("Talk"));

    sim.step().await.unwrap();

    assert!(sim.world().get::<ActionSlot>(initiator).unwrap().is_idle());
    assert_eq!(sim.world().get::<Mind>(target).unwrap().thinking, "not now");
    assert!(sim.history().recent(20).iter().any(|e| e.content.contains("Reject")));
}
