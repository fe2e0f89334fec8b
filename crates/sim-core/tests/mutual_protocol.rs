//! Mutual action tests
//!
//! One oracle request per mutual action, stale replies, start-month stamps,
//! and reaction chains inside the execute phase.

use bevy_ecs::prelude::*;
use std::sync::Arc;
use tokio::sync::Semaphore;

use sim_core::actions::builtin_registry;
use sim_core::components::{Alive, Mind, Relation, Relations, Vitals, WorldClock};
use sim_core::runtime::{
    preempt, Action, ActionContext, ActionParams, ActionPlan, ActionSlot, ActionStatus, PendingCalls, PlanQueue,
    StepOutcome, TARGET_PARAM,
};
use sim_core::systems::{commit_plans, execute_actions, install_resources};
use sim_core::config::ActionErrorPolicy;
use sim_core::testing::{ScriptedModel, TestWorld};
use sim_core::{OracleError, SimConfig, SimError, TickEvents};

const ACCEPT: &str = r#"{"reaction": "Accept", "thinking": "why not"}"#;
const REJECT: &str = r#"{"reaction": "Reject", "thinking": "too busy today"}"#;
const FIGHT_BACK: &str = r#"{"reaction": "battle", "thinking": "no one pushes me around"}"#;
const STORY: &str = r#"{"text": "Dust rose over the valley as the two clashed."}"#;

struct Duo {
    tw: TestWorld,
    model: Arc<ScriptedModel>,
    initiator: Entity,
    target: Entity,
}

fn duo(config: SimConfig, model: ScriptedModel) -> Duo {
    let model = Arc::new(model);
    let mut tw = TestWorld::with_parts(config, builtin_registry().unwrap(), model.clone());
    install_resources(&mut tw.world, &tw.services);
    let initiator = tw.spawn_agent("avatar_0001", (0, 0));
    let target = tw.spawn_agent("avatar_0002", (1, 0));
    Duo {
        tw,
        model,
        initiator,
        target,
    }
}

fn target_params() -> ActionParams {
    ActionParams::new().with(TARGET_PARAM, "avatar_0002")
}

fn step(duo: &mut Duo, action: &mut Box<dyn Action>, calls: &mut PendingCalls) -> StepOutcome {
    let params = target_params();
    let mut ctx = ActionContext::new(&mut duo.tw.world, duo.initiator, &duo.tw.services, calls);
    action.step(&mut ctx, &params).unwrap()
}

/// Instantiates and starts `name` for the initiator.
fn begin(duo: &mut Duo, name: &str, calls: &mut PendingCalls) -> Box<dyn Action> {
    let params = target_params();
    let mut action = duo.tw.services.registry.instantiate(name).unwrap();
    let mut ctx = ActionContext::new(&mut duo.tw.world, duo.initiator, &duo.tw.services, calls);
    action.can_start(&ctx, &params).unwrap();
    action.start(&mut ctx, &params).unwrap();
    action
}

async fn let_tasks_run() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_repeated_steps_issue_a_single_request() {
    let gate = Arc::new(Semaphore::new(0));
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([REJECT]).gated(gate.clone()));
    let mut calls = PendingCalls::new();
    let mut talk = begin(&mut duo, "Talk", &mut calls);

    for _ in 0..4 {
        assert_eq!(step(&mut duo, &mut talk, &mut calls).status, ActionStatus::Running);
        let_tasks_run().await;
    }
    assert_eq!(duo.model.calls(), 1);
    assert_eq!(calls.len(), 1);
    assert!(talk.awaiting_reply());

    gate.add_permits(1);
    calls.settle().await.unwrap();

    let outcome = step(&mut duo, &mut talk, &mut calls);
    assert_eq!(outcome.status, ActionStatus::Completed);
    assert!(!talk.awaiting_reply());
    assert_eq!(duo.model.calls(), 1);
    assert!(outcome.events.iter().any(|e| e.content.contains("Reject")));
    assert_eq!(
        duo.tw.world.get::<Mind>(duo.target).unwrap().thinking,
        "too busy today"
    );
}

#[tokio::test]
async fn test_reply_for_preempted_target_is_discarded() {
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([REJECT]));
    let mut calls = PendingCalls::new();
    let mut talk = begin(&mut duo, "Talk", &mut calls);
    assert_eq!(step(&mut duo, &mut talk, &mut calls).status, ActionStatus::Running);

    preempt(&mut duo.tw.world, duo.target);
    duo.tw
        .world
        .get_mut::<PlanQueue>(duo.target)
        .unwrap()
        .push(ActionPlan::new("Cultivate", ActionParams::new()));
    calls.settle().await.unwrap();

    let outcome = step(&mut duo, &mut talk, &mut calls);
    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.events.is_empty());
    // Nothing was written to the target
    assert_eq!(duo.tw.world.get::<Mind>(duo.target).unwrap().thinking, "");
    assert_eq!(duo.tw.world.get::<PlanQueue>(duo.target).unwrap().len(), 1);
}

#[tokio::test]
async fn test_reply_for_dead_target_is_discarded() {
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([REJECT]));
    let mut calls = PendingCalls::new();
    let mut talk = begin(&mut duo, "Talk", &mut calls);
    step(&mut duo, &mut talk, &mut calls);

    duo.tw.world.entity_mut(duo.target).remove::<Alive>();
    calls.settle().await.unwrap();

    let outcome = step(&mut duo, &mut talk, &mut calls);
    assert_eq!(outcome.status, ActionStatus::Failed);
    assert_eq!(duo.tw.world.get::<Mind>(duo.target).unwrap().thinking, "");
}

#[tokio::test]
async fn test_late_resolution_is_stamped_with_start_month() {
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([REJECT]));
    let started = duo.tw.world.resource::<WorldClock>().now;
    let mut calls = PendingCalls::new();
    let mut talk = begin(&mut duo, "Talk", &mut calls);
    step(&mut duo, &mut talk, &mut calls);
    calls.settle().await.unwrap();

    duo.tw.world.resource_mut::<WorldClock>().advance();
    duo.tw.world.resource_mut::<WorldClock>().advance();
    let outcome = step(&mut duo, &mut talk, &mut calls);

    assert_eq!(outcome.status, ActionStatus::Completed);
    assert!(!outcome.events.is_empty());
    assert!(outcome.events.iter().all(|e| e.tick == started));
}

#[tokio::test]
async fn test_outbound_calls_respect_the_global_bound() {
    let gate = Arc::new(Semaphore::new(0));
    let mut config = SimConfig::default();
    config.oracle.max_concurrent_calls = 1;
    let mut duo = duo(config, ScriptedModel::new([REJECT, REJECT]).gated(gate.clone()));
    let third = duo.tw.spawn_agent("avatar_0003", (0, 1));

    let mut calls = PendingCalls::new();
    let mut first = begin(&mut duo, "Talk", &mut calls);
    step(&mut duo, &mut first, &mut calls);

    let params = target_params();
    let mut second = duo.tw.services.registry.instantiate("Talk").unwrap();
    {
        let mut ctx = ActionContext::new(&mut duo.tw.world, third, &duo.tw.services, &mut calls);
        second.start(&mut ctx, &params).unwrap();
        second.step(&mut ctx, &params).unwrap();
    }
    let_tasks_run().await;

    assert_eq!(calls.len(), 2);
    assert_eq!(duo.model.calls(), 1);
    assert_eq!(duo.tw.services.oracle.available_permits(), 0);

    gate.add_permits(2);
    calls.settle().await.unwrap();
    assert_eq!(duo.model.calls(), 2);
    assert_eq!(duo.tw.services.oracle.available_permits(), 1);
}

#[tokio::test]
async fn test_reaction_chain_resolves_within_the_month() {
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([FIGHT_BACK, STORY]));
    duo.tw
        .world
        .get_mut::<PlanQueue>(duo.initiator)
        .unwrap()
        .push(ActionPlan::new("Attack", target_params()));
    let now = duo.tw.world.resource::<WorldClock>().now;

    let mut calls = PendingCalls::new();
    commit_plans(&mut duo.tw.world, &duo.tw.services, &mut calls).unwrap();
    execute_actions(&mut duo.tw.world, &duo.tw.services, &mut calls).await.unwrap();

    assert_eq!(duo.model.calls(), 2);
    assert!(duo.tw.world.get::<ActionSlot>(duo.initiator).unwrap().is_idle());
    assert!(duo.tw.world.get::<ActionSlot>(duo.target).unwrap().is_idle());
    let hurt = [duo.initiator, duo.target]
        .iter()
        .any(|&e| duo.tw.world.get::<Vitals>(e).unwrap().hp < 100);
    assert!(hurt);

    let events = duo.tw.world.resource::<TickEvents>().drain();
    assert!(events.iter().all(|e| e.tick == now));
    assert!(events.iter().any(|e| e.content.contains("answers") && e.content.contains("Battle")));
    assert!(events.iter().any(|e| e.content.contains("defeats") && e.is_major));
    assert!(events.iter().any(|e| e.is_story));
}

#[tokio::test]
async fn test_chain_past_round_cap_continues_next_month() {
    let mut config = SimConfig::default();
    config.scheduler.max_local_rounds = 2;
    let mut duo = duo(config, ScriptedModel::new([FIGHT_BACK, STORY]));
    duo.tw
        .world
        .get_mut::<PlanQueue>(duo.initiator)
        .unwrap()
        .push(ActionPlan::new("Attack", target_params()));

    let mut calls = PendingCalls::new();
    commit_plans(&mut duo.tw.world, &duo.tw.services, &mut calls).unwrap();
    execute_actions(&mut duo.tw.world, &duo.tw.services, &mut calls).await.unwrap();

    let slot = duo.tw.world.get::<ActionSlot>(duo.target).unwrap();
    assert_eq!(slot.current_name(), Some("Battle"));
    assert!(slot.fresh);
    assert_eq!(duo.model.calls(), 1);

    duo.tw.world.resource_mut::<WorldClock>().advance();
    execute_actions(&mut duo.tw.world, &duo.tw.services, &mut calls).await.unwrap();

    assert!(duo.tw.world.get::<ActionSlot>(duo.target).unwrap().is_idle());
    assert_eq!(duo.model.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_reaction_call_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([REJECT]).gated(gate));
    let mut calls = PendingCalls::new();
    let mut talk = begin(&mut duo, "Talk", &mut calls);
    step(&mut duo, &mut talk, &mut calls);
    let_tasks_run().await;
    assert!(talk.awaiting_reply());

    // Dropping the tracker aborts the call before it can answer
    drop(calls);
    let_tasks_run().await;

    let mut calls = PendingCalls::new();
    let outcome = step(&mut duo, &mut talk, &mut calls);
    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.events.is_empty());
    assert!(!talk.awaiting_reply());
    assert_eq!(duo.tw.world.get::<Mind>(duo.target).unwrap().thinking, "");
}

#[tokio::test]
async fn test_malformed_reaction_aborts_even_when_isolating() {
    let mut config = SimConfig::default();
    config.scheduler.action_error_policy = ActionErrorPolicy::Isolate;
    config.oracle.max_parse_retries = 0;
    let mut duo = duo(config, ScriptedModel::new(["garbage, not json"]));
    duo.tw
        .world
        .get_mut::<PlanQueue>(duo.initiator)
        .unwrap()
        .push(ActionPlan::new("Talk", target_params()));

    let mut calls = PendingCalls::new();
    commit_plans(&mut duo.tw.world, &duo.tw.services, &mut calls).unwrap();
    let err = execute_actions(&mut duo.tw.world, &duo.tw.services, &mut calls)
        .await
        .unwrap_err();

    match err {
        SimError::Oracle { phase, source } => {
            assert_eq!(phase, "execute");
            assert!(matches!(source, OracleError::Malformed { attempts: 1, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    let events = duo.tw.world.resource::<TickEvents>().drain();
    assert!(events.iter().all(|e| !e.content.contains("came to nothing")));
}

/// Runs one month in which the initiator talks to the target.
async fn talk_through(duo: &mut Duo) -> Vec<sim_events::Event> {
    duo.tw
        .world
        .get_mut::<PlanQueue>(duo.initiator)
        .unwrap()
        .push(ActionPlan::new("Talk", target_params()));
    let mut calls = PendingCalls::new();
    commit_plans(&mut duo.tw.world, &duo.tw.services, &mut calls).unwrap();
    execute_actions(&mut duo.tw.world, &duo.tw.services, &mut calls).await.unwrap();
    duo.tw.world.resource::<TickEvents>().drain()
}

fn relation(duo: &Duo, from: Entity, to: &str) -> Option<Relation> {
    duo.tw.world.get::<Relations>(from).unwrap().get(to)
}

#[tokio::test]
async fn test_conversation_settles_a_relation_on_both_sides() {
    let bond = r#"{"reaction": "master", "thinking": "I will learn from them"}"#;
    let mut duo = duo(SimConfig::default(), ScriptedModel::new([ACCEPT, STORY, bond]));

    let events = talk_through(&mut duo).await;

    assert_eq!(duo.model.calls(), 3);
    assert_eq!(relation(&duo, duo.initiator, "avatar_0002"), Some(Relation::Master));
    assert_eq!(relation(&duo, duo.target, "avatar_0001"), Some(Relation::Apprentice));
    let pair = events
        .iter()
        .find(|e| e.content.contains("regards"))
        .expect("relation event");
    assert!(pair.involves_agent("avatar_0001") && pair.involves_agent("avatar_0002"));
    assert!(events.iter().any(|e| e.is_story));
}

#[tokio::test]
async fn test_unchanged_or_repeated_relation_emits_nothing() {
    let unchanged = r#"{"reaction": "Unchanged", "thinking": ""}"#;
    let friend = r#"{"reaction": "Friend", "thinking": ""}"#;

    let mut strangers = duo(SimConfig::default(), ScriptedModel::new([ACCEPT, STORY, unchanged]));
    let events = talk_through(&mut strangers).await;
    assert_eq!(strangers.model.calls(), 3);
    assert!(events.iter().all(|e| !e.content.contains("regards")));
    assert_eq!(relation(&strangers, strangers.initiator, "avatar_0002"), None);
    assert_eq!(relation(&strangers, strangers.target, "avatar_0001"), None);

    let mut friends = duo(SimConfig::default(), ScriptedModel::new([ACCEPT, STORY, friend]));
    friends
        .tw
        .world
        .get_mut::<Relations>(friends.initiator)
        .unwrap()
        .set("avatar_0002", Relation::Friend);
    let events = talk_through(&mut friends).await;
    assert!(events.iter().all(|e| !e.content.contains("regards")));
    assert_eq!(relation(&friends, friends.initiator, "avatar_0002"), Some(Relation::Friend));
    assert_eq!(relation(&friends, friends.target, "avatar_0001"), None);
}
