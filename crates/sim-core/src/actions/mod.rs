//! Action Catalogue
//!
//! The concrete actions avatars can take, and the registry bootstrap that
//! makes them available to the decision phase by name.

pub mod combat;
pub mod cultivation;
pub mod movement;
pub mod social;

use bevy_ecs::prelude::*;

use sim_events::Event;

use crate::error::{ActionError, RegistryError};
use crate::oracle::{ComposeKind, ComposeRequest};
use crate::runtime::{ActionContext, ActionDescriptor, ActionParams, ActionRegistry, Temporal, TARGET_PARAM};

pub use combat::{Attack, Battle, Escape};
pub use cultivation::{Breakthrough, Cultivate, Rest};
pub use movement::{Move, MoveAwayFromAvatar};
pub use social::{Conversation, Impart, Talk};

pub const MOVE: &str = "Move";
pub const CULTIVATE: &str = "Cultivate";
pub const REST: &str = "Rest";
pub const BREAKTHROUGH: &str = "Breakthrough";
pub const ESCAPE: &str = "Escape";
pub const BATTLE: &str = "Battle";
pub const MOVE_AWAY: &str = "MoveAwayFromAvatar";
pub const CONVERSATION: &str = "Conversation";
pub const ATTACK: &str = "Attack";
pub const TALK: &str = "Talk";
pub const IMPART: &str = "Impart";
/// Abstract base of the two-party actions
pub const INTERACTION: &str = "Interaction";

/// Registers every built-in action type.
pub fn builtin_registry() -> Result<ActionRegistry, RegistryError> {
    let mut registry = ActionRegistry::new();

    registry.register(
        ActionDescriptor::new(INTERACTION, "Two-party action resolved by the other side's reaction", Temporal::Instant),
        false,
    )?;

    registry.register(
        ActionDescriptor::new(MOVE, "Travel up to three steps on each axis", Temporal::Instant)
            .with_params(&["dx", "dy"])
            .with_factory(movement::Move::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(CULTIVATE, "Cultivate in seclusion to gain experience", Temporal::timed(cultivation::CULTIVATE_MONTHS))
            .with_factory(cultivation::Cultivate::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(REST, "Rest to recover health", Temporal::timed(cultivation::REST_MONTHS))
            .with_factory(cultivation::Rest::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(BREAKTHROUGH, "Spend spirit stones to break through to the next level", Temporal::Instant)
            .with_cooldown(cultivation::BREAKTHROUGH_COOLDOWN_MONTHS)
            .with_factory(cultivation::Breakthrough::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(ESCAPE, "Try to slip away from someone", Temporal::Instant)
            .with_params(&[TARGET_PARAM])
            .with_factory(combat::Escape::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(BATTLE, "Fight someone to decide who prevails", Temporal::Instant)
            .with_params(&[TARGET_PARAM])
            .with_factory(combat::Battle::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(MOVE_AWAY, "Keep moving away from someone", Temporal::timed(movement::MOVE_AWAY_MONTHS))
            .with_params(&[TARGET_PARAM])
            .with_factory(movement::MoveAwayFromAvatar::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(CONVERSATION, "Hold a conversation with someone", Temporal::Instant)
            .with_params(&[TARGET_PARAM])
            .with_factory(social::Conversation::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(ATTACK, combat::ATTACK_SUMMARY, Temporal::mutual(combat::ATTACK_REACTIONS))
            .with_params(&[TARGET_PARAM])
            .with_factory(combat::Attack::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(TALK, social::TALK_SUMMARY, Temporal::mutual(social::TALK_REACTIONS))
            .with_params(&[TARGET_PARAM])
            .with_factory(social::Talk::boxed),
        true,
    )?;
    registry.register(
        ActionDescriptor::new(IMPART, social::IMPART_SUMMARY, Temporal::mutual(social::IMPART_REACTIONS))
            .with_cooldown(social::IMPART_COOLDOWN_MONTHS)
            .with_params(&[TARGET_PARAM])
            .with_factory(social::Impart::boxed),
        true,
    )?;

    Ok(registry)
}

/// Resolves the `target` parameter to another live agent.
pub(crate) fn resolve_target(ctx: &ActionContext<'_>, params: &ActionParams) -> Result<Entity, String> {
    let id = params.str(TARGET_PARAM).map_err(|e| e.to_string())?;
    let target = ctx.live_agent(id)?;
    if target == ctx.actor {
        return Err("cannot target oneself".to_string());
    }
    Ok(target)
}

/// Same as [`resolve_target`], as an action error.
pub(crate) fn require_target(ctx: &ActionContext<'_>, params: &ActionParams) -> Result<Entity, ActionError> {
    resolve_target(ctx, params).map_err(|reason| ActionError::invalid_param(TARGET_PARAM, reason))
}

/// Asks the oracle for a short story about the actor and `other`.
pub(crate) async fn compose_story(
    ctx: &mut ActionContext<'_>,
    other: Entity,
    context: Vec<String>,
) -> Result<Event, ActionError> {
    let request = ComposeRequest {
        tick: ctx.now,
        kind: ComposeKind::Story,
        subject: ctx.brief(ctx.actor)?,
        other: Some(ctx.brief(other)?),
        context,
    };
    let text = ctx.services.oracle.compose(request).await?;
    Ok(Event::new(ctx.now, text)
        .with_agents([ctx.actor_id()?, ctx.agent_id(other)?])
        .story())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry().unwrap();
        let names: Vec<_> = registry.all_actual().iter().map(|d| d.name.clone()).collect();

        assert_eq!(names.len(), 11);
        assert!(!names.contains(&INTERACTION.to_string()));
        assert!(registry.get(INTERACTION).is_ok());
        assert_eq!(registry.get("breakthrough").unwrap().cooldown_months, 12);
        assert_eq!(registry.get("impart").unwrap().cooldown_months, 6);
    }

    #[test]
    fn test_every_actual_action_instantiates_under_its_name() {
        let registry = builtin_registry().unwrap();
        for descriptor in registry.all_actual() {
            let action = registry.instantiate(&descriptor.name).unwrap();
            assert_eq!(action.name(), descriptor.name);
        }
    }
}
