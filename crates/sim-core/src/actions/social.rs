//! Social Actions
//!
//! Striking up a talk, the conversation that follows, and passing on
//! teachings to a junior.

use async_trait::async_trait;
use bevy_ecs::prelude::*;

use sim_events::{Event, MonthStamp};

use super::{compose_story, require_target, resolve_target, CONVERSATION, IMPART, TALK};
use crate::components::{Cultivation, Relation, Relations};
use crate::error::ActionError;
use crate::oracle::ReactRequest;
use crate::runtime::{
    Action, ActionContext, ActionParams, ActionPlan, Behavior, Interaction, MutualAction, Shaped,
    Temporal, TARGET_PARAM,
};

pub const TALK_SUMMARY: &str = "Approach someone within reach for a conversation";
pub const TALK_REACTIONS: &[&str] = &["Accept", "Reject"];

pub const IMPART_SUMMARY: &str = "Pass teachings on to a junior within reach, granting them experience";
pub const IMPART_REACTIONS: &[&str] = &["Accept", "Reject"];
pub const IMPART_COOLDOWN_MONTHS: u64 = 6;
/// Levels the mentor must be ahead by
pub const IMPART_LEVEL_GAP: u32 = 2;
pub const IMPART_EXP: u64 = 200;

/// Memory lines fed into a conversation story
const CONVERSATION_CONTEXT: usize = 5;

/// Relation choice that leaves the bond as it was
pub const RELATION_UNCHANGED: &str = "Unchanged";

/// Choices offered to the oracle once a conversation is over.
pub fn relation_choices() -> Vec<String> {
    Relation::ALL
        .iter()
        .map(|r| r.label().to_string())
        .chain([RELATION_UNCHANGED.to_string()])
        .collect()
}

/// Approach; acceptance chains the initiator into a [`Conversation`].
#[derive(Debug, Default)]
pub struct Talk;

impl Talk {
    pub fn boxed() -> Box<dyn Action> {
        Box::new(MutualAction::new(TALK, TALK_SUMMARY, Talk))
    }
}

impl Interaction for Talk {
    fn reactions(&self) -> &'static [&'static str] {
        TALK_REACTIONS
    }

    fn begin_text(&self, initiator: &str, target: &str) -> String {
        format!("{} strikes up a conversation with {}", initiator, target)
    }

    fn settle(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: Entity,
        reaction: &str,
        at: MonthStamp,
    ) -> Result<Vec<Event>, ActionError> {
        let ids = [ctx.actor_id()?, ctx.agent_id(target)?];
        let (initiator, other) = (ctx.name_of(ctx.actor), ctx.name_of(target));

        if !reaction.eq_ignore_ascii_case("Accept") {
            return Ok(vec![
                Event::new(at, format!("{} turns {} away", other, initiator)).with_agents(ids)
            ]);
        }

        let mut events = vec![Event::new(at, format!("{} welcomes {}'s approach", other, initiator))
            .with_agents(ids.clone())];
        let plan = ActionPlan::new(CONVERSATION, ActionParams::new().with(TARGET_PARAM, ids[1].clone()));
        events.extend(ctx.chain(ctx.actor, plan)?);
        Ok(events)
    }
}

/// Instant exchange between two agents, narrated as a story.
#[derive(Debug, Default)]
pub struct Conversation {
    target: Option<Entity>,
}

impl Conversation {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(CONVERSATION, Temporal::Instant, Conversation::default())
    }
}

#[async_trait]
impl Behavior for Conversation {
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        let target = resolve_target(ctx, params)?;
        let range = ctx.config().perception.interaction_range;
        match ctx.distance(ctx.actor, target) {
            Some(d) if d <= range => Ok(()),
            _ => Err("too far apart to talk".to_string()),
        }
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let target = require_target(ctx, params)?;
        self.target = Some(target);
        Ok(Event::new(
            ctx.now,
            format!("{} and {} sit down to talk", ctx.name_of(ctx.actor), ctx.name_of(target)),
        )
        .with_agents([ctx.actor_id()?, ctx.agent_id(target)?]))
    }

    fn tick(&mut self, _ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        Ok(Vec::new())
    }

    async fn conclude(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let Some(target) = self.target.filter(|t| ctx.is_live(*t)) else {
            return Ok(Vec::new());
        };
        let context = ctx.shared_memories(ctx.actor, target, CONVERSATION_CONTEXT);
        let mut events = vec![compose_story(ctx, target, context).await?];
        events.extend(settle_relation(ctx, target).await?);
        Ok(events)
    }
}

/// Asks the oracle what `target` becomes to the actor after talking, and
/// records it on both sides.
async fn settle_relation(ctx: &mut ActionContext<'_>, target: Entity) -> Result<Option<Event>, ActionError> {
    let (actor_id, target_id) = (ctx.actor_id()?, ctx.agent_id(target)?);
    let (actor_name, target_name) = (ctx.name_of(ctx.actor), ctx.name_of(target));
    let current = ctx.component::<Relations>(ctx.actor)?.get(&target_id);

    let request = ReactRequest {
        tick: ctx.now,
        action: CONVERSATION.to_string(),
        summary: format!(
            "What {} becomes to {} after their conversation (now: {})",
            target_name,
            actor_name,
            current.map_or("no one in particular", |r| r.label())
        ),
        initiator: ctx.brief(ctx.actor)?,
        target: ctx.brief(target)?,
        reactions: relation_choices(),
        shared_history: ctx.shared_memories(ctx.actor, target, CONVERSATION_CONTEXT),
    };
    let reply = ctx.services.oracle.react(request).await?;

    let Some(relation) = Relation::from_label(&reply.reaction).filter(|r| current != Some(*r)) else {
        return Ok(None);
    };
    ctx.component_mut::<Relations>(ctx.actor)?.set(target_id.clone(), relation);
    ctx.component_mut::<Relations>(target)?.set(actor_id.clone(), relation.reciprocal());
    Ok(Some(
        Event::new(ctx.now, format!("{} now regards {} as {}", actor_name, target_name, relation))
            .with_agents([actor_id, target_id]),
    ))
}

/// Teaching a junior; acceptance grants experience.
#[derive(Debug, Default)]
pub struct Impart {
    accepted: bool,
}

impl Impart {
    pub fn boxed() -> Box<dyn Action> {
        Box::new(MutualAction::new(IMPART, IMPART_SUMMARY, Impart::default()))
    }
}

#[async_trait]
impl Interaction for Impart {
    fn reactions(&self) -> &'static [&'static str] {
        IMPART_REACTIONS
    }

    fn check(&self, ctx: &ActionContext<'_>, target: Entity) -> Result<(), String> {
        let level = |e| ctx.world.get::<Cultivation>(e).map(|c| c.level).unwrap_or(0);
        let (own, theirs) = (level(ctx.actor), level(target));
        if own < theirs + IMPART_LEVEL_GAP {
            return Err(format!(
                "must be {} levels ahead to teach, is {} ahead",
                IMPART_LEVEL_GAP,
                own.saturating_sub(theirs)
            ));
        }
        Ok(())
    }

    fn begin_text(&self, initiator: &str, target: &str) -> String {
        format!("{} offers to pass teachings on to {}", initiator, target)
    }

    fn settle(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: Entity,
        reaction: &str,
        at: MonthStamp,
    ) -> Result<Vec<Event>, ActionError> {
        let ids = [ctx.actor_id()?, ctx.agent_id(target)?];
        let (mentor, student) = (ctx.name_of(ctx.actor), ctx.name_of(target));
        self.accepted = reaction.eq_ignore_ascii_case("Accept");

        let text = if self.accepted {
            ctx.component_mut::<Cultivation>(target)?.exp += IMPART_EXP;
            format!("{} gains {} experience from {}'s teaching", student, IMPART_EXP, mentor)
        } else {
            format!("{} declines {}'s teaching", student, mentor)
        };
        Ok(vec![Event::new(at, text).with_agents(ids)])
    }

    async fn conclude(&mut self, ctx: &mut ActionContext<'_>, target: Entity) -> Result<Vec<Event>, ActionError> {
        if !self.accepted || !ctx.is_live(target) {
            return Ok(Vec::new());
        }
        let context = ctx.shared_memories(ctx.actor, target, CONVERSATION_CONTEXT);
        Ok(vec![compose_story(ctx, target, context).await?])
    }
}
