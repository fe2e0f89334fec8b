//! Combat Actions
//!
//! Attacking someone, and the two ways the attacked can respond: fleeing
//! or fighting back.

use async_trait::async_trait;
use bevy_ecs::prelude::*;

use sim_events::{Event, MonthStamp};

use super::{compose_story, require_target, resolve_target, ATTACK, BATTLE, ESCAPE, MOVE_AWAY};
use crate::components::{Cultivation, Vitals};
use crate::error::ActionError;
use crate::runtime::{
    Action, ActionContext, ActionParams, ActionPlan, Behavior, Interaction, MutualAction, Shaped,
    Temporal, TARGET_PARAM,
};

pub const ATTACK_SUMMARY: &str = "Attack someone within reach; they may flee or fight back";
pub const ATTACK_REACTIONS: &[&str] = &["Escape", "Battle"];

/// Chance to slip away from a pursuer, by level difference.
pub fn escape_chance(own_level: u32, pursuer_level: u32) -> f64 {
    let diff = f64::from(own_level) - f64::from(pursuer_level);
    (0.5 + 0.1 * diff).clamp(0.1, 0.9)
}

fn level_of(ctx: &ActionContext<'_>, entity: Entity) -> u32 {
    ctx.world.get::<Cultivation>(entity).map(|c| c.level).unwrap_or(0)
}

fn target_plan(action: &str, target_id: String) -> ActionPlan {
    ActionPlan::new(action, ActionParams::new().with(TARGET_PARAM, target_id))
}

/// Instant duel; both sides take damage, the loser far more.
#[derive(Debug, Default)]
pub struct Battle {
    target: Option<Entity>,
    summary: Option<String>,
}

impl Battle {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(BATTLE, Temporal::Instant, Battle::default())
    }

    /// Fighting strength for one exchange.
    fn power(ctx: &mut ActionContext<'_>, entity: Entity) -> i32 {
        level_of(ctx, entity) as i32 * 10 + ctx.range(0, 20)
    }
}

#[async_trait]
impl Behavior for Battle {
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        resolve_target(ctx, params).map(|_| ())
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let target = require_target(ctx, params)?;
        self.target = Some(target);
        Ok(Event::new(
            ctx.now,
            format!("{} squares off against {}", ctx.name_of(ctx.actor), ctx.name_of(target)),
        )
        .with_agents([ctx.actor_id()?, ctx.agent_id(target)?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let Some(target) = self.target.filter(|t| ctx.is_live(*t)) else {
            return Ok(Vec::new());
        };

        let actor = ctx.actor;
        let (winner, loser) = if Self::power(ctx, actor) >= Self::power(ctx, target) {
            (actor, target)
        } else {
            (target, actor)
        };
        let gap = level_of(ctx, winner).saturating_sub(level_of(ctx, loser)) as i32;
        let loser_damage = 20 + ctx.range(0, 15) + 5 * gap;
        let winner_damage = ctx.range(0, 10);
        ctx.component_mut::<Vitals>(loser)?.damage(loser_damage);
        ctx.component_mut::<Vitals>(winner)?.damage(winner_damage);

        let text = format!(
            "{} defeats {} in battle, dealing {} damage and taking {}",
            ctx.name_of(winner),
            ctx.name_of(loser),
            loser_damage,
            winner_damage
        );
        self.summary = Some(text.clone());
        Ok(vec![Event::new(ctx.now, text)
            .with_agents([ctx.actor_id()?, ctx.agent_id(target)?])
            .major()])
    }

    async fn conclude(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        match (self.target, self.summary.take()) {
            (Some(target), Some(summary)) => Ok(vec![compose_story(ctx, target, vec![summary]).await?]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Instant flight attempt. Success turns into keeping away from the
/// pursuer, failure into a battle with them; either replaces this agent's
/// plans.
#[derive(Debug, Default)]
pub struct Escape {
    target: Option<Entity>,
}

impl Escape {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(ESCAPE, Temporal::Instant, Escape::default())
    }
}

impl Behavior for Escape {
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        resolve_target(ctx, params).map(|_| ())
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let target = require_target(ctx, params)?;
        self.target = Some(target);
        Ok(Event::new(
            ctx.now,
            format!("{} tries to escape from {}", ctx.name_of(ctx.actor), ctx.name_of(target)),
        )
        .with_agents([ctx.actor_id()?, ctx.agent_id(target)?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let Some(target) = self.target.filter(|t| ctx.is_live(*t)) else {
            return Ok(Vec::new());
        };
        let ids = [ctx.actor_id()?, ctx.agent_id(target)?];
        let chance = escape_chance(level_of(ctx, ctx.actor), level_of(ctx, target));
        let escaped = ctx.roll(chance);

        let (verdict, follow_up) = if escaped {
            ("escapes from", MOVE_AWAY)
        } else {
            ("fails to escape from", BATTLE)
        };
        let mut events = vec![Event::new(
            ctx.now,
            format!("{} {} {}", ctx.name_of(ctx.actor), verdict, ctx.name_of(target)),
        )
        .with_agents(ids.clone())];

        let plan = target_plan(follow_up, ids[1].clone());
        if let Some(begin) = ctx.force_assign(ctx.actor, plan)? {
            events.push(begin);
        }
        Ok(events)
    }
}

/// Reaction handling for an attack.
#[derive(Debug, Default)]
pub struct Attack;

impl Attack {
    pub fn boxed() -> Box<dyn Action> {
        Box::new(MutualAction::new(ATTACK, ATTACK_SUMMARY, Attack))
    }
}

impl Interaction for Attack {
    fn reactions(&self) -> &'static [&'static str] {
        ATTACK_REACTIONS
    }

    fn begin_text(&self, initiator: &str, target: &str) -> String {
        format!("{} attacks {}", initiator, target)
    }

    fn settle(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: Entity,
        reaction: &str,
        _at: MonthStamp,
    ) -> Result<Vec<Event>, ActionError> {
        let follow_up = if reaction.eq_ignore_ascii_case("Escape") {
            ESCAPE
        } else {
            BATTLE
        };
        let plan = target_plan(follow_up, ctx.actor_id()?);
        Ok(ctx.force_assign(target, plan)?.into_iter().collect())
    }
}
