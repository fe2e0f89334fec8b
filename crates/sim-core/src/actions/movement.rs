//! Movement Actions
//!
//! Stepping across the map, and keeping away from someone.

use bevy_ecs::prelude::*;

use sim_events::Event;

use super::{require_target, resolve_target, MOVE, MOVE_AWAY};
use crate::components::{MapBounds, Position};
use crate::error::ActionError;
use crate::runtime::{Action, ActionContext, ActionParams, Behavior, Shaped, Temporal};

/// Largest step per axis for a single move
pub const MAX_STEP: i64 = 3;
pub const MOVE_AWAY_MONTHS: u64 = 3;

fn bounded(ctx: &ActionContext<'_>, pos: Position) -> Position {
    match ctx.world.get_resource::<MapBounds>() {
        Some(bounds) => bounds.clamp(pos),
        None => pos,
    }
}

fn offset(params: &ActionParams) -> (i32, i32) {
    let axis = |key: &str| params.int(key).unwrap_or(0).clamp(-MAX_STEP, MAX_STEP) as i32;
    (axis("dx"), axis("dy"))
}

/// Instant relocation by `dx`, `dy`.
#[derive(Debug, Default)]
pub struct Move;

impl Move {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(MOVE, Temporal::Instant, Move)
    }
}

impl Behavior for Move {
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        if offset(params) == (0, 0) {
            return Err("no direction given".to_string());
        }
        let here = ctx.world.get::<Position>(ctx.actor).copied().unwrap_or_default();
        let (dx, dy) = offset(params);
        if bounded(ctx, Position::new(here.x + dx, here.y + dy)) == here {
            return Err("already at the edge of the map".to_string());
        }
        Ok(())
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let here = *ctx.component::<Position>(ctx.actor)?;
        let (dx, dy) = offset(params);
        let there = bounded(ctx, Position::new(here.x + dx, here.y + dy));
        Ok(Event::new(
            ctx.now,
            format!("{} sets off toward ({}, {})", ctx.name_of(ctx.actor), there.x, there.y),
        )
        .with_agents([ctx.actor_id()?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let here = *ctx.component::<Position>(ctx.actor)?;
        let (dx, dy) = offset(params);
        let there = bounded(ctx, Position::new(here.x + dx, here.y + dy));
        *ctx.component_mut::<Position>(ctx.actor)? = there;
        Ok(Vec::new())
    }
}

/// Moves one step per month directly away from the target.
#[derive(Debug, Default)]
pub struct MoveAwayFromAvatar {
    target: Option<Entity>,
}

impl MoveAwayFromAvatar {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(MOVE_AWAY, Temporal::timed(MOVE_AWAY_MONTHS), MoveAwayFromAvatar::default())
    }
}

impl Behavior for MoveAwayFromAvatar {
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        resolve_target(ctx, params).map(|_| ())
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let target = require_target(ctx, params)?;
        self.target = Some(target);
        Ok(Event::new(
            ctx.now,
            format!("{} starts keeping away from {}", ctx.name_of(ctx.actor), ctx.name_of(target)),
        )
        .with_agents([ctx.actor_id()?, ctx.agent_id(target)?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        // A vanished pursuer leaves nothing to flee from
        let Some(target) = self.target.filter(|t| ctx.is_live(*t)) else {
            return Ok(Vec::new());
        };
        let from = *ctx.component::<Position>(target)?;
        let here = *ctx.component::<Position>(ctx.actor)?;
        let dx = if here.x >= from.x { 1 } else { -1 };
        let dy = if here.y >= from.y { 1 } else { -1 };
        let there = bounded(ctx, Position::new(here.x + dx, here.y + dy));
        *ctx.component_mut::<Position>(ctx.actor)? = there;
        Ok(Vec::new())
    }
}
