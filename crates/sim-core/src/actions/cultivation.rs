//! Cultivation Actions
//!
//! Solitary progress: cultivating for experience, resting to heal, and
//! breaking through to the next level.

use async_trait::async_trait;

use sim_events::Event;

use super::{BREAKTHROUGH, CULTIVATE, REST};
use crate::components::{Age, Cultivation, Purse, Vitals, WorldPhenomenon};
use crate::error::ActionError;
use crate::runtime::{Action, ActionContext, ActionParams, Behavior, Shaped, Temporal};

pub const CULTIVATE_MONTHS: u64 = 3;
pub const REST_MONTHS: u64 = 2;
pub const BREAKTHROUGH_COOLDOWN_MONTHS: u64 = 12;

/// Experience per month of cultivation before the phenomenon multiplier
pub const EXP_PER_MONTH: f64 = 20.0;
/// Max HP gained with each level
pub const HP_PER_LEVEL: i32 = 20;
/// Lifespan lost on a failed breakthrough
pub const FAILED_BREAKTHROUGH_MONTHS: u64 = 12;

/// Spirit stones consumed by a breakthrough attempt from `level`.
pub fn breakthrough_cost(level: u32) -> i64 {
    10 * (i64::from(level) + 1)
}

/// Chance a breakthrough from `level` succeeds.
pub fn breakthrough_chance(level: u32) -> f64 {
    (0.9 - 0.08 * f64::from(level)).clamp(0.2, 0.9)
}

/// Timed cultivation; gains stop at the breakthrough threshold.
#[derive(Debug, Default)]
pub struct Cultivate {
    gained: u64,
}

impl Cultivate {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(CULTIVATE, Temporal::timed(CULTIVATE_MONTHS), Cultivate::default())
    }
}

#[async_trait]
impl Behavior for Cultivate {
    fn can_start(&self, ctx: &ActionContext<'_>, _params: &ActionParams) -> Result<(), String> {
        match ctx.world.get::<Cultivation>(ctx.actor) {
            Some(c) if c.ready_for_breakthrough() => Err("at a bottleneck; only a breakthrough helps now".to_string()),
            Some(_) => Ok(()),
            None => Err("cannot cultivate".to_string()),
        }
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Event, ActionError> {
        self.gained = 0;
        Ok(Event::new(ctx.now, format!("{} withdraws into seclusion to cultivate", ctx.name_of(ctx.actor)))
            .with_agents([ctx.actor_id()?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let multiplier = ctx
            .world
            .get_resource::<WorldPhenomenon>()
            .map(|p| p.cultivation_multiplier())
            .unwrap_or(1.0);
        let gain = (EXP_PER_MONTH * multiplier).round().max(0.0) as u64;

        let mut cultivation = ctx.component_mut::<Cultivation>(ctx.actor)?;
        let room = cultivation.exp_to_breakthrough().saturating_sub(cultivation.exp);
        let gain = gain.min(room);
        cultivation.exp += gain;
        self.gained += gain;
        Ok(Vec::new())
    }

    async fn conclude(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        Ok(vec![Event::new(
            ctx.now,
            format!("{} emerges from seclusion, {} experience richer", ctx.name_of(ctx.actor), self.gained),
        )
        .with_agents([ctx.actor_id()?])])
    }
}

/// Timed rest restoring a fifth of max HP each month.
#[derive(Debug, Default)]
pub struct Rest;

impl Rest {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(REST, Temporal::timed(REST_MONTHS), Rest)
    }
}

#[async_trait]
impl Behavior for Rest {
    fn can_start(&self, ctx: &ActionContext<'_>, _params: &ActionParams) -> Result<(), String> {
        match ctx.world.get::<Vitals>(ctx.actor) {
            Some(v) if v.hp < v.max_hp => Ok(()),
            _ => Err("already in full health".to_string()),
        }
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Event, ActionError> {
        Ok(Event::new(ctx.now, format!("{} settles down to rest", ctx.name_of(ctx.actor)))
            .with_agents([ctx.actor_id()?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let mut vitals = ctx.component_mut::<Vitals>(ctx.actor)?;
        let amount = (vitals.max_hp / 5).max(1);
        vitals.heal(amount);
        Ok(Vec::new())
    }

    async fn conclude(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let vitals = *ctx.component::<Vitals>(ctx.actor)?;
        Ok(vec![Event::new(
            ctx.now,
            format!("{} rises rested ({}/{} hp)", ctx.name_of(ctx.actor), vitals.hp, vitals.max_hp),
        )
        .with_agents([ctx.actor_id()?])])
    }
}

/// Instant level-up attempt; stones are spent at the start whatever the
/// outcome.
#[derive(Debug, Default)]
pub struct Breakthrough;

impl Breakthrough {
    pub fn boxed() -> Box<dyn Action> {
        Shaped::boxed(BREAKTHROUGH, Temporal::Instant, Breakthrough)
    }
}

impl Behavior for Breakthrough {
    fn can_start(&self, ctx: &ActionContext<'_>, _params: &ActionParams) -> Result<(), String> {
        let Some(cultivation) = ctx.world.get::<Cultivation>(ctx.actor) else {
            return Err("cannot cultivate".to_string());
        };
        if !cultivation.ready_for_breakthrough() {
            return Err(format!(
                "needs {} experience, has {}",
                cultivation.exp_to_breakthrough(),
                cultivation.exp
            ));
        }
        let cost = breakthrough_cost(cultivation.level);
        let stones = ctx.world.get::<Purse>(ctx.actor).map(|p| p.stones).unwrap_or(0);
        if stones < cost {
            return Err(format!("needs {} spirit stones, has {}", cost, stones));
        }
        Ok(())
    }

    fn begin(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Event, ActionError> {
        let level = ctx.component::<Cultivation>(ctx.actor)?.level;
        let cost = breakthrough_cost(level);
        ctx.component_mut::<Purse>(ctx.actor)?.stones -= cost;
        Ok(Event::new(
            ctx.now,
            format!("{} spends {} spirit stones preparing a breakthrough", ctx.name_of(ctx.actor), cost),
        )
        .with_agents([ctx.actor_id()?]))
    }

    fn tick(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let before = *ctx.component::<Cultivation>(ctx.actor)?;
        let success = ctx.roll(breakthrough_chance(before.level));
        let name = ctx.name_of(ctx.actor);

        let text = if success {
            {
                let mut cultivation = ctx.component_mut::<Cultivation>(ctx.actor)?;
                cultivation.exp = cultivation.exp.saturating_sub(before.exp_to_breakthrough());
                cultivation.level += 1;
            }
            let mut vitals = ctx.component_mut::<Vitals>(ctx.actor)?;
            vitals.max_hp += HP_PER_LEVEL;
            vitals.hp = vitals.max_hp;
            format!("{} breaks through to level {}", name, before.level + 1)
        } else {
            ctx.component_mut::<Cultivation>(ctx.actor)?.exp = before.exp / 2;
            if let Some(mut age) = ctx.world.get_mut::<Age>(ctx.actor) {
                age.lifespan_months = age.lifespan_months.saturating_sub(FAILED_BREAKTHROUGH_MONTHS);
            }
            format!("{} fails to break through and loses a year of lifespan", name)
        };

        Ok(vec![Event::new(ctx.now, text).with_agents([ctx.actor_id()?]).major()])
    }
}
