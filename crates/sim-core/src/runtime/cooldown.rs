//! Cooldown Adapter
//!
//! Wraps any action with a per-agent minimum re-use interval. The gate runs
//! before the wrapped `can_start`; the stamp is written only once the wrapped
//! `finish` has fully resolved.

use async_trait::async_trait;

use sim_events::Event;

use super::action::{Action, StepOutcome};
use super::context::ActionContext;
use super::params::ActionParams;
use crate::components::Cooldowns;
use crate::error::ActionError;

pub struct Cooldown {
    inner: Box<dyn Action>,
    months: u64,
}

impl Cooldown {
    /// Wraps `inner`, or returns it unchanged when `months` is zero.
    pub fn wrap(inner: Box<dyn Action>, months: u64) -> Box<dyn Action> {
        if months == 0 {
            inner
        } else {
            Box::new(Cooldown { inner, months })
        }
    }

    /// Months still to wait for the acting agent, if any.
    fn remaining(&self, ctx: &ActionContext<'_>) -> Option<u64> {
        let last = ctx
            .world
            .get::<Cooldowns>(ctx.actor)?
            .last_used(self.inner.name())?;
        let elapsed = ctx.now.since(last);
        (elapsed < self.months).then(|| self.months - elapsed)
    }

    fn stamp(&self, ctx: &mut ActionContext<'_>) {
        let name = self.inner.name().to_string();
        let now = ctx.now;
        if let Some(mut cooldowns) = ctx.world.get_mut::<Cooldowns>(ctx.actor) {
            cooldowns.stamp(name, now);
            return;
        }
        if let Some(mut entity) = ctx.world.get_entity_mut(ctx.actor) {
            let mut cooldowns = Cooldowns::default();
            cooldowns.stamp(name, now);
            entity.insert(cooldowns);
        }
    }
}

#[async_trait]
impl Action for Cooldown {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        if let Some(remaining) = self.remaining(ctx) {
            return Err(format!("cooling down, {} months remaining", remaining));
        }
        self.inner.can_start(ctx, params)
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        self.inner.start(ctx, params)
    }

    fn step(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<StepOutcome, ActionError> {
        self.inner.step(ctx, params)
    }

    async fn finish(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let events = self.inner.finish(ctx, params).await?;
        self.stamp(ctx);
        Ok(events)
    }

    fn awaiting_reply(&self) -> bool {
        self.inner.awaiting_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Cooldowns;
    use crate::testing::{StubAction, TestWorld};
    use sim_events::MonthStamp;

    #[test]
    fn test_zero_cooldown_is_passthrough() {
        let wrapped = Cooldown::wrap(Box::new(StubAction::new("Stub")), 0);
        assert_eq!(wrapped.name(), "Stub");
    }

    #[test]
    fn test_gate_counts_remaining_months() {
        let mut tw = TestWorld::new();
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        let mut cooldowns = Cooldowns::default();
        cooldowns.stamp("Stub", MonthStamp(100));
        tw.world.entity_mut(agent).insert(cooldowns);

        let stub = StubAction::new("Stub");
        let log = stub.log();
        let action = Cooldown::wrap(Box::new(stub), 12);
        let params = ActionParams::new();

        let reason = tw
            .with_ctx(agent, MonthStamp(105), |ctx| action.can_start(ctx, &params))
            .unwrap_err();
        assert!(reason.contains("7 months remaining"), "{}", reason);
        assert_eq!(log.can_start_calls(), 0);

        let at_111 = tw.with_ctx(agent, MonthStamp(111), |ctx| action.can_start(ctx, &params));
        assert!(at_111.unwrap_err().contains("1 months remaining"));

        let at_112 = tw.with_ctx(agent, MonthStamp(112), |ctx| action.can_start(ctx, &params));
        assert!(at_112.is_ok());
        assert_eq!(log.can_start_calls(), 1);
    }

    #[test]
    fn test_delegates_to_inner_refusal() {
        let mut tw = TestWorld::new();
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        let action = Cooldown::wrap(Box::new(StubAction::new("Stub").refusing("not today")), 12);
        let params = ActionParams::new();

        let reason = tw
            .with_ctx(agent, MonthStamp(1), |ctx| action.can_start(ctx, &params))
            .unwrap_err();
        assert_eq!(reason, "not today");
    }

    #[tokio::test]
    async fn test_stamp_written_after_finish_resolves() {
        let mut tw = TestWorld::new();
        let agent = tw.spawn_agent("avatar_0001", (0, 0));
        let stub = StubAction::new("Stub");
        let log = stub.log();
        let mut action = Cooldown::wrap(Box::new(stub), 12);
        let params = ActionParams::new();

        let (services, mut calls) = (tw.services.clone(), crate::runtime::PendingCalls::new());
        let mut ctx = ActionContext {
            world: &mut tw.world,
            actor: agent,
            now: MonthStamp(100),
            services: &services,
            calls: &mut calls,
        };
        action.finish(&mut ctx, &params).await.unwrap();

        // The inner finish saw no stamp; the stamp exists once it returned
        assert_eq!(log.cooldown_seen_in_finish(), vec![None]);
        let cooldowns = tw.world.get::<Cooldowns>(agent).unwrap();
        assert_eq!(cooldowns.last_used("Stub"), Some(MonthStamp(100)));
    }
}
