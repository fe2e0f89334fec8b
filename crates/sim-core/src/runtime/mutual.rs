//! Mutual Action Protocol
//!
//! Two-party actions where the target's reaction comes from the oracle.
//!
//! - `start` validates the target and emits a begin event naming both parties.
//! - The first `step` spawns exactly one oracle call and returns `Running`.
//! - Later steps poll the reply without blocking and never issue a second call.
//! - On resolution the target is re-checked (still alive, not preempted since
//!   the request) before the reaction is settled; stale replies are dropped,
//!   as is a call whose task was cancelled before it replied.
//! - Resolution events carry the month the action started.

use async_trait::async_trait;
use bevy_ecs::prelude::*;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use sim_events::{Event, MonthStamp};

use super::action::{Action, StepOutcome};
use super::context::ActionContext;
use super::params::ActionParams;
use super::slot::{ActionSlot, PlanQueue};
use crate::components::Mind;
use crate::error::{ActionError, OracleError};
use crate::oracle::{ReactReply, ReactRequest};

/// Parameter naming the target agent id.
pub const TARGET_PARAM: &str = "target";

/// Shared-history lines included in a reaction request.
const SHARED_HISTORY_LINES: usize = 5;

/// The part of a mutual action that differs between kinds.
#[async_trait]
pub trait Interaction: Send + Sync + 'static {
    /// Legal reaction tokens, in the spelling the oracle is shown.
    fn reactions(&self) -> &'static [&'static str];

    /// Extra start conditions beyond liveness and range.
    fn check(&self, _ctx: &ActionContext<'_>, _target: Entity) -> Result<(), String> {
        Ok(())
    }

    fn begin_text(&self, initiator: &str, target: &str) -> String;

    /// Applies the chosen reaction. `at` is the month the action started.
    fn settle(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: Entity,
        reaction: &str,
        at: MonthStamp,
    ) -> Result<Vec<Event>, ActionError>;

    /// Outcome narration after settlement.
    async fn conclude(&mut self, _ctx: &mut ActionContext<'_>, _target: Entity) -> Result<Vec<Event>, ActionError> {
        Ok(Vec::new())
    }
}

type Reply = Result<ReactReply, OracleError>;

/// Generic mutual action driving an [`Interaction`].
pub struct MutualAction<I: Interaction> {
    name: String,
    summary: String,
    interaction: I,
    target: Option<Entity>,
    started_at: MonthStamp,
    pending: Option<oneshot::Receiver<Reply>>,
    requested: bool,
    /// Target's preemption count when the request went out
    target_preemptions: u64,
    settled: bool,
}

impl<I: Interaction> MutualAction<I> {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, interaction: I) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            interaction,
            target: None,
            started_at: MonthStamp::default(),
            pending: None,
            requested: false,
            target_preemptions: 0,
            settled: false,
        }
    }

    pub fn interaction(&self) -> &I {
        &self.interaction
    }

    fn resolve_target(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<Entity, String> {
        let id = params.str(TARGET_PARAM).map_err(|e| e.to_string())?;
        let target = ctx.live_agent(id)?;
        if target == ctx.actor {
            return Err("cannot target oneself".to_string());
        }
        Ok(target)
    }

    fn request(&mut self, ctx: &mut ActionContext<'_>, target: Entity) -> Result<(), ActionError> {
        let request = ReactRequest {
            tick: ctx.now,
            action: self.name.clone(),
            summary: self.summary.clone(),
            initiator: ctx.brief(ctx.actor)?,
            target: ctx.brief(target)?,
            reactions: self.interaction.reactions().iter().map(|r| r.to_string()).collect(),
            shared_history: ctx.shared_memories(ctx.actor, target, SHARED_HISTORY_LINES),
        };

        let oracle = ctx.services.oracle.clone();
        let (tx, rx) = oneshot::channel();
        ctx.calls.spawn(async move {
            // The receiver may be gone if the initiator was preempted
            let _ = tx.send(oracle.react(request).await);
        });

        self.target_preemptions = ctx
            .world
            .get::<ActionSlot>(target)
            .map(|slot| slot.preemptions)
            .unwrap_or(0);
        self.pending = Some(rx);
        self.requested = true;
        debug!(action = %self.name, initiator = ?ctx.actor, ?target, "reaction requested");
        Ok(())
    }

    fn target_still_valid(&self, ctx: &ActionContext<'_>, target: Entity) -> bool {
        let preemptions = ctx.world.get::<ActionSlot>(target).map(|slot| slot.preemptions);
        ctx.is_live(target) && preemptions.unwrap_or(0) == self.target_preemptions
    }

    fn apply(&mut self, ctx: &mut ActionContext<'_>, target: Entity, reply: ReactReply) -> Result<StepOutcome, ActionError> {
        if !self.target_still_valid(ctx, target) {
            warn!(action = %self.name, ?target, "discarding stale reaction");
            return Ok(StepOutcome::failed());
        }

        let initiator_name = ctx.name_of(ctx.actor);
        let target_name = ctx.name_of(target);
        let ids = [ctx.actor_id()?, ctx.agent_id(target)?];

        if let Some(mut mind) = ctx.world.get_mut::<Mind>(target) {
            mind.thinking = reply.thinking.clone();
        }
        if let Some(mut plans) = ctx.world.get_mut::<PlanQueue>(target) {
            plans.clear();
        }

        let mut events = vec![Event::new(
            self.started_at,
            format!("{} answers {}'s {}: {}", target_name, initiator_name, self.name, reply.reaction),
        )
        .with_agents(ids)];
        events.extend(self.interaction.settle(ctx, target, &reply.reaction, self.started_at)?);
        self.settled = true;
        Ok(StepOutcome::completed().with_events(events))
    }
}

#[async_trait]
impl<I: Interaction> Action for MutualAction<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        let target = self.resolve_target(ctx, params)?;
        let range = ctx.config().perception.interaction_range;
        match ctx.distance(ctx.actor, target) {
            Some(d) if d <= range => {}
            Some(d) => return Err(format!("target is {} steps away, beyond reach of {}", d, range)),
            None => return Err("target has no position".to_string()),
        }
        self.interaction.check(ctx, target)
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        let target = self
            .resolve_target(ctx, params)
            .map_err(|reason| ActionError::invalid_param(TARGET_PARAM, reason))?;
        self.target = Some(target);
        self.started_at = ctx.now;

        let text = self.interaction.begin_text(&ctx.name_of(ctx.actor), &ctx.name_of(target));
        Ok(Event::new(ctx.now, text).with_agents([ctx.actor_id()?, ctx.agent_id(target)?]))
    }

    fn step(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<StepOutcome, ActionError> {
        let Some(target) = self.target else {
            return Ok(StepOutcome::failed());
        };

        if !self.requested {
            if !ctx.is_live(target) {
                return Ok(StepOutcome::failed());
            }
            self.request(ctx, target)?;
            return Ok(StepOutcome::running());
        }

        let Some(pending) = self.pending.as_mut() else {
            return Ok(StepOutcome::failed());
        };
        match pending.try_recv() {
            Err(TryRecvError::Empty) => Ok(StepOutcome::running()),
            Err(TryRecvError::Closed) => {
                self.pending = None;
                warn!(action = %self.name, ?target, "reaction call went away, discarding");
                Ok(StepOutcome::failed())
            }
            Ok(reply) => {
                self.pending = None;
                self.apply(ctx, target, reply?)
            }
        }
    }

    async fn finish(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        match (self.target, self.settled) {
            (Some(target), true) => self.interaction.conclude(ctx, target).await,
            _ => Ok(Vec::new()),
        }
    }

    fn awaiting_reply(&self) -> bool {
        self.pending.is_some()
    }
}
