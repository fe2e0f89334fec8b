//! Plans, Slots, and Commit
//!
//! An agent holds an ordered queue of uncommitted [`ActionPlan`]s and exactly
//! one [`ActionSlot`] for the running instance. Commit pops the best plan,
//! instantiates it through the registry, and starts it. Preemption clears
//! both without ever calling `finish` on the discarded instance.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sim_events::{Event, MonthStamp};

use super::action::{Action, ActionStatus};
use super::context::ActionContext;
use super::params::ActionParams;
use crate::error::ActionError;

/// A not-yet-committed intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub action_name: String,
    #[serde(default)]
    pub params: ActionParams,
    /// Higher commits first; FIFO among equals
    #[serde(default)]
    pub priority: i32,
    /// Last month this plan may be committed in
    #[serde(default)]
    pub expiry_tick: Option<MonthStamp>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub attempted: u32,
}

impl ActionPlan {
    pub fn new(action_name: impl Into<String>, params: ActionParams) -> Self {
        Self {
            action_name: action_name.into(),
            params,
            priority: 0,
            expiry_tick: None,
            max_retries: 0,
            attempted: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn expires_at(mut self, tick: MonthStamp) -> Self {
        self.expiry_tick = Some(tick);
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn is_expired(&self, now: MonthStamp) -> bool {
        self.expiry_tick.map(|expiry| now > expiry).unwrap_or(false)
    }
}

/// Ordered uncommitted plans of an agent.
#[derive(Component, Debug, Clone, Default)]
pub struct PlanQueue(pub Vec<ActionPlan>);

impl PlanQueue {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn push(&mut self, plan: ActionPlan) {
        self.0.push(plan);
    }

    fn best_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, plan) in self.0.iter().enumerate() {
            match best {
                Some(b) if self.0[b].priority >= plan.priority => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// The plan [`PlanQueue::pop_best`] would return next.
    pub fn peek_best(&self) -> Option<&ActionPlan> {
        self.best_index().map(|i| &self.0[i])
    }

    /// Removes the highest-priority plan, earliest first among equals.
    pub fn pop_best(&mut self) -> Option<ActionPlan> {
        self.best_index().map(|i| self.0.remove(i))
    }
}

/// A committed, running action.
pub struct ActionInstance {
    pub action: Box<dyn Action>,
    pub params: ActionParams,
    pub status: ActionStatus,
    pub started_at: MonthStamp,
}

impl ActionInstance {
    pub fn new(action: Box<dyn Action>, params: ActionParams, started_at: MonthStamp) -> Self {
        Self {
            action,
            params,
            status: ActionStatus::Running,
            started_at,
        }
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }
}

impl std::fmt::Debug for ActionInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInstance")
            .field("action", &self.action.name())
            .field("params", &self.params)
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// The single running-action slot of an agent.
#[derive(Component, Debug, Default)]
pub struct ActionSlot {
    pub current: Option<ActionInstance>,
    /// Bumped whenever the running instance is replaced or discarded
    pub generation: u64,
    /// Bumped only by preemption
    pub preemptions: u64,
    /// A new instance was installed and has not been stepped yet
    pub fresh: bool,
}

impl ActionSlot {
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|i| i.name())
    }

    pub fn install(&mut self, instance: ActionInstance) {
        self.current = Some(instance);
        self.generation += 1;
        self.fresh = true;
    }

    /// Removes the instance so it can be stepped outside the world borrow.
    /// Returns it with the generation to hand back to [`ActionSlot::restore`].
    pub fn take_for_step(&mut self) -> Option<(ActionInstance, u64)> {
        let instance = self.current.take()?;
        self.fresh = false;
        Some((instance, self.generation))
    }

    /// Puts a stepped instance back unless the slot moved on meanwhile.
    pub fn restore(&mut self, instance: ActionInstance, generation: u64) -> bool {
        if self.generation == generation && self.current.is_none() {
            self.current = Some(instance);
            true
        } else {
            false
        }
    }

    /// Discards the running instance without finishing it.
    pub fn discard(&mut self) {
        self.current = None;
        self.generation += 1;
        self.fresh = false;
    }
}

/// Clears an agent's plans and discards its running action.
pub fn preempt(world: &mut World, entity: Entity) {
    if let Some(mut plans) = world.get_mut::<PlanQueue>(entity) {
        plans.clear();
    }
    if let Some(mut slot) = world.get_mut::<ActionSlot>(entity) {
        if let Some(name) = slot.current_name() {
            debug!(?entity, action = name, "preempted");
        }
        slot.discard();
        slot.preemptions += 1;
    }
}

/// Tries to commit one specific plan for `ctx.actor`.
///
/// Returns `Ok(None)` when the plan cannot start; the plan is not requeued.
pub fn commit_plan(ctx: &mut ActionContext<'_>, plan: &ActionPlan) -> Result<Option<Event>, ActionError> {
    match try_commit(ctx, plan)? {
        Commit::Started(event) => Ok(Some(event)),
        Commit::Blocked | Commit::Unknown => Ok(None),
    }
}

enum Commit {
    Started(Event),
    Blocked,
    Unknown,
}

fn try_commit(ctx: &mut ActionContext<'_>, plan: &ActionPlan) -> Result<Commit, ActionError> {
    let mut action = match ctx.services.registry.instantiate(&plan.action_name) {
        Ok(action) => action,
        Err(e) => {
            warn!(agent = ?ctx.actor, action = %plan.action_name, error = %e, "skipping unknown plan");
            return Ok(Commit::Unknown);
        }
    };

    if let Err(reason) = action.can_start(ctx, &plan.params) {
        debug!(agent = ?ctx.actor, action = %plan.action_name, %reason, "plan cannot start");
        return Ok(Commit::Blocked);
    }

    let event = action.start(ctx, &plan.params)?;
    let instance = ActionInstance::new(action, plan.params.clone(), ctx.now);
    match ctx.world.get_mut::<ActionSlot>(ctx.actor) {
        Some(mut slot) => slot.install(instance),
        None => {
            if let Some(mut entity) = ctx.world.get_entity_mut(ctx.actor) {
                let mut slot = ActionSlot::default();
                slot.install(instance);
                entity.insert(slot);
            }
        }
    }
    debug!(agent = ?ctx.actor, action = %plan.action_name, "committed");
    Ok(Commit::Started(event))
}

/// Commits the next viable plan of an idle agent.
///
/// Expired plans are dropped. A plan that cannot start is dropped unless it
/// still has retries left, in which case it goes back to the end of the
/// queue for a later tick.
pub fn commit_next_plan(ctx: &mut ActionContext<'_>) -> Result<Option<Event>, ActionError> {
    let actor = ctx.actor;
    let now = ctx.now;
    let mut deferred = Vec::new();

    let started = loop {
        let next = ctx.world.get_mut::<PlanQueue>(actor).and_then(|mut q| q.pop_best());
        let Some(mut plan) = next else {
            break None;
        };
        if plan.is_expired(now) {
            debug!(agent = ?actor, action = %plan.action_name, "plan expired");
            continue;
        }
        match try_commit(ctx, &plan)? {
            Commit::Started(event) => break Some(event),
            Commit::Blocked if plan.attempted < plan.max_retries => {
                plan.attempted += 1;
                deferred.push(plan);
            }
            Commit::Blocked | Commit::Unknown => {}
        }
    };

    if !deferred.is_empty() {
        if let Some(mut queue) = ctx.world.get_mut::<PlanQueue>(actor) {
            queue.0.extend(deferred);
        }
    }
    Ok(started)
}

impl<'w> ActionContext<'w> {
    /// Preempts `target` without committing anything new.
    pub fn preempt(&mut self, target: Entity) {
        preempt(self.world, target);
    }

    /// Preempts `target` and commits `plan` for it immediately.
    ///
    /// Skipped when `target` is already running the same action with the same
    /// parameters, so repeated provocations do not restart it.
    pub fn force_assign(&mut self, target: Entity, plan: ActionPlan) -> Result<Option<Event>, ActionError> {
        let already_running = self
            .world
            .get::<ActionSlot>(target)
            .and_then(|slot| slot.current.as_ref())
            .map(|current| current.name().eq_ignore_ascii_case(&plan.action_name) && current.params == plan.params)
            .unwrap_or(false);
        if already_running {
            return Ok(None);
        }

        preempt(self.world, target);
        let mut target_ctx = self.for_agent(target);
        commit_plan(&mut target_ctx, &plan)
    }

    /// Commits `plan` for `target` right now, replacing its running action
    /// but keeping its queued plans.
    pub fn chain(&mut self, target: Entity, plan: ActionPlan) -> Result<Option<Event>, ActionError> {
        let mut target_ctx = self.for_agent(target);
        commit_plan(&mut target_ctx, &plan)
    }
}
