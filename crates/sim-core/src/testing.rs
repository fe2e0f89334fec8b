//! Test Doubles
//!
//! Scripted language model, a stub action that records its lifecycle, and a
//! small world harness. Shared by unit tests and the integration tests.
//!
//! Enable the `test-fixtures` feature to reach these from outside the crate.

use async_trait::async_trait;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use sim_events::{Event, MonthStamp};

use crate::actions::builtin_registry;
use crate::components::{Cooldowns, Position};
use crate::config::SimConfig;
use crate::error::{ActionError, OracleError};
use crate::oracle::{AgentBrief, LanguageModel, Oracle};
use crate::runtime::{
    completion_due, Action, ActionContext, ActionParams, ActionRegistry, PendingCalls, Services,
    StepOutcome, Temporal,
};
use crate::setup::{init_world, spawn_agent, AgentSeed};

/// A language model answering from a queue of canned replies.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    /// Each call consumes one permit before answering
    gate: Option<Arc<Semaphore>>,
    /// Answers once the script runs dry
    fallback: Option<Arc<dyn LanguageModel>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Holds every call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LanguageModel>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Calls issued so far, including ones still held at the gate.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| OracleError::Model(e.to_string()))?;
            permit.forget();
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match (next, &self.fallback) {
            (Some(reply), _) => Ok(reply),
            (None, Some(fallback)) => fallback.complete(prompt).await,
            (None, None) => Err(OracleError::Model("script exhausted".to_string())),
        }
    }
}

/// A plain agent summary for request fixtures.
pub fn brief(id: &str) -> AgentBrief {
    AgentBrief {
        id: id.to_string(),
        name: id.to_string(),
        x: 0,
        y: 0,
        hp: 100,
        max_hp: 100,
        level: 1,
        exp: 0,
        exp_to_breakthrough: 150,
        stones: 20,
        age_years: 20,
        nickname: None,
        long_term_objective: None,
    }
}

/// What a [`StubAction`] went through.
#[derive(Debug, Default)]
pub struct StubLog {
    can_start_calls: AtomicUsize,
    starts: AtomicUsize,
    finishes: AtomicUsize,
    steps: Mutex<Vec<MonthStamp>>,
    completed_at: Mutex<Vec<MonthStamp>>,
    cooldown_seen: Mutex<Vec<Option<MonthStamp>>>,
}

impl StubLog {
    pub fn can_start_calls(&self) -> usize {
        self.can_start_calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    /// Months at which `step` ran.
    pub fn steps(&self) -> Vec<MonthStamp> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Months at which `step` reported completion.
    pub fn completed_at(&self) -> Vec<MonthStamp> {
        self.completed_at.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The agent's cooldown stamp for this action as seen inside `finish`.
    pub fn cooldown_seen_in_finish(&self) -> Vec<Option<MonthStamp>> {
        self.cooldown_seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// An action that does nothing but record its lifecycle.
pub struct StubAction {
    name: String,
    temporal: Temporal,
    refusal: Option<String>,
    fail_on_step: bool,
    started_at: MonthStamp,
    log: Arc<StubLog>,
}

impl StubAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            temporal: Temporal::Instant,
            refusal: None,
            fail_on_step: false,
            started_at: MonthStamp::default(),
            log: Arc::new(StubLog::default()),
        }
    }

    pub fn timed(mut self, duration_months: u64) -> Self {
        self.temporal = Temporal::timed(duration_months);
        self
    }

    pub fn refusing(mut self, reason: &str) -> Self {
        self.refusal = Some(reason.to_string());
        self
    }

    /// Every `step` returns an error.
    pub fn failing(mut self) -> Self {
        self.fail_on_step = true;
        self
    }

    /// Shares an existing log, so several instances report into one place.
    pub fn with_log(mut self, log: Arc<StubLog>) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> Arc<StubLog> {
        self.log.clone()
    }
}

#[async_trait]
impl Action for StubAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_start(&self, _ctx: &ActionContext<'_>, _params: &ActionParams) -> Result<(), String> {
        self.log.can_start_calls.fetch_add(1, Ordering::SeqCst);
        match &self.refusal {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Event, ActionError> {
        self.log.starts.fetch_add(1, Ordering::SeqCst);
        self.started_at = ctx.now;
        Ok(Event::new(ctx.now, format!("{} begins {}", ctx.name_of(ctx.actor), self.name))
            .with_agents([ctx.actor_id()?]))
    }

    fn step(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<StepOutcome, ActionError> {
        if let Ok(mut steps) = self.log.steps.lock() {
            steps.push(ctx.now);
        }
        if self.fail_on_step {
            return Err(ActionError::Failed(format!("{} broke", self.name)));
        }
        if completion_due(&self.temporal, self.started_at, ctx.now) {
            if let Ok(mut done) = self.log.completed_at.lock() {
                done.push(ctx.now);
            }
            Ok(StepOutcome::completed())
        } else {
            Ok(StepOutcome::running())
        }
    }

    async fn finish(&mut self, ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        let seen = ctx
            .world
            .get::<Cooldowns>(ctx.actor)
            .and_then(|c| c.last_used(&self.name));
        if let Ok(mut log) = self.log.cooldown_seen.lock() {
            log.push(seen);
        }
        tokio::task::yield_now().await;
        self.log.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Event::new(ctx.now, format!("{} ends {}", ctx.name_of(ctx.actor), self.name))
            .with_agents([ctx.actor_id()?])])
    }
}

/// A world with resources, services, and helpers for spawning agents.
pub struct TestWorld {
    pub world: World,
    pub services: Services,
}

impl TestWorld {
    /// Built-in actions, default config, and a model with an empty script.
    pub fn new() -> Self {
        Self::with_model(Arc::new(ScriptedModel::new(Vec::<String>::new())))
    }

    pub fn with_model(model: Arc<dyn LanguageModel>) -> Self {
        let registry = builtin_registry().unwrap_or_default();
        Self::with_parts(SimConfig::default(), registry, model)
    }

    pub fn with_parts(config: SimConfig, registry: ActionRegistry, model: Arc<dyn LanguageModel>) -> Self {
        let mut world = World::new();
        init_world(&mut world, &config);
        let services = Services {
            registry: Arc::new(registry),
            oracle: Arc::new(Oracle::new(model, &config.oracle)),
            config: Arc::new(config),
        };
        Self { world, services }
    }

    pub fn spawn_agent(&mut self, id: &str, (x, y): (i32, i32)) -> Entity {
        spawn_agent(&mut self.world, AgentSeed::new(id, Position::new(x, y)))
    }

    pub fn spawn_seed(&mut self, seed: AgentSeed) -> Entity {
        spawn_agent(&mut self.world, seed)
    }

    /// Runs `f` with a context for `agent` at month `now`. Oracle calls
    /// spawned inside are dropped with the tracker.
    pub fn with_ctx<R>(&mut self, agent: Entity, now: MonthStamp, f: impl FnOnce(&mut ActionContext<'_>) -> R) -> R {
        let mut calls = PendingCalls::new();
        let mut ctx = ActionContext {
            world: &mut self.world,
            actor: agent,
            now,
            services: &self.services,
            calls: &mut calls,
        };
        f(&mut ctx)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
