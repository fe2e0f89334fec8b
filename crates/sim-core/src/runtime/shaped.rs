//! Temporal Shapes
//!
//! Instant and timed actions share one implementation: a [`Behavior`] body
//! supplies the per-month effect, and [`Shaped`] decides completion from the
//! [`Temporal`] it was registered with.

use async_trait::async_trait;

use sim_events::{Event, MonthStamp};

use super::action::{completion_due, Action, StepOutcome, Temporal};
use super::context::ActionContext;
use super::params::ActionParams;
use crate::error::ActionError;

/// Effect body of an instant or timed action.
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    fn can_start(&self, _ctx: &ActionContext<'_>, _params: &ActionParams) -> Result<(), String> {
        Ok(())
    }

    /// Reserves resources and describes the beginning.
    fn begin(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError>;

    /// One month of effect. For instant actions this is the whole effect.
    fn tick(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Vec<Event>, ActionError>;

    async fn conclude(&mut self, _ctx: &mut ActionContext<'_>, _params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        Ok(Vec::new())
    }
}

/// An action whose completion follows its temporal shape.
pub struct Shaped<B: Behavior> {
    name: String,
    temporal: Temporal,
    started_at: MonthStamp,
    body: B,
}

impl<B: Behavior> Shaped<B> {
    pub fn new(name: impl Into<String>, temporal: Temporal, body: B) -> Self {
        Self {
            name: name.into(),
            temporal,
            started_at: MonthStamp::default(),
            body,
        }
    }

    pub fn boxed(name: impl Into<String>, temporal: Temporal, body: B) -> Box<dyn Action> {
        Box::new(Self::new(name, temporal, body))
    }
}

#[async_trait]
impl<B: Behavior> Action for Shaped<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String> {
        self.body.can_start(ctx, params)
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError> {
        self.started_at = ctx.now;
        self.body.begin(ctx, params)
    }

    fn step(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<StepOutcome, ActionError> {
        let events = self.body.tick(ctx, params)?;
        let outcome = if completion_due(&self.temporal, self.started_at, ctx.now) {
            StepOutcome::completed()
        } else {
            StepOutcome::running()
        };
        Ok(outcome.with_events(events))
    }

    async fn finish(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Vec<Event>, ActionError> {
        self.body.conclude(ctx, params).await
    }
}
