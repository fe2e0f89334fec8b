//! Action Capability Model
//!
//! Every executable action follows the same lifecycle:
//! `can_start -> start -> step* -> finish`. `finish` runs exactly once, right
//! after `step` first reports [`ActionStatus::Completed`], and never for an
//! instance that was preempted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sim_events::{Event, MonthStamp};

use super::context::ActionContext;
use super::params::ActionParams;
use crate::error::ActionError;

/// Lifecycle state of a committed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Running,
    Completed,
    Failed,
    /// Could not progress this month; stays in the slot for the next tick
    Blocked,
}

/// Result of one `step` call.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub status: ActionStatus,
    pub events: Vec<Event>,
}

impl StepOutcome {
    pub fn running() -> Self {
        Self::with_status(ActionStatus::Running)
    }

    pub fn completed() -> Self {
        Self::with_status(ActionStatus::Completed)
    }

    pub fn failed() -> Self {
        Self::with_status(ActionStatus::Failed)
    }

    pub fn with_status(status: ActionStatus) -> Self {
        Self {
            status,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Temporal shape of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Temporal {
    /// Whole effect in a single step
    Instant,
    /// One step per month for `duration_months` months
    Timed { duration_months: u64 },
    /// Completes when the target's reaction is resolved
    Mutual { reactions: Vec<String> },
}

impl Temporal {
    pub fn timed(duration_months: u64) -> Self {
        Temporal::Timed { duration_months }
    }

    pub fn mutual(reactions: &[&str]) -> Self {
        Temporal::Mutual {
            reactions: reactions.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Whether an action started at `started_at` completes at `now`.
///
/// A timed action of duration `D` completes when `now - started_at >= D - 1`:
/// duration 1 completes in the month it starts, duration `D` occupies exactly
/// `D` months. Mutual actions complete on resolution, never by the clock.
pub fn completion_due(temporal: &Temporal, started_at: MonthStamp, now: MonthStamp) -> bool {
    match temporal {
        Temporal::Instant => true,
        Temporal::Timed { duration_months } => now.since(started_at) + 1 >= (*duration_months).max(1),
        Temporal::Mutual { .. } => false,
    }
}

/// The capability every executable action implements.
#[async_trait]
pub trait Action: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Pure predicate. `Err` carries a user-facing reason.
    fn can_start(&self, ctx: &ActionContext<'_>, params: &ActionParams) -> Result<(), String>;

    /// Called once at commit; reserves resources and returns the "began" event.
    fn start(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Event, ActionError>;

    /// Called once per tick while running.
    fn step(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<StepOutcome, ActionError>;

    /// Outcome narration and final effects.
    async fn finish(&mut self, ctx: &mut ActionContext<'_>, params: &ActionParams) -> Result<Vec<Event>, ActionError>;

    /// Whether an oracle reply is outstanding for this instance.
    fn awaiting_reply(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_completion_boundary() {
        let timed = Temporal::timed(6);
        let start = MonthStamp(100);
        assert!(!completion_due(&timed, start, MonthStamp(100)));
        assert!(!completion_due(&timed, start, MonthStamp(104)));
        assert!(completion_due(&timed, start, MonthStamp(105)));
    }

    #[test]
    fn test_duration_one_completes_same_month() {
        assert!(completion_due(&Temporal::timed(1), MonthStamp(7), MonthStamp(7)));
        assert!(completion_due(&Temporal::timed(0), MonthStamp(7), MonthStamp(7)));
    }

    #[test]
    fn test_instant_and_mutual() {
        assert!(completion_due(&Temporal::Instant, MonthStamp(1), MonthStamp(1)));
        assert!(!completion_due(&Temporal::mutual(&["Accept"]), MonthStamp(1), MonthStamp(50)));
    }
}
