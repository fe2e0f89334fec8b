//! Action Runtime
//!
//! The lifecycle contract, its temporal shapes, the registry, the cooldown
//! adapter, the mutual protocol, and the per-agent slot and plan queue.

pub mod action;
pub mod context;
pub mod cooldown;
pub mod mutual;
pub mod params;
pub mod registry;
pub mod shaped;
pub mod slot;

pub use action::{completion_due, Action, ActionStatus, StepOutcome, Temporal};
pub use context::{agent_brief, ActionContext, PendingCalls, Services};
pub use cooldown::Cooldown;
pub use mutual::{Interaction, MutualAction, TARGET_PARAM};
pub use params::ActionParams;
pub use registry::{ActionDescriptor, ActionFactory, ActionRegistry};
pub use shaped::{Behavior, Shaped};
pub use slot::{commit_next_plan, commit_plan, preempt, ActionInstance, ActionPlan, ActionSlot, PlanQueue};
