//! Shared event types for the avatar simulation.
//!
//! This crate contains pure data structures with no simulation logic.
//! It is a dependency for all other crates in the workspace.

pub mod event;
pub mod log;
pub mod timestamp;

// Re-export timestamp types
pub use timestamp::{MonthStamp, ParseStampError, MONTHS_PER_YEAR};

// Re-export event types
pub use event::{Event, EventId};

// Re-export log types
pub use log::{EventFilter, EventLog, EventLogLimits};
