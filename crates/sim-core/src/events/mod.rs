//! Event Output
//!
//! The per-tick event sink and the JSONL logger.

pub mod logger;

pub use logger::{EventLogger, TickEvents};
