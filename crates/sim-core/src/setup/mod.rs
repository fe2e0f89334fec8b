//! World Setup
//!
//! World initialization, site placement, and avatar spawning.

pub mod agents;
pub mod world;

pub use agents::*;
pub use world::*;
