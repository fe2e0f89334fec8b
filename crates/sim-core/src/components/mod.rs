//! ECS Components
//!
//! All entity components and resources for agents and world state.

pub mod agent;
pub mod world;

pub use agent::*;
pub use world::*;
