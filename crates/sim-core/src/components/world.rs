//! World Components
//!
//! World-level resources: clock, map, phenomenon, history, and claimable sites.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use sim_events::{EventLog, MonthStamp};

use crate::components::agent::Position;
use crate::config::PhenomenonSpec;

/// The global month counter
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct WorldClock {
    pub now: MonthStamp,
}

impl WorldClock {
    pub fn new(now: MonthStamp) -> Self {
        Self { now }
    }

    pub fn advance(&mut self) {
        self.now = self.now.next();
    }
}

/// Map extent; positions are kept within `0..width` and `0..height`
#[derive(Resource, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MapBounds {
    pub width: i32,
    pub height: i32,
}

impl MapBounds {
    pub fn clamp(&self, pos: Position) -> Position {
        Position {
            x: pos.x.clamp(0, (self.width - 1).max(0)),
            y: pos.y.clamp(0, (self.height - 1).max(0)),
        }
    }
}

/// The world-level modifier currently in force
#[derive(Resource, Debug, Clone)]
pub struct WorldPhenomenon {
    pub spec: PhenomenonSpec,
    pub since: MonthStamp,
}

impl WorldPhenomenon {
    pub fn cultivation_multiplier(&self) -> f64 {
        self.spec.cultivation_multiplier
    }
}

/// The world's event history
#[derive(Resource, Debug, Default)]
pub struct History(pub EventLog);

/// A place that can be claimed by the first agent to notice it
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    /// Agent id of the owner
    pub owner: Option<String>,
}
