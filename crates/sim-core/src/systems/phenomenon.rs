//! World Phenomenon
//!
//! Draws a new world-level modifier once the current one has run its course.

use bevy_ecs::prelude::*;
use rand::Rng;
use tracing::info;

use sim_events::Event;

use super::Settings;
use crate::components::{WorldClock, WorldPhenomenon};
use crate::events::TickEvents;
use crate::SimRng;

/// System to reselect the phenomenon after `duration_months`
pub fn rotate_phenomenon(
    settings: Res<Settings>,
    clock: Res<WorldClock>,
    events: Res<TickEvents>,
    mut phenomenon: ResMut<WorldPhenomenon>,
    mut rng: ResMut<SimRng>,
) {
    let config = &settings.0.phenomenon;
    if config.catalogue.is_empty() || clock.now.since(phenomenon.since) < config.duration_months {
        return;
    }

    let next = config.catalogue[rng.0.gen_range(0..config.catalogue.len())].clone();
    info!(from = %phenomenon.spec.name, to = %next.name, "phenomenon changed");
    events.push(
        Event::new(clock.now, format!("The heavens shift: {}. {}", next.name, next.description)).major(),
    );
    phenomenon.spec = next;
    phenomenon.since = clock.now;
}
