//! World Setup
//!
//! Inserts the world resources and scatters claimable sites over the map.

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use sim_events::{EventLog, MonthStamp};

use crate::components::agent::{AgentDirectory, Position};
use crate::components::world::{History, MapBounds, Site, WorldClock, WorldPhenomenon};
use crate::config::{PhenomenonSpec, SimConfig};
use crate::SimRng;

const SITE_NAMES: &[&str] = &[
    "Azure Cloud Cave",
    "Misty Peak Grotto",
    "Jade Spring",
    "Thunder Valley",
    "Old Pine Hermitage",
    "Crimson Lotus Pool",
    "Hidden Dragon Den",
    "Moonlit Terrace",
    "Cold Iron Ridge",
    "Whispering Bamboo Hollow",
];

/// Phenomenon used when the catalogue is empty
pub fn fallback_phenomenon() -> PhenomenonSpec {
    PhenomenonSpec {
        name: "Calm Heavens".to_string(),
        description: "Nothing stirs beyond the ordinary.".to_string(),
        cultivation_multiplier: 1.0,
    }
}

/// Insert clock, RNG, map, history, directory, and the first phenomenon
pub fn init_world(world: &mut World, config: &SimConfig) {
    let start = MonthStamp::from_year_month(config.simulation.start_year, 1);
    let spec = config
        .phenomenon
        .catalogue
        .first()
        .cloned()
        .unwrap_or_else(fallback_phenomenon);

    world.insert_resource(WorldClock::new(start));
    world.insert_resource(SimRng(SmallRng::seed_from_u64(config.simulation.seed)));
    world.insert_resource(MapBounds {
        width: config.simulation.map_width.max(1),
        height: config.simulation.map_height.max(1),
    });
    world.insert_resource(History(EventLog::new(config.events)));
    world.insert_resource(AgentDirectory::new());
    world.insert_resource(WorldPhenomenon { spec, since: start });
}

/// Spawn `count` ownerless sites at random positions
pub fn place_sites(world: &mut World, count: usize) -> Vec<Entity> {
    let bounds = world
        .get_resource::<MapBounds>()
        .copied()
        .unwrap_or(MapBounds { width: 1, height: 1 });

    let placements: Vec<(String, Position)> = match world.get_resource_mut::<SimRng>() {
        Some(mut rng) => (0..count)
            .map(|i| {
                let name = match SITE_NAMES.get(i) {
                    Some(name) => name.to_string(),
                    None => format!("Nameless Cave {}", i + 1),
                };
                let pos = Position::new(
                    rng.0.gen_range(0..bounds.width),
                    rng.0.gen_range(0..bounds.height),
                );
                (name, pos)
            })
            .collect(),
        None => Vec::new(),
    };

    placements
        .into_iter()
        .map(|(name, pos)| world.spawn((Site { name, owner: None }, pos)).id())
        .collect()
}
