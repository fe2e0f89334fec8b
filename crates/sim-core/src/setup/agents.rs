//! Agent Spawning
//!
//! Functions to spawn avatars with randomized names, ages, and positions.

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use sim_events::MONTHS_PER_YEAR;

use crate::components::agent::{
    Age, AgentDirectory, AgentId, AgentName, Alive, Cooldowns, Cultivation, Mind, Observation,
    Position, Purse, Relations, Vitals,
};
use crate::components::world::MapBounds;
use crate::config::PopulationConfig;
use crate::runtime::{ActionSlot, PlanQueue};
use crate::SimRng;

const SURNAMES: &[&str] = &[
    "Lin", "Zhao", "Bai", "Mo", "Han", "Su", "Ye", "Qin", "Lu", "Shen", "Gu", "Jiang",
    "Feng", "Xiao", "Yun", "Ling",
];

const GIVEN_NAMES: &[&str] = &[
    "Chen", "Yu", "Feng", "Xue", "Lan", "Hao", "Ming", "Qing", "Rou", "Tian", "Wei", "Xin",
    "Yan", "Zhi", "Jing", "Shan", "Hua", "Long", "Yue", "Ning",
];

/// Everything needed to spawn one avatar
#[derive(Debug, Clone)]
pub struct AgentSeed {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub age_months: u64,
    pub lifespan_months: u64,
    pub max_hp: i32,
    pub level: u32,
    pub stones: i64,
}

impl AgentSeed {
    /// A plain adult at `position` with default stats.
    pub fn new(id: impl Into<String>, position: Position) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            position,
            age_months: 20 * MONTHS_PER_YEAR,
            lifespan_months: 80 * MONTHS_PER_YEAR,
            max_hp: 100,
            level: 1,
            stones: 20,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

/// Generate a two-part name
fn generate_name(rng: &mut SmallRng) -> String {
    let surname = SURNAMES[rng.gen_range(0..SURNAMES.len())];
    let given = GIVEN_NAMES[rng.gen_range(0..GIVEN_NAMES.len())];
    format!("{} {}", surname, given)
}

/// Draw a random avatar within the map
pub fn random_seed(
    id: String,
    population: &PopulationConfig,
    bounds: &MapBounds,
    rng: &mut SmallRng,
) -> AgentSeed {
    let min_age = population.initial_age_min_years;
    let max_age = population.initial_age_max_years.max(min_age);
    let min_life = population.lifespan_min_years;
    let max_life = population.lifespan_max_years.max(min_life);

    AgentSeed {
        id,
        name: generate_name(rng),
        position: Position::new(
            rng.gen_range(0..bounds.width.max(1)),
            rng.gen_range(0..bounds.height.max(1)),
        ),
        age_months: rng.gen_range(min_age..=max_age) * MONTHS_PER_YEAR,
        lifespan_months: rng.gen_range(min_life..=max_life) * MONTHS_PER_YEAR,
        max_hp: population.base_hp,
        level: 1,
        stones: population.starting_stones,
    }
}

/// Spawn one avatar and register it in the directory
pub fn spawn_agent(world: &mut World, seed: AgentSeed) -> Entity {
    let entity = world
        .spawn((
            AgentId(seed.id.clone()),
            AgentName(seed.name),
            seed.position,
            Vitals::full(seed.max_hp),
            Age {
                months: seed.age_months,
                lifespan_months: seed.lifespan_months,
            },
            Cultivation {
                level: seed.level,
                exp: 0,
            },
            Purse { stones: seed.stones },
            Mind::default(),
            Observation::default(),
            Cooldowns::default(),
            Relations::default(),
            ActionSlot::default(),
            PlanQueue::default(),
            Alive,
        ))
        .id();

    world
        .get_resource_or_insert_with(AgentDirectory::new)
        .insert(seed.id, entity);
    entity
}

/// Spawn an avatar with a fresh id and random traits
pub fn spawn_random_agent(world: &mut World, population: &PopulationConfig) -> Entity {
    let bounds = world
        .get_resource::<MapBounds>()
        .copied()
        .unwrap_or(MapBounds { width: 1, height: 1 });
    let id = world.get_resource_or_insert_with(AgentDirectory::new).next_id();
    let seed = match world.get_resource_mut::<SimRng>() {
        Some(mut rng) => random_seed(id, population, &bounds, &mut rng.0),
        None => random_seed(id, population, &bounds, &mut SmallRng::seed_from_u64(0)),
    };
    spawn_agent(world, seed)
}

/// Spawn the starting population
pub fn spawn_population(world: &mut World, count: usize, population: &PopulationConfig) -> Vec<Entity> {
    (0..count)
        .map(|_| spawn_random_agent(world, population))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut world = World::new();
        world.insert_resource(SimRng(SmallRng::seed_from_u64(1)));
        world.insert_resource(MapBounds { width: 8, height: 4 });
        world
    }

    #[test]
    fn test_spawned_agent_is_registered_and_live() {
        let mut world = world();
        let entity = spawn_agent(&mut world, AgentSeed::new("avatar_0001", Position::new(2, 3)));

        assert_eq!(world.resource::<AgentDirectory>().get("avatar_0001"), Some(entity));
        assert!(world.get::<Alive>(entity).is_some());
        assert!(world.get::<ActionSlot>(entity).unwrap().is_idle());
        assert_eq!(world.get::<Position>(entity), Some(&Position::new(2, 3)));
    }

    #[test]
    fn test_random_population_within_bounds() {
        let mut world = world();
        let population = PopulationConfig::default();
        let spawned = spawn_population(&mut world, 10, &population);

        assert_eq!(spawned.len(), 10);
        assert_eq!(world.resource::<AgentDirectory>().len(), 10);
        for entity in spawned {
            let pos = world.get::<Position>(entity).unwrap();
            assert!((0..8).contains(&pos.x) && (0..4).contains(&pos.y));
            let age = world.get::<Age>(entity).unwrap();
            assert!(age.years() >= population.initial_age_min_years);
            assert!(!age.past_lifespan());
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut world = world();
        let population = PopulationConfig::default();
        let first = spawn_random_agent(&mut world, &population);
        let second = spawn_random_agent(&mut world, &population);

        assert_eq!(world.get::<AgentId>(first).unwrap().0, "avatar_0001");
        assert_eq!(world.get::<AgentId>(second).unwrap().0, "avatar_0002");
    }
}
