//! Agent Components
//!
//! Components for individual avatars: identity, body, cultivation, mind.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use sim_events::{MonthStamp, MONTHS_PER_YEAR};

use crate::formula::StatBlock;

/// Marker component for agents in the live population
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Alive;

/// Archive record for an agent removed from the live population
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Deceased {
    pub at: MonthStamp,
    pub reason: String,
}

/// Unique identifier for an agent
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

/// Human-readable name for an agent
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct AgentName(pub String);

/// Grid position
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance (diagonal steps cost one).
    pub fn distance(&self, other: &Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vitals {
    pub hp: i32,
    pub max_hp: i32,
}

impl Vitals {
    pub fn full(max_hp: i32) -> Self {
        Self { hp: max_hp, max_hp }
    }

    pub fn heal(&mut self, amount: i32) {
        self.hp = (self.hp + amount.max(0)).min(self.max_hp);
    }

    pub fn damage(&mut self, amount: i32) {
        self.hp -= amount.max(0);
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }
}

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Age {
    pub months: u64,
    pub lifespan_months: u64,
}

impl Age {
    pub fn years(&self) -> u64 {
        self.months / MONTHS_PER_YEAR
    }

    pub fn past_lifespan(&self) -> bool {
        self.months >= self.lifespan_months
    }
}

/// Cultivation realm progress
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cultivation {
    pub level: u32,
    pub exp: u64,
}

impl Cultivation {
    /// Experience needed to attempt a breakthrough from the current level.
    pub fn exp_to_breakthrough(&self) -> u64 {
        100 + u64::from(self.level) * 50
    }

    pub fn ready_for_breakthrough(&self) -> bool {
        self.exp >= self.exp_to_breakthrough()
    }
}

/// Spirit stones carried by an agent
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Purse {
    pub stones: i64,
}

/// What an agent is thinking and aiming for
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mind {
    /// Reasoning returned with the last decision
    pub thinking: String,
    pub short_term_objective: String,
    pub long_term_objective: Option<String>,
    pub objective_set_at: Option<MonthStamp>,
    pub nickname: Option<String>,
}

/// Live agents within observation radius, refreshed every tick
#[derive(Component, Debug, Clone, Default)]
pub struct Observation {
    pub visible: Vec<Entity>,
}

impl Observation {
    pub fn can_see(&self, entity: Entity) -> bool {
        self.visible.contains(&entity)
    }
}

/// Month each action type was last completed by this agent
#[derive(Component, Debug, Clone, Default)]
pub struct Cooldowns(pub HashMap<String, MonthStamp>);

impl Cooldowns {
    pub fn last_used(&self, action: &str) -> Option<MonthStamp> {
        self.0.get(action).copied()
    }

    pub fn stamp(&mut self, action: impl Into<String>, at: MonthStamp) {
        self.0.insert(action.into(), at);
    }
}

/// A bond one agent holds towards another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Friend,
    Enemy,
    Lovers,
    Master,
    Apprentice,
}

impl Relation {
    /// Every relation a conversation can lead to
    pub const ALL: [Relation; 5] = [
        Relation::Friend,
        Relation::Enemy,
        Relation::Lovers,
        Relation::Master,
        Relation::Apprentice,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Relation::Friend => "Friend",
            Relation::Enemy => "Enemy",
            Relation::Lovers => "Lovers",
            Relation::Master => "Master",
            Relation::Apprentice => "Apprentice",
        }
    }

    /// Case-insensitive lookup by label.
    pub fn from_label(label: &str) -> Option<Relation> {
        let label = label.trim();
        Self::ALL.into_iter().find(|r| r.label().eq_ignore_ascii_case(label))
    }

    /// What the other side holds in return.
    pub fn reciprocal(self) -> Relation {
        match self {
            Relation::Master => Relation::Apprentice,
            Relation::Apprentice => Relation::Master,
            other => other,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What each other agent is to this one, by agent id.
///
/// Entries outlive either party: death archives an agent but leaves its
/// relations, and those held towards it, in place.
#[derive(Component, Debug, Clone, Default)]
pub struct Relations(pub BTreeMap<String, Relation>);

impl Relations {
    pub fn get(&self, other: &str) -> Option<Relation> {
        self.0.get(other).copied()
    }

    /// Sets the relation, returning the one it replaced.
    pub fn set(&mut self, other: impl Into<String>, relation: Relation) -> Option<Relation> {
        self.0.insert(other.into(), relation)
    }
}

/// Maps agent ids to entities and hands out new ids
#[derive(Resource, Debug, Default)]
pub struct AgentDirectory {
    by_id: HashMap<String, Entity>,
    next_index: u32,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next agent id.
    pub fn next_id(&mut self) -> String {
        self.next_index += 1;
        format!("avatar_{:04}", self.next_index)
    }

    pub fn insert(&mut self, id: impl Into<String>, entity: Entity) {
        self.by_id.insert(id.into(), entity);
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Collects the stats a formula may read for an agent.
pub fn stat_block(world: &World, entity: Entity) -> StatBlock {
    let mut block = StatBlock::default();
    if let Some(vitals) = world.get::<Vitals>(entity) {
        block.hp = f64::from(vitals.hp);
        block.max_hp = f64::from(vitals.max_hp);
    }
    if let Some(cultivation) = world.get::<Cultivation>(entity) {
        block.level = f64::from(cultivation.level);
    }
    if let Some(age) = world.get::<Age>(entity) {
        block.age_years = age.years() as f64;
    }
    if let Some(purse) = world.get::<Purse>(entity) {
        block.stones = purse.stones as f64;
    }
    block
}
