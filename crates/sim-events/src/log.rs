//! Event Log
//!
//! Append-only history of world events with bounded indices per agent and per
//! pair of agents. Insertion is idempotent on [`Event::id`].

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId};

/// Capacity settings for an [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogLimits {
    /// Capacity of the global ring buffer
    pub max_global_events: usize,
    /// Capacity of every per-agent and per-pair index
    pub max_index_events: usize,
    /// How many past ids are remembered for duplicate detection once their
    /// events have left the store
    pub dedup_horizon: usize,
}

impl Default for EventLogLimits {
    fn default() -> Self {
        Self {
            max_global_events: 5000,
            max_index_events: 200,
            dedup_horizon: 20_000,
        }
    }
}

/// Bounded index split into all, major, and minor (non-major) views.
#[derive(Debug, Clone, Default)]
struct Partition {
    all: VecDeque<EventId>,
    major: VecDeque<EventId>,
    minor: VecDeque<EventId>,
}

impl Partition {
    /// Pushes the event into the views it belongs to, appending evicted ids.
    fn push(&mut self, event: &Event, cap: usize, evicted: &mut Vec<EventId>) {
        push_bounded(&mut self.all, event.id, cap, evicted);
        if event.is_major {
            push_bounded(&mut self.major, event.id, cap, evicted);
        } else {
            push_bounded(&mut self.minor, event.id, cap, evicted);
        }
    }

    fn view(&self, filter: EventFilter) -> &VecDeque<EventId> {
        match filter {
            EventFilter::All => &self.all,
            EventFilter::Major => &self.major,
            EventFilter::Minor => &self.minor,
        }
    }
}

/// Which classification of events a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Major,
    /// Minor and story events, i.e. everything not flagged major
    Minor,
}

fn push_bounded(queue: &mut VecDeque<EventId>, id: EventId, cap: usize, evicted: &mut Vec<EventId>) {
    queue.push_back(id);
    while queue.len() > cap {
        if let Some(old) = queue.pop_front() {
            evicted.push(old);
        }
    }
}

/// Number of views an event is pushed into per partition (all + major or minor).
const VIEWS_PER_PARTITION: usize = 2;

/// Canonical key for a pair of agents, independent of argument order.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Durable queryable record of everything that happened.
///
/// Events live in a single reference-counted store keyed by id; the global
/// buffer and every index hold ids only. An event evicted from the global
/// buffer stays reachable through any index that still references it, and
/// is dropped once nothing does. Ids of dropped events are remembered for
/// [`EventLogLimits::dedup_horizon`] further insertions, so a replay older
/// than that is accepted again.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    limits: EventLogLimits,
    store: HashMap<EventId, (Event, usize)>,
    seen: HashSet<EventId>,
    seen_order: VecDeque<EventId>,
    global: Partition,
    by_agent: HashMap<String, Partition>,
    by_pair: HashMap<(String, String), Partition>,
}

impl EventLog {
    /// Creates an empty log with the given limits.
    pub fn new(limits: EventLogLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Returns the configured limits.
    pub fn limits(&self) -> EventLogLimits {
        self.limits
    }

    /// Adds an event. Returns `false` when the id was already recorded.
    pub fn add_event(&mut self, event: Event) -> bool {
        if self.contains(&event.id) {
            return false;
        }
        self.remember(event.id);

        let global_cap = self.limits.max_global_events;
        let index_cap = self.limits.max_index_events;
        let mut evicted = Vec::new();
        let mut partitions = 1;

        self.global.push(&event, global_cap, &mut evicted);

        let agents = event.distinct_agents();
        for agent in &agents {
            self.by_agent
                .entry((*agent).to_string())
                .or_default()
                .push(&event, index_cap, &mut evicted);
            partitions += 1;
        }
        if let [a, b] = agents.as_slice() {
            self.by_pair
                .entry(pair_key(a, b))
                .or_default()
                .push(&event, index_cap, &mut evicted);
            partitions += 1;
        }

        self.store
            .insert(event.id, (event, partitions * VIEWS_PER_PARTITION));
        self.release(evicted);
        true
    }

    /// Adds many events in order. Returns how many were new.
    pub fn extend<I: IntoIterator<Item = Event>>(&mut self, events: I) -> usize {
        let mut added = 0;
        for event in events {
            if self.add_event(event) {
                added += 1;
            }
        }
        added
    }

    /// Whether an event id is still retained or within the dedup horizon.
    pub fn contains(&self, id: &EventId) -> bool {
        self.store.contains_key(id) || self.seen.contains(id)
    }

    /// Looks up a retained event by id.
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.store.get(id).map(|(event, _)| event)
    }

    /// Number of events in the global buffer.
    pub fn len(&self) -> usize {
        self.global.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.all.is_empty()
    }

    /// Most recent events across the world, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<&Event> {
        self.recent_filtered(EventFilter::All, limit)
    }

    pub fn recent_filtered(&self, filter: EventFilter, limit: usize) -> Vec<&Event> {
        self.tail(self.global.view(filter), limit)
    }

    /// Most recent events involving an agent, oldest first.
    pub fn by_agent(&self, agent_id: &str, limit: usize) -> Vec<&Event> {
        self.by_agent_filtered(agent_id, EventFilter::All, limit)
    }

    pub fn by_agent_filtered(&self, agent_id: &str, filter: EventFilter, limit: usize) -> Vec<&Event> {
        match self.by_agent.get(agent_id) {
            Some(partition) => self.tail(partition.view(filter), limit),
            None => Vec::new(),
        }
    }

    /// Most recent events involving exactly this pair of agents, oldest first.
    pub fn by_pair(&self, a: &str, b: &str, limit: usize) -> Vec<&Event> {
        self.by_pair_filtered(a, b, EventFilter::All, limit)
    }

    pub fn by_pair_filtered(&self, a: &str, b: &str, filter: EventFilter, limit: usize) -> Vec<&Event> {
        match self.by_pair.get(&pair_key(a, b)) {
            Some(partition) => self.tail(partition.view(filter), limit),
            None => Vec::new(),
        }
    }

    /// Number of major events indexed for an agent (bounded by the index cap).
    pub fn major_count(&self, agent_id: &str) -> usize {
        self.by_agent
            .get(agent_id)
            .map(|partition| partition.major.len())
            .unwrap_or(0)
    }

    fn tail<'a>(&'a self, ids: &VecDeque<EventId>, limit: usize) -> Vec<&'a Event> {
        let skip = ids.len().saturating_sub(limit);
        ids.iter()
            .skip(skip)
            .filter_map(|id| self.get(id))
            .collect()
    }

    fn remember(&mut self, id: EventId) {
        self.seen.insert(id);
        self.seen_order.push_back(id);
        while self.seen_order.len() > self.limits.dedup_horizon {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }

    /// Drops one reference per evicted id; unreferenced events leave the store.
    fn release(&mut self, evicted: Vec<EventId>) {
        for id in evicted {
            let gone = match self.store.get_mut(&id) {
                Some((_, refs)) => {
                    *refs = refs.saturating_sub(1);
                    *refs == 0
                }
                None => false,
            };
            if gone {
                self.store.remove(&id);
            }
        }
    }
}
