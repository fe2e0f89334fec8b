//! Event Types
//!
//! The immutable record of something that happened in the world.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MonthStamp;

/// Unique identifier of an event. Used for idempotent insertion.
pub type EventId = Uuid;

/// A world happening, narrated in one line and tagged with its participants.
///
/// Events are created once and never mutated afterwards; the builder methods
/// consume and return the value so construction stays a single expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id
    pub id: EventId,
    /// Month the event is narrated at
    pub tick: MonthStamp,
    /// Narration text
    pub content: String,
    /// Agents involved, initiator first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_agents: Vec<String>,
    /// Major events shape an agent's reputation (nicknames, long memory)
    #[serde(default)]
    pub is_major: bool,
    /// Story events carry generated prose rather than a terse log line
    #[serde(default)]
    pub is_story: bool,
}

impl Event {
    /// Create a new minor event with a fresh id.
    pub fn new(tick: MonthStamp, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tick,
            content: content.into(),
            related_agents: Vec::new(),
            is_major: false,
            is_story: false,
        }
    }

    /// Sets the participating agents.
    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the event as major.
    pub fn major(mut self) -> Self {
        self.is_major = true;
        self
    }

    /// Marks the event as a story.
    pub fn story(mut self) -> Self {
        self.is_story = true;
        self
    }

    /// Checks if a specific agent is involved in this event.
    pub fn involves_agent(&self, agent_id: &str) -> bool {
        self.related_agents.iter().any(|id| id == agent_id)
    }

    /// Returns the related agents with duplicates removed, order preserved.
    pub fn distinct_agents(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.related_agents.len());
        for id in &self.related_agents {
            if !seen.contains(&id.as_str()) {
                seen.push(id.as_str());
            }
        }
        seen
    }

    /// Serializes the event to a JSON line (for JSONL format).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an event from a JSON line.
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.tick, self.content)
    }
}
