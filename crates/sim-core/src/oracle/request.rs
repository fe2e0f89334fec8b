//! Oracle Wire Types
//!
//! Requests are serialized as one JSON envelope per call; replies are JSON
//! objects the model is expected to produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sim_events::MonthStamp;

use crate::runtime::ActionParams;

/// Snapshot of one agent as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBrief {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub level: u32,
    pub exp: u64,
    pub exp_to_breakthrough: u64,
    pub stones: i64,
    pub age_years: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_objective: Option<String>,
}

/// Someone the subject can currently see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub level: u32,
    /// What this neighbour is to the viewer, if anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// An action the model may choose, advertised from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionChoice {
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

/// One agent awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideSubject {
    pub agent: AgentBrief,
    pub neighbours: Vec<Neighbour>,
    /// Recent history lines, oldest first
    pub memories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideRequest {
    pub tick: MonthStamp,
    pub phenomenon: String,
    pub actions: Vec<ActionChoice>,
    pub subjects: Vec<DecideSubject>,
}

/// Asks the target of a mutual action how they respond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactRequest {
    pub tick: MonthStamp,
    pub action: String,
    pub summary: String,
    pub initiator: AgentBrief,
    pub target: AgentBrief,
    /// Legal reaction tokens
    pub reactions: Vec<String>,
    pub shared_history: Vec<String>,
}

/// What kind of text a compose request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeKind {
    Story,
    Objective,
    Nickname,
    Fortune,
    Misfortune,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub tick: MonthStamp,
    pub kind: ComposeKind,
    pub subject: AgentBrief,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<AgentBrief>,
    /// Lines the text should build on
    pub context: Vec<String>,
}

/// Envelope sent to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleRequest {
    Decide(DecideRequest),
    React(ReactRequest),
    Compose(ComposeRequest),
}

impl OracleRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleRequest::Decide(_) => "decide",
            OracleRequest::React(_) => "react",
            OracleRequest::Compose(_) => "compose",
        }
    }
}

/// A single planned step in a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action: String,
    #[serde(default)]
    pub params: ActionParams,
}

/// Decision for one agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentDecision {
    pub plans: Vec<PlannedAction>,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub short_term_objective: String,
}

/// Reply to a [`DecideRequest`], keyed by agent id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecideReply {
    pub decisions: BTreeMap<String, AgentDecision>,
}

/// Reply to a [`ReactRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactReply {
    pub reaction: String,
    #[serde(default)]
    pub thinking: String,
}

/// Reply to a [`ComposeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeReply {
    pub text: String,
}
