//! Offline Model
//!
//! A deterministic stand-in for a hosted language model. It decodes the
//! request envelope and answers with simple heuristics, seeded from the
//! configured seed and the request itself so runs are reproducible.

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::request::*;
use super::LanguageModel;
use crate::error::OracleError;
use crate::runtime::ActionParams;

const OBJECTIVES: &[&str] = &[
    "Reach the next realm before the decade ends",
    "Amass a hoard of spirit stones",
    "Wander the land in search of insight",
    "Find a worthy disciple",
    "Settle old grudges",
];

const EPITHETS: &[&str] = &[
    "Iron", "Silent", "Crimson", "Wandering", "Jade", "Thunder", "Hollow", "Golden",
];

const TITLES: &[&str] = &["Blade", "Sage", "Fist", "Crane", "Ghost", "Storm"];

/// Heuristic model answering every request kind.
#[derive(Debug, Clone)]
pub struct RuleBasedModel {
    seed: u64,
    /// Fraction of HP below which an agent rests
    rest_threshold: f64,
}

/// Chance of picking a fight with a neighbour, by what they are to us.
fn hostility(relation: Option<&str>) -> f64 {
    match relation {
        Some("Enemy") => 0.8,
        Some(_) => 0.05,
        None => 0.4,
    }
}

impl RuleBasedModel {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rest_threshold: 0.4,
        }
    }

    fn rng_for(&self, prompt: &str) -> SmallRng {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        SmallRng::seed_from_u64(self.seed ^ hasher.finish())
    }

    fn decide(&self, request: &DecideRequest, rng: &mut SmallRng) -> DecideReply {
        let offered = |name: &str| request.actions.iter().any(|a| a.name == name);
        let mut decisions = BTreeMap::new();

        for subject in &request.subjects {
            let agent = &subject.agent;
            let mut plans = Vec::new();
            let mut thinking = String::new();

            if f64::from(agent.hp) < f64::from(agent.max_hp) * self.rest_threshold && offered("Rest") {
                plans.push(planned("Rest", ActionParams::new()));
                thinking.push_str("My wounds need tending.");
            } else if agent.exp >= agent.exp_to_breakthrough && offered("Breakthrough") {
                plans.push(planned("Breakthrough", ActionParams::new()));
                thinking.push_str("The barrier trembles; now is the moment.");
            } else if let Some(other) = subject.neighbours.choose(rng).filter(|_| rng.gen_bool(0.35)) {
                let mutual = if other.level + 1 < agent.level && offered("Impart") {
                    "Impart"
                } else if rng.gen_bool(hostility(other.relation.as_deref())) && offered("Attack") {
                    "Attack"
                } else {
                    "Talk"
                };
                let (dx, dy) = (other.x - agent.x, other.y - agent.y);
                if dx.abs().max(dy.abs()) > 1 && offered("Move") {
                    plans.push(planned("Move", step_towards(dx, dy)));
                }
                if offered(mutual) {
                    plans.push(planned(mutual, ActionParams::new().with("target", other.id.clone())));
                }
                thinking = format!("{} is nearby.", other.name);
            }

            if plans.is_empty() {
                if rng.gen_bool(0.6) && offered("Cultivate") {
                    plans.push(planned("Cultivate", ActionParams::new()));
                    thinking.push_str("Time to cultivate.");
                } else if offered("Move") {
                    let params = step_towards(rng.gen_range(-3..=3), rng.gen_range(-3..=3));
                    plans.push(planned("Move", params));
                    thinking.push_str("Restless feet.");
                } else if let Some(any) = request.actions.first() {
                    plans.push(planned(&any.name, ActionParams::new()));
                }
            }

            decisions.insert(
                agent.id.clone(),
                AgentDecision {
                    plans,
                    thinking,
                    short_term_objective: agent
                        .long_term_objective
                        .clone()
                        .unwrap_or_else(|| "Survive".to_string()),
                },
            );
        }

        DecideReply { decisions }
    }

    fn react(&self, request: &ReactRequest, rng: &mut SmallRng) -> ReactReply {
        let has = |token: &str| request.reactions.iter().any(|r| r == token);
        let stronger = request.target.level >= request.initiator.level;

        let reaction = if has("Battle") && has("Escape") {
            if stronger || rng.gen_bool(0.3) {
                "Battle"
            } else {
                "Escape"
            }
        } else if has("Accept") && has("Reject") {
            if rng.gen_bool(0.7) {
                "Accept"
            } else {
                "Reject"
            }
        } else if has("Unchanged") {
            let changes: Vec<&String> = request.reactions.iter().filter(|r| *r != "Unchanged").collect();
            match changes.choose(rng) {
                Some(change) if rng.gen_bool(0.25) => change.as_str(),
                _ => "Unchanged",
            }
        } else {
            request.reactions.first().map(String::as_str).unwrap_or("")
        };

        ReactReply {
            reaction: reaction.to_string(),
            thinking: format!("{} weighs {}'s move.", request.target.name, request.initiator.name),
        }
    }

    fn compose(&self, request: &ComposeRequest, rng: &mut SmallRng) -> ComposeReply {
        let name = &request.subject.name;
        let text = match request.kind {
            ComposeKind::Objective => OBJECTIVES.choose(rng).copied().unwrap_or("Survive").to_string(),
            ComposeKind::Nickname => format!(
                "{} {}",
                EPITHETS.choose(rng).copied().unwrap_or("Nameless"),
                TITLES.choose(rng).copied().unwrap_or("Wanderer")
            ),
            ComposeKind::Fortune => format!("Heaven smiles on {}: a hidden cache of spirit stones.", name),
            ComposeKind::Misfortune => format!("Ill luck finds {}: a fall on a mountain path.", name),
            ComposeKind::Story => {
                let base = request.context.join(" ");
                match &request.other {
                    Some(other) => format!("{} Between {} and {}, something shifted that day.", base, name, other.name),
                    None => format!("{} {} would remember it.", base, name),
                }
            }
        };
        ComposeReply { text: text.trim().to_string() }
    }
}

fn planned(action: &str, params: ActionParams) -> PlannedAction {
    PlannedAction {
        action: action.to_string(),
        params,
    }
}

fn step_towards(dx: i32, dy: i32) -> ActionParams {
    ActionParams::new()
        .with("dx", dx.clamp(-3, 3))
        .with("dy", dy.clamp(-3, 3))
}

#[async_trait]
impl LanguageModel for RuleBasedModel {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let request: OracleRequest = serde_json::from_str(prompt)
            .map_err(|e| OracleError::Model(format!("unreadable request: {}", e)))?;
        let mut rng = self.rng_for(prompt);

        let reply = match &request {
            OracleRequest::Decide(r) => serde_json::to_string(&self.decide(r, &mut rng)),
            OracleRequest::React(r) => serde_json::to_string(&self.react(r, &mut rng)),
            OracleRequest::Compose(r) => serde_json::to_string(&self.compose(r, &mut rng)),
        };
        reply.map_err(|e| OracleError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::brief;
    use sim_events::MonthStamp;

    fn choice(name: &str) -> ActionChoice {
        ActionChoice {
            name: name.to_string(),
            summary: String::new(),
            params: vec![],
        }
    }

    #[tokio::test]
    async fn test_wounded_agent_rests() {
        let mut agent = brief("avatar_0001");
        agent.hp = 10;
        let request = OracleRequest::Decide(DecideRequest {
            tick: MonthStamp(1),
            phenomenon: String::new(),
            actions: vec![choice("Rest"), choice("Cultivate")],
            subjects: vec![DecideSubject {
                agent,
                neighbours: vec![],
                memories: vec![],
            }],
        });
        let prompt = serde_json::to_string(&request).unwrap();

        let raw = RuleBasedModel::new(1).complete(&prompt).await.unwrap();
        let reply: DecideReply = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply.decisions["avatar_0001"].plans[0].action, "Rest");
    }

    #[tokio::test]
    async fn test_same_prompt_same_answer() {
        let request = OracleRequest::Compose(ComposeRequest {
            tick: MonthStamp(3),
            kind: ComposeKind::Nickname,
            subject: brief("avatar_0001"),
            other: None,
            context: vec![],
        });
        let prompt = serde_json::to_string(&request).unwrap();
        let model = RuleBasedModel::new(9);

        let a = model.complete(&prompt).await.unwrap();
        let b = model.complete(&prompt).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_reaction_is_legal() {
        let request = OracleRequest::React(ReactRequest {
            tick: MonthStamp(1),
            action: "Talk".to_string(),
            summary: String::new(),
            initiator: brief("avatar_0001"),
            target: brief("avatar_0002"),
            reactions: vec!["Accept".to_string(), "Reject".to_string()],
            shared_history: vec![],
        });
        let prompt = serde_json::to_string(&request).unwrap();

        let raw = RuleBasedModel::new(4).complete(&prompt).await.unwrap();
        let reply: ReactReply = serde_json::from_str(&raw).unwrap();
        assert!(reply.reaction == "Accept" || reply.reaction == "Reject");
    }

    #[tokio::test]
    async fn test_relation_choice_stays_within_offered_set() {
        let offered = vec!["Friend".to_string(), "Enemy".to_string(), "Unchanged".to_string()];
        let request = OracleRequest::React(ReactRequest {
            tick: MonthStamp(2),
            action: "Conversation".to_string(),
            summary: String::new(),
            initiator: brief("avatar_0001"),
            target: brief("avatar_0002"),
            reactions: offered.clone(),
            shared_history: vec![],
        });
        let prompt = serde_json::to_string(&request).unwrap();

        for seed in 0..8 {
            let raw = RuleBasedModel::new(seed).complete(&prompt).await.unwrap();
            let reply: ReactReply = serde_json::from_str(&raw).unwrap();
            assert!(offered.contains(&reply.reaction), "{}", reply.reaction);
        }
    }

    #[tokio::test]
    async fn test_rejects_non_envelope() {
        assert!(RuleBasedModel::new(0).complete("hello").await.is_err());
    }
}
