//! Decision Oracle
//!
//! Client for the external language model that chooses agent plans, reacts
//! to mutual actions, and composes narration. Every outbound call passes a
//! global semaphore, so the number of in-flight calls is capped no matter
//! how many agents fan out at once. Malformed replies are re-asked a bounded
//! number of times before surfacing as a hard failure.

pub mod parse;
pub mod request;
pub mod rule_based;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;

pub use request::{
    ActionChoice, AgentBrief, AgentDecision, ComposeKind, ComposeReply, ComposeRequest,
    DecideReply, DecideRequest, DecideSubject, Neighbour, OracleRequest, PlannedAction,
    ReactReply, ReactRequest,
};
pub use rule_based::RuleBasedModel;

/// A text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Rate-limited, validating front to a [`LanguageModel`].
pub struct Oracle {
    model: Arc<dyn LanguageModel>,
    limiter: Arc<Semaphore>,
    max_parse_retries: u32,
}

impl Oracle {
    pub fn new(model: Arc<dyn LanguageModel>, config: &OracleConfig) -> Self {
        Self {
            model,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            max_parse_retries: config.max_parse_retries,
        }
    }

    /// Permits currently free; equals the configured bound when idle.
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Batched plan selection. Every subject must receive at least one plan.
    pub async fn decide(&self, request: DecideRequest) -> Result<DecideReply, OracleError> {
        let expected: Vec<String> = request.subjects.iter().map(|s| s.agent.id.clone()).collect();
        self.ask(&OracleRequest::Decide(request), |reply: &DecideReply| {
            for id in &expected {
                match reply.decisions.get(id) {
                    Some(decision) if !decision.plans.is_empty() => {}
                    Some(_) => return Err(format!("no plans for agent {}", id)),
                    None => return Err(format!("agent {} missing from reply", id)),
                }
            }
            Ok(())
        })
        .await
    }

    /// Mutual-action reaction. The returned token is normalised to the
    /// declared spelling of the legal reaction it matches.
    pub async fn react(&self, request: ReactRequest) -> Result<ReactReply, OracleError> {
        let legal = request.reactions.clone();
        let mut reply = self
            .ask(&OracleRequest::React(request), |reply: &ReactReply| {
                if find_reaction(&legal, &reply.reaction).is_some() {
                    Ok(())
                } else {
                    Err(format!(
                        "reaction '{}' not one of {:?}",
                        reply.reaction, legal
                    ))
                }
            })
            .await?;
        if let Some(declared) = find_reaction(&legal, &reply.reaction) {
            reply.reaction = declared.to_string();
        }
        Ok(reply)
    }

    /// Free-form narration.
    pub async fn compose(&self, request: ComposeRequest) -> Result<String, OracleError> {
        let reply = self
            .ask(&OracleRequest::Compose(request), |reply: &ComposeReply| {
                if reply.text.trim().is_empty() {
                    Err("empty text".to_string())
                } else {
                    Ok(())
                }
            })
            .await?;
        Ok(reply.text.trim().to_string())
    }

    async fn ask<T, V>(&self, request: &OracleRequest, validate: V) -> Result<T, OracleError>
    where
        T: DeserializeOwned,
        V: Fn(&T) -> Result<(), String>,
    {
        let prompt =
            serde_json::to_string(request).map_err(|e| OracleError::Encode(e.to_string()))?;
        let attempts = self.max_parse_retries + 1;
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let raw = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|e| OracleError::Model(format!("limiter closed: {}", e)))?;
                self.model.complete(&prompt).await?
            };

            match parse::parse_reply::<T>(&raw).and_then(|reply| validate(&reply).map(|_| reply)) {
                Ok(reply) => {
                    debug!(kind = request.kind(), attempt, "oracle reply accepted");
                    return Ok(reply);
                }
                Err(e) => {
                    warn!(kind = request.kind(), attempt, error = %e, "malformed oracle reply");
                    reason = e;
                }
            }
        }

        Err(OracleError::Malformed { attempts, reason })
    }
}

fn find_reaction<'a>(legal: &'a [String], token: &str) -> Option<&'a str> {
    let token = token.trim();
    legal
        .iter()
        .find(|r| r.eq_ignore_ascii_case(token))
        .map(String::as_str)
}
