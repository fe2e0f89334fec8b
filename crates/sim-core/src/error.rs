//! Error Types
//!
//! Failures that abort or isolate work during a tick. Validation failures are
//! not errors: `can_start` reports them as plain `Err(String)` reasons.

use thiserror::Error;

/// Failure talking to the decision oracle.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The model itself failed (transport, provider, closed limiter).
    #[error("language model failed: {0}")]
    Model(String),

    /// Every attempt produced text that could not be turned into a valid reply.
    #[error("malformed oracle reply after {attempts} attempts: {reason}")]
    Malformed { attempts: u32, reason: String },

    /// The request could not be serialized.
    #[error("failed to encode oracle request: {0}")]
    Encode(String),
}

/// Registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no action registered under '{0}'")]
    NotFound(String),

    #[error("action '{0}' is abstract and cannot be instantiated")]
    Abstract(String),

    #[error("action '{0}' is already registered")]
    Duplicate(String),
}

/// Failure inside an action body (`start`, `step`, `finish`).
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("agent entity {0} is missing component {1}")]
    MissingComponent(String, &'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ActionError::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error returned by [`crate::Simulator::step`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error("action '{action}' of agent {agent} failed: {source}")]
    Action {
        agent: String,
        action: String,
        #[source]
        source: ActionError,
    },

    #[error("oracle failure in {phase}: {source}")]
    Oracle {
        phase: &'static str,
        #[source]
        source: OracleError,
    },

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SimError {
    pub fn oracle(phase: &'static str, source: OracleError) -> Self {
        SimError::Oracle { phase, source }
    }
}

impl From<tokio::task::JoinError> for SimError {
    fn from(err: tokio::task::JoinError) -> Self {
        SimError::Task(err.to_string())
    }
}
