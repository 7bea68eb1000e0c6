//! Typed error hierarchy for the research engine.
//!
//! Backend failures never appear here: adapters report them inside
//! `BackendResponse::error` so the loop can keep going. What remains are the
//! failures a caller has to see:
//! - `EngineError`: session and store failures surfaced by the engine
//! - `StoreError`: state store failures
//! - `TaskError`: sub-task construction contract violations

use thiserror::Error;

/// Errors surfaced by the research engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session {id} not found")]
    SessionNotFound { id: i64 },

    #[error("Session {id} is busy: another round or intervention holds its lease")]
    SessionBusy { id: i64 },

    #[error("Invalid intervention: {0}")]
    InvalidIntervention(String),

    #[error("State store error: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => EngineError::SessionNotFound { id },
            other => EngineError::Store(other),
        }
    }
}

/// Errors from the durable state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {id} not found")]
    NotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt record for session {id}: {source}")]
    Corrupt {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A sub-task that violates its action's required-field contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Action '{action}' requires a non-empty query")]
    MissingQuery { action: String },

    #[error("Action '{action}' requires content or a query")]
    MissingInput { action: String },

    #[error("Unknown backend selector '{0}'")]
    UnknownBackend(String),

    #[error("Unknown vision job type '{0}'")]
    UnknownVisionJob(String),

    #[error("Vision flags are inconsistent: {0}")]
    InconsistentVision(String),
}
