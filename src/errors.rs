//! Typed error hierarchy for phaseforge.
//!
//! Three top-level enums cover the three subsystems:
//! - `GenerationError` — phase orchestrator failures
//! - `DeploymentError` — sandbox deployment failures (cloneable, shared between waiters)
//! - `StateError` — state store versioning and persistence failures

use phaseforge_common::{SandboxError, ServiceError};
use thiserror::Error;

/// Errors from the phase orchestrator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Content generation failed for phase '{phase}': {message}")]
    Content { phase: String, message: String },

    #[error("Review failed: {0}")]
    Review(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenerationError {
    /// Quota errors end the run and reach the caller; everything else idles the machine.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GenerationError::QuotaExceeded(_))
    }

    pub(crate) fn planning(err: ServiceError) -> Self {
        match err {
            ServiceError::QuotaExceeded(msg) => GenerationError::QuotaExceeded(msg),
            ServiceError::Other(e) => GenerationError::Planning(format!("{:#}", e)),
        }
    }

    pub(crate) fn content(phase: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::QuotaExceeded(msg) => GenerationError::QuotaExceeded(msg),
            ServiceError::Other(e) => GenerationError::Content {
                phase: phase.to_string(),
                message: format!("{:#}", e),
            },
        }
    }

    pub(crate) fn review(err: ServiceError) -> Self {
        match err {
            ServiceError::QuotaExceeded(msg) => GenerationError::QuotaExceeded(msg),
            ServiceError::Other(e) => GenerationError::Review(format!("{:#}", e)),
        }
    }
}

/// Errors from the deployment manager.
///
/// `Clone` because a single in-flight deployment's outcome is handed to every
/// caller that joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeploymentError {
    #[error("Deployment '{label}' timed out after {secs}s")]
    Timeout { label: String, secs: u64 },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Deployment failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Deployment task aborted: {0}")]
    Aborted(String),

    #[error("State update failed during deployment: {0}")]
    State(String),
}

impl From<SandboxError> for DeploymentError {
    fn from(err: SandboxError) -> Self {
        DeploymentError::Sandbox(format!("{:#}", err))
    }
}

impl From<StateError> for DeploymentError {
    fn from(err: StateError) -> Self {
        DeploymentError::State(err.to_string())
    }
}

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Failed to persist state to {path}: {message}")]
    Persist {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Failed to load state from {path}: {message}")]
    Load {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("State lock poisoned")]
    LockPoisoned,
}
