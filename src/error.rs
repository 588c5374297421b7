//! Error taxonomy of the simulation core.
//!
//! Plumbing code (bus lookups, file loading, module pipelines) reports failures
//! through `anyhow`. The typed errors below are what callers match on: they are
//! raised by the physics and by external collaborators, travel through the
//! pipeline as `anyhow::Error`, and are recovered at the driver boundary.

use thiserror::Error;

use crate::sim::greenhouse::trajectory::Trajectory;

/// Missing, inconsistent or non-physical configuration. Raised before stepping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("parameter `{name}` must be finite (got {value})")]
    NonFinite { name: String, value: f64 },
    #[error("parameter `{name}` must be strictly positive (got {value})")]
    NotPositive { name: String, value: f64 },
    #[error("parameter `{name}` must lie in [{min}, {max}] (got {value})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("inconsistent parameters: {0}")]
    Inconsistent(String),
    #[error("invalid horizon: {0}")]
    Horizon(String),
    #[error("invalid configuration file: {0}")]
    File(String),
}

/// Non-finite or out-of-domain value met while computing a step.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("non-finite value in `{term}` (got {value})")]
pub struct ComputationError {
    /// Name of the offending flux term or state component.
    pub term: String,
    pub value: f64,
}

impl ComputationError {
    pub fn new(term: impl Into<String>, value: f64) -> Self {
        Self {
            term: term.into(),
            value,
        }
    }
}

/// An external collaborator (envelope co-simulator, weather source) failed or
/// returned malformed data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{collaborator} collaborator failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Anything that can stop a run.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl SimulationError {
    /// Recovers the typed error carried by an `anyhow` chain, if any.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ComputationError>() {
            return Self::Computation(e.clone());
        }
        if let Some(e) = err.downcast_ref::<CollaboratorError>() {
            return Self::Collaborator(e.clone());
        }
        if let Some(e) = err.downcast_ref::<ConfigurationError>() {
            return Self::Configuration(e.clone());
        }
        Self::Internal(err)
    }
}

/// A failed run: what failed, where, and everything recorded up to the last good step.
#[derive(Debug, Error)]
#[error("run failed at step {step_index:?}: {error}")]
pub struct RunFailure {
    #[source]
    pub error: SimulationError,
    /// Index of the step that failed; `None` when the run never started.
    pub step_index: Option<usize>,
    pub partial: Trajectory,
}
