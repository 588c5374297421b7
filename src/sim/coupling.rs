//! Coupling payloads exchanged between pipeline stages via the
//! [`crate::sim::framework::Bus`].
//!
//! Stages otherwise publish the domain records themselves (`WeatherSample`,
//! `ActuatorPosition`, `State`, `StepOutcome`), keyed by their type. The
//! newtypes below cover values that have no domain type of their own.

use crate::sim::greenhouse::envelope::{EnvelopeBoundary, EnvelopeFluxes};

/// Index of the current control step within the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepIndex(pub usize);

/// Result of this step's envelope handshake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeExchange {
    /// What was sent to the collaborator.
    pub boundary: EnvelopeBoundary,
    /// What came back.
    pub fluxes: EnvelopeFluxes,
}
