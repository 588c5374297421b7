//! Greenhouse climate and tomato crop simulation.
//!
//! A lumped, multi-compartment model of a glass greenhouse: air below and
//! above the thermal screen, cover, screen, lamps, heating pipes, canopy,
//! floor and soil layers, plus the carbohydrate pools of a tomato crop.
//!
//! The main entry points are:
//! - [`Simulation`] for a whole horizon, built directly or from a [`RunConfig`]
//! - [`StepEnvironment`] for agents that choose actuator positions each step
//! - [`ClimateEngine`] for advancing a single control step

pub mod config;
pub mod control;
pub mod engine;
pub mod envelope;
pub mod environment;
pub mod flux;
pub mod geometry;
pub mod horizon;
pub mod integrator;
pub mod params;
pub mod psychro;
pub(crate) mod record;
pub mod recorder;
pub mod simulation;
pub mod stages;
pub mod state;
pub mod trajectory;
pub mod weather;

pub use config::RunConfig;
pub use control::{ActuatorOverrides, ActuatorPosition, ControlPolicy, RuleBasedPolicy};
pub use engine::{ClimateEngine, StepOutcome, StepTotals};
pub use envelope::{EnvelopeBoundary, EnvelopeCollaborator, EnvelopeFluxes};
pub use environment::{EnvironmentStep, StepEnvironment};
pub use flux::{FluxModel, FluxSet};
pub use geometry::{GeometryFragment, GreenhouseShape, RoofArchetype};
pub use horizon::Horizon;
pub use params::{LampType, ParameterSet};
pub use simulation::{RunOutput, Simulation, run_batch};
pub use state::State;
pub use trajectory::{Trajectory, TrajectoryStep, TrajectorySummary};
pub use weather::{WeatherData, WeatherProvider, WeatherSample};
