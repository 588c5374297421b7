pub mod error;
pub mod sim;

// Prelude
pub use error::{
    CollaboratorError, ComputationError, ConfigurationError, RunFailure, SimulationError,
};
pub use sim::greenhouse::{
    ActuatorOverrides, ActuatorPosition, ControlPolicy, Horizon, ParameterSet, RunConfig,
    RunOutput, Simulation, State, StepEnvironment, Trajectory, WeatherProvider, WeatherSample,
};
