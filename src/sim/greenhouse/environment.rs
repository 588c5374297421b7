//! Single-step interface for external agents such as reinforcement-learning
//! controllers.
//!
//! The agent supplies [`ActuatorOverrides`] each step; actuators it leaves
//! unset follow the rule-based controller.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::error::SimulationError;

use super::control::{ActuatorOverrides, ActuatorPosition, ControlPolicy, RuleBasedPolicy};
use super::engine::{ClimateEngine, StepTotals};
use super::horizon::Horizon;
use super::integrator::ClampFlag;
use super::params::ParameterSet;
use super::state::State;
use super::trajectory::fresh_weight_kg;
use super::weather::{WeatherProvider, WeatherSample, WeatherSeries};

const J_PER_MJ: f64 = 1e6;

/// What one call to [`StepEnvironment::step`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentStep {
    /// State at the end of the step.
    pub state: State,
    /// Actuator positions actually applied.
    pub actuators: ActuatorPosition,
    /// Fresh fruit harvested during the step in kg/m^2.
    pub yield_kg: f64,
    /// Boiler heat used during the step in MJ/m^2.
    pub heating_mj: f64,
    /// Lamp electricity used during the step in MJ/m^2.
    pub lamp_mj: f64,
    pub totals: StepTotals,
    pub clamps: Vec<ClampFlag>,
    /// No steps left in the horizon.
    pub done: bool,
}

/// Steps a greenhouse one control interval at a time.
pub struct StepEnvironment {
    engine: ClimateEngine,
    params: Arc<ParameterSet>,
    horizon: Horizon,
    series: WeatherSeries,
    base: RuleBasedPolicy,
    state: State,
    index: usize,
}

impl StepEnvironment {
    /// Validates the setup and materializes the weather for `horizon`.
    ///
    /// Without an initial state the greenhouse starts from the cold-start
    /// defaults.
    pub fn new(
        params: Arc<ParameterSet>,
        horizon: Horizon,
        weather: &dyn WeatherProvider,
        initial: Option<State>,
    ) -> Result<Self, SimulationError> {
        let engine = ClimateEngine::new(params.clone(), &horizon)?;
        let series = WeatherSeries::materialize(weather, &horizon)?;
        let state = match (initial, series.get(0)) {
            (Some(state), _) => state,
            (None, Some(first)) => State::cold_start(&params, first),
            (None, None) => {
                return Err(SimulationError::Internal(anyhow::anyhow!(
                    "weather series is empty"
                )));
            }
        };
        state.ensure_finite()?;
        Ok(Self {
            engine,
            params,
            horizon,
            series,
            base: RuleBasedPolicy::new(),
            state,
            index: 0,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Index of the next step.
    pub fn step_index(&self) -> usize {
        self.index
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.horizon.num_steps()
    }

    /// Outdoor conditions of the next step.
    pub fn weather(&self) -> Option<&WeatherSample> {
        self.series.get(self.index)
    }

    /// Restarts the horizon from `state`.
    pub fn reset(&mut self, state: State) -> Result<(), SimulationError> {
        state.ensure_finite()?;
        self.state = state;
        self.index = 0;
        Ok(())
    }

    /// Applies `overrides` on top of the rule-based controller and advances
    /// one step.
    pub fn step(
        &mut self,
        overrides: &ActuatorOverrides,
    ) -> Result<EnvironmentStep, SimulationError> {
        let Some(weather) = self.series.get(self.index).copied() else {
            return Err(SimulationError::Internal(anyhow::anyhow!(
                "horizon exhausted after {} steps",
                self.index
            )));
        };
        let actuators = overrides.apply(self.base.actuate(&self.state, &self.params, &weather));
        let outcome = self
            .engine
            .advance(&self.state, &actuators, &weather, None, self.horizon.step_s)?;
        for clamp in &outcome.clamps {
            warn!(
                component = clamp.component,
                value = clamp.value,
                step = self.index,
                "clamped non-physical value"
            );
        }

        self.state = outcome.state;
        self.index += 1;
        let t = outcome.totals;
        Ok(EnvironmentStep {
            state: outcome.state,
            actuators,
            yield_kg: fresh_weight_kg(t.harvest_dry_mg, self.params.crop.dry_matter_content),
            heating_mj: t.heating_j / J_PER_MJ,
            lamp_mj: t.lamp_j / J_PER_MJ,
            totals: t,
            clamps: outcome.clamps,
            done: self.is_done(),
        })
    }
}
