//! Drives a greenhouse run over a horizon.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::error::{RunFailure, SimulationError};
use crate::sim::framework::{Bus, Pipeline, SimContext};

use super::control::{ControlPolicy, RuleBasedPolicy};
use super::engine::ClimateEngine;
use super::envelope::EnvelopeCollaborator;
use super::horizon::{Horizon, day_index};
use super::params::ParameterSet;
use super::recorder::RecorderModule;
use super::stages::{ClimateModule, ControlModule, EnvelopeModule, WeatherModule};
use super::state::State;
use super::trajectory::Trajectory;
use super::weather::{WeatherProvider, WeatherSeries};

/// Everything a single run needs. Runs share nothing mutable.
pub struct Simulation {
    params: Arc<ParameterSet>,
    horizon: Horizon,
    weather: Arc<dyn WeatherProvider>,
    policy: Arc<dyn ControlPolicy>,
    initial_state: Option<State>,
    envelope: Option<Box<dyn EnvelopeCollaborator>>,
}

/// A completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
    pub horizon: Horizon,
    pub trajectory: Trajectory,
    /// Resume token for a following segment.
    pub terminal_state: State,
}

impl Simulation {
    /// A run with the rule-based controller, starting from the cold-start state.
    pub fn new(
        params: Arc<ParameterSet>,
        horizon: Horizon,
        weather: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            params,
            horizon,
            weather,
            policy: Arc::new(RuleBasedPolicy::new()),
            initial_state: None,
            envelope: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ControlPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Starts from `state` instead of the cold-start defaults.
    pub fn with_initial_state(mut self, state: State) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_envelope(mut self, collaborator: Box<dyn EnvelopeCollaborator>) -> Self {
        self.envelope = Some(collaborator);
        self
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    /// Runs the whole horizon.
    ///
    /// Stops at the first failing step. The failure carries the step index
    /// and the trajectory recorded up to the last good step.
    pub fn run(self) -> Result<RunOutput, RunFailure> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("run", %run_id);
        let _guard = span.enter();

        let not_started = |error: SimulationError| {
            error!(%error, "run rejected before the first step");
            RunFailure {
                error,
                step_index: None,
                partial: Trajectory::empty(),
            }
        };

        let engine = ClimateEngine::new(self.params.clone(), &self.horizon)
            .map_err(|e| not_started(e.into()))?;
        let series = WeatherSeries::materialize(self.weather.as_ref(), &self.horizon)
            .map_err(|e| not_started(e.into()))?;
        let initial = match (self.initial_state, series.get(0)) {
            (Some(state), _) => state,
            (None, Some(first)) => State::cold_start(&self.params, first),
            (None, None) => {
                return Err(not_started(SimulationError::Internal(anyhow::anyhow!(
                    "weather series is empty"
                ))));
            }
        };

        let num_steps = self.horizon.num_steps();
        info!(
            start_s = self.horizon.start_s,
            duration_s = self.horizon.duration_s,
            step_s = self.horizon.step_s,
            steps = num_steps,
            substeps_per_step = engine.substeps(self.horizon.step_s),
            weather = self.weather.name(),
            "starting greenhouse run"
        );

        let mut pipeline = Pipeline::new()
            .with_module(WeatherModule::new(Arc::new(series)))
            .with_module(ControlModule::new(self.policy.clone()));
        if let Some(collaborator) = self.envelope {
            pipeline = pipeline.with_module(EnvelopeModule::new(collaborator));
        }
        let mut pipeline = pipeline
            .with_module(ClimateModule::new(engine))
            .with_module(RecorderModule::new());

        let ctx = SimContext::new(&self.params, &self.horizon);
        let mut bus = Bus::new();
        bus.put(initial);
        if let Err(e) = pipeline.init(&ctx, &mut bus) {
            return Err(not_started(SimulationError::from_anyhow(e)));
        }

        let mut day = day_index(self.horizon.start_s);
        for i in 0..num_steps {
            if let Err(e) = pipeline.step(&ctx, &mut bus) {
                let error = SimulationError::from_anyhow(e);
                error!(step = i, time_s = self.horizon.time_at(i), %error, "run failed");
                let partial = RecorderModule::take_result(&mut bus).unwrap_or_default();
                return Err(RunFailure {
                    error,
                    step_index: Some(i),
                    partial,
                });
            }
            let next_day = day_index(self.horizon.time_at(i + 1));
            if next_day != day {
                if let Some(state) = bus.get::<State>() {
                    debug!(
                        day,
                        t_air = state.t_air,
                        co2_air = state.co2_air,
                        c_fruit = state.c_fruit,
                        harvested = state.harvested_fruit,
                        "simulated day complete"
                    );
                }
                day = next_day;
            }
        }

        let trajectory = RecorderModule::take_result(&mut bus).map_err(|e| RunFailure {
            error: SimulationError::Internal(e),
            step_index: None,
            partial: Trajectory::empty(),
        })?;
        let terminal_state = trajectory.terminal_state().copied().unwrap_or(initial);
        let summary = trajectory.summary(self.horizon.step_s, self.params.crop.dry_matter_content);
        info!(
            steps = summary.steps,
            heating_mj = summary.heating_mj,
            lamp_mj = summary.lamp_mj,
            fresh_yield_kg = summary.fresh_yield_kg,
            clamp_events = summary.clamp_events,
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "greenhouse run finished"
        );

        Ok(RunOutput {
            run_id,
            started_at,
            horizon: self.horizon,
            trajectory,
            terminal_state,
        })
    }
}

/// Runs independent scenarios in parallel, returning results in input order.
pub fn run_batch(simulations: Vec<Simulation>) -> Vec<Result<RunOutput, RunFailure>> {
    simulations.into_par_iter().map(Simulation::run).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollaboratorError, ConfigurationError};
    use crate::sim::greenhouse::control::ActuatorPosition;
    use crate::sim::greenhouse::envelope::{EnvelopeBoundary, EnvelopeFluxes};
    use crate::sim::greenhouse::weather::{ArtificialWeather, WeatherSample};

    fn short_run() -> Simulation {
        let params = Arc::new(ParameterSet::new());
        let horizon = Horizon::new(100.0 * 86400.0, 1800.0, 300.0);
        Simulation::new(params, horizon, Arc::new(ArtificialWeather))
    }

    #[test]
    fn test_run_records_every_step() {
        let out = short_run().run().unwrap();
        assert_eq!(out.trajectory.len(), 6);
        assert_eq!(out.trajectory.terminal_state(), Some(&out.terminal_state));
        assert_eq!(out.trajectory.steps()[1].time_s, 100.0 * 86400.0 + 300.0);
    }

    #[test]
    fn test_invalid_horizon_fails_before_stepping() {
        let params = Arc::new(ParameterSet::new());
        let horizon = Horizon::new(0.0, 1000.0, 300.0);
        let err = Simulation::new(params, horizon, Arc::new(ArtificialWeather))
            .run()
            .unwrap_err();
        assert!(err.step_index.is_none());
        assert!(matches!(
            err.error,
            SimulationError::Configuration(ConfigurationError::Horizon(_))
        ));
        assert!(err.partial.is_empty());
    }

    #[test]
    fn test_envelope_failure_returns_partial_trajectory() {
        let mut calls = 0;
        let flaky = move |_: &EnvelopeBoundary| -> Result<EnvelopeFluxes, CollaboratorError> {
            calls += 1;
            if calls > 2 {
                Err(CollaboratorError::new("energyplus", "lost connection"))
            } else {
                Ok(EnvelopeFluxes::default())
            }
        };
        let err = short_run().with_envelope(Box::new(flaky)).run().unwrap_err();
        assert_eq!(err.step_index, Some(2));
        assert_eq!(err.partial.len(), 2);
        assert!(matches!(err.error, SimulationError::Collaborator(_)));
    }

    #[test]
    fn test_non_finite_policy_output_names_the_term() {
        let nan = |_: &State, _: &ParameterSet, _: &WeatherSample| ActuatorPosition {
            boil: f64::NAN,
            ..ActuatorPosition::default()
        };
        let err = short_run().with_policy(Arc::new(nan)).run().unwrap_err();
        assert_eq!(err.step_index, Some(0));
        match err.error {
            SimulationError::Computation(e) => assert_eq!(e.term, "actuators.boil"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let a = short_run();
        let b = short_run().with_initial_state({
            let mut s = State::cold_start(&ParameterSet::new(), &WeatherSample::default());
            s.t_air = 25.0;
            s
        });
        let results = run_batch(vec![a, b]);
        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert!(second.trajectory.initial_state().unwrap().t_air == 25.0);
    }
}
