//! Pipeline stages of a greenhouse run.
//!
//! Per step the stages run in order weather → control → envelope → climate,
//! followed by the [`super::recorder::RecorderModule`]. The current [`State`]
//! lives on the Bus and is replaced by the climate stage.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::sim::coupling::{EnvelopeExchange, StepIndex};
use crate::sim::framework::{Bus, SimContext, SimModule};

use super::control::{ActuatorPosition, ControlPolicy};
use super::engine::ClimateEngine;
use super::envelope::{EnvelopeBoundary, EnvelopeCollaborator};
use super::state::State;
use super::weather::{WeatherSample, WeatherSeries};

/// Publishes the pre-materialized weather sample and index of each step.
pub struct WeatherModule {
    series: Arc<WeatherSeries>,
    index: usize,
}

impl WeatherModule {
    pub fn new(series: Arc<WeatherSeries>) -> Self {
        Self { series, index: 0 }
    }

    fn publish(&self, bus: &mut Bus, index: usize) -> Result<()> {
        let Some(sample) = self.series.get(index) else {
            anyhow::bail!(
                "WeatherModule: step {index} out of range (len={})",
                self.series.len()
            );
        };
        bus.put(StepIndex(index));
        bus.put(*sample);
        Ok(())
    }
}

impl SimModule for WeatherModule {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn init(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        anyhow::ensure!(
            self.series.len() >= ctx.horizon.num_steps(),
            "WeatherModule: {} samples for a horizon of {} steps",
            self.series.len(),
            ctx.horizon.num_steps()
        );
        bus.put(self.series.clone());
        Ok(())
    }

    fn step(&mut self, _ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        self.publish(bus, self.index)?;
        self.index += 1;
        Ok(())
    }
}

/// Asks the control policy for this step's actuator positions.
pub struct ControlModule {
    policy: Arc<dyn ControlPolicy>,
}

impl ControlModule {
    pub fn new(policy: Arc<dyn ControlPolicy>) -> Self {
        Self { policy }
    }
}

impl SimModule for ControlModule {
    fn name(&self) -> &'static str {
        "control"
    }

    fn step(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let state = bus.read::<State>()?;
        let weather = bus.read::<WeatherSample>()?;
        let u = self.policy.actuate(&state, ctx.params, &weather).clamped();
        bus.put(u);
        Ok(())
    }
}

/// Exchanges boundary conditions with an external envelope solver.
pub struct EnvelopeModule {
    collaborator: Box<dyn EnvelopeCollaborator>,
}

impl EnvelopeModule {
    pub fn new(collaborator: Box<dyn EnvelopeCollaborator>) -> Self {
        Self { collaborator }
    }
}

impl SimModule for EnvelopeModule {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn step(&mut self, _ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let state = bus.read::<State>()?;
        let weather = bus.read::<WeatherSample>()?;
        let boundary = EnvelopeBoundary::new(&state, &weather);
        let fluxes = self.collaborator.exchange(&boundary)?;
        fluxes.validate(self.collaborator.name())?;
        if fluxes.is_empty() {
            warn!(
                collaborator = self.collaborator.name(),
                time_s = boundary.time_s,
                "envelope returned no values; keeping internal cover fluxes"
            );
        }
        bus.put(EnvelopeExchange { boundary, fluxes });
        Ok(())
    }
}

/// Advances the greenhouse state by one control step.
pub struct ClimateModule {
    engine: ClimateEngine,
}

impl ClimateModule {
    pub fn new(engine: ClimateEngine) -> Self {
        Self { engine }
    }
}

impl SimModule for ClimateModule {
    fn name(&self) -> &'static str {
        "climate"
    }

    fn init(&mut self, _ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let Some(state) = bus.get::<State>() else {
            anyhow::bail!("ClimateModule: initial State not found on Bus");
        };
        state.ensure_finite()?;
        Ok(())
    }

    fn step(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let state = bus.read::<State>()?;
        let weather = bus.read::<WeatherSample>()?;
        let actuators = bus.read::<ActuatorPosition>()?;
        let envelope = bus.take::<EnvelopeExchange>().map(|e| e.fluxes);

        let outcome = self
            .engine
            .advance(&state, &actuators, &weather, envelope.as_ref(), ctx.horizon.step_s)
            .with_context(|| format!("climate step at t = {} s", weather.time_s))?;

        for clamp in &outcome.clamps {
            warn!(
                component = clamp.component,
                value = clamp.value,
                kind = ?clamp.kind,
                time_s = weather.time_s,
                "clamped non-physical value"
            );
        }
        bus.put(outcome.state);
        bus.put(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollaboratorError, ComputationError};
    use crate::sim::greenhouse::control::RuleBasedPolicy;
    use crate::sim::greenhouse::engine::StepOutcome;
    use crate::sim::greenhouse::envelope::EnvelopeFluxes;
    use crate::sim::greenhouse::horizon::Horizon;
    use crate::sim::greenhouse::params::ParameterSet;
    use crate::sim::greenhouse::weather::ArtificialWeather;

    fn setup(steps: usize) -> (Arc<ParameterSet>, Horizon, Arc<WeatherSeries>) {
        let params = Arc::new(ParameterSet::new());
        let horizon = Horizon::new(100.0 * 86400.0, 60.0 * steps as f64, 60.0);
        let series = WeatherSeries::materialize(&ArtificialWeather, &horizon).unwrap();
        (params, horizon, Arc::new(series))
    }

    #[test]
    fn test_weather_module_publishes_sample_and_index() -> Result<()> {
        let (params, horizon, series) = setup(2);
        let ctx = SimContext::new(&params, &horizon);
        let mut bus = Bus::new();
        let mut m = WeatherModule::new(series.clone());
        m.init(&ctx, &mut bus)?;
        assert!(bus.get::<Arc<WeatherSeries>>().is_some());

        m.step(&ctx, &mut bus)?;
        assert_eq!(bus.get::<StepIndex>(), Some(&StepIndex(0)));
        m.step(&ctx, &mut bus)?;
        assert_eq!(bus.get::<StepIndex>(), Some(&StepIndex(1)));
        assert_eq!(bus.get::<WeatherSample>().map(|w| w.time_s), Some(horizon.time_at(1)));
        assert!(m.step(&ctx, &mut bus).is_err());
        Ok(())
    }

    #[test]
    fn test_control_module_publishes_clamped_actuators() -> Result<()> {
        let (params, horizon, series) = setup(1);
        let ctx = SimContext::new(&params, &horizon);
        let mut bus = Bus::new();
        let w = series.samples[0];
        bus.put(State::cold_start(&params, &w));
        bus.put(w);
        let wild = |_: &State, _: &ParameterSet, _: &WeatherSample| ActuatorPosition {
            roof: 3.0,
            boil: -1.0,
            ..ActuatorPosition::default()
        };
        ControlModule::new(Arc::new(wild)).step(&ctx, &mut bus)?;
        let u = bus.get::<ActuatorPosition>().copied().unwrap();
        assert_eq!(u.roof, 1.0);
        assert_eq!(u.boil, 0.0);

        ControlModule::new(Arc::new(RuleBasedPolicy::new())).step(&ctx, &mut bus)?;
        assert!(bus.get::<ActuatorPosition>().is_some());
        Ok(())
    }

    #[test]
    fn test_envelope_failure_is_a_collaborator_error() {
        let (params, horizon, series) = setup(1);
        let ctx = SimContext::new(&params, &horizon);
        let mut bus = Bus::new();
        let w = series.samples[0];
        bus.put(State::cold_start(&params, &w));
        bus.put(w);

        let failing = |_: &EnvelopeBoundary| -> Result<EnvelopeFluxes, CollaboratorError> {
            Err(CollaboratorError::new("energyplus", "socket closed"))
        };
        let err = EnvelopeModule::new(Box::new(failing))
            .step(&ctx, &mut bus)
            .unwrap_err();
        assert!(err.downcast_ref::<CollaboratorError>().is_some());

        let bad = |_: &EnvelopeBoundary| -> Result<EnvelopeFluxes, CollaboratorError> {
            Ok(EnvelopeFluxes {
                h_cov_e_out: Some(f64::INFINITY),
                ..EnvelopeFluxes::default()
            })
        };
        let err = EnvelopeModule::new(Box::new(bad))
            .step(&ctx, &mut bus)
            .unwrap_err();
        assert!(err.downcast_ref::<CollaboratorError>().is_some());
        assert!(bus.get::<EnvelopeExchange>().is_none());
    }

    #[test]
    fn test_climate_module_replaces_state() -> Result<()> {
        let (params, horizon, series) = setup(1);
        let ctx = SimContext::new(&params, &horizon);
        let engine = ClimateEngine::new(params.clone(), &horizon)?;
        let mut bus = Bus::new();
        let w = series.samples[0];
        let initial = State::cold_start(&params, &w);
        bus.put(initial);
        bus.put(w);
        bus.put(ActuatorPosition {
            boil: 1.0,
            ..ActuatorPosition::default()
        });
        let mut m = ClimateModule::new(engine);
        m.init(&ctx, &mut bus)?;
        m.step(&ctx, &mut bus)?;
        let next = bus.get::<State>().copied().unwrap();
        assert!(next.t_pipe > initial.t_pipe);
        assert!(bus.get::<StepOutcome>().is_some());
        Ok(())
    }

    #[test]
    fn test_climate_error_keeps_its_type() {
        let (params, horizon, series) = setup(1);
        let ctx = SimContext::new(&params, &horizon);
        let engine = ClimateEngine::new(params.clone(), &horizon).unwrap();
        let mut bus = Bus::new();
        let w = series.samples[0];
        bus.put(State::cold_start(&params, &w));
        let mut bad = w;
        bad.wind = f64::NAN;
        bus.put(bad);
        bus.put(ActuatorPosition::default());
        let err = ClimateModule::new(engine).step(&ctx, &mut bus).unwrap_err();
        let e = err.downcast_ref::<ComputationError>().unwrap();
        assert_eq!(e.term, "weather.wind");
    }

    #[test]
    fn test_non_finite_initial_state_is_rejected() {
        let (params, horizon, _) = setup(1);
        let ctx = SimContext::new(&params, &horizon);
        let engine = ClimateEngine::new(params.clone(), &horizon).unwrap();
        let mut bus = Bus::new();
        let mut s = State::cold_start(&params, &WeatherSample::default());
        s.t_flr = f64::NAN;
        bus.put(s);
        let err = ClimateModule::new(engine).init(&ctx, &mut bus).unwrap_err();
        assert!(err.downcast_ref::<crate::error::ConfigurationError>().is_some());
    }
}
