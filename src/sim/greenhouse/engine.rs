//! Advances the greenhouse over one recording step.
//!
//! A recording step is split into equal sub-steps no longer than the
//! stability bound of the explicit integrator. Actuators and weather are held
//! for the whole recording step; the full [`FluxSet`] is re-evaluated on every
//! sub-step.

use std::sync::Arc;

use serde::Serialize;

use super::control::ActuatorPosition;
use super::envelope::EnvelopeFluxes;
use super::flux::{FluxModel, FluxSet};
use super::horizon::Horizon;
use super::integrator::{self, ClampFlag};
use super::params::ParameterSet;
use super::record::named_record;
use super::state::State;
use super::weather::WeatherSample;
use crate::error::{ComputationError, ConfigurationError};

named_record! {
    /// Quantities accumulated over one recording step, per m^2 floor.
    #[derive(Default)]
    pub struct StepTotals {
        /// Boiler heat delivered to the pipes in J.
        heating_j,
        /// Electrical lamp input in J.
        lamp_j,
        /// CO2 injected in mg.
        co2_injected_mg,
        /// CO2 lost by ventilation and leakage in mg.
        co2_vented_mg,
        /// Net CO2 taken up by the canopy in mg.
        co2_assimilated_mg,
        /// Fruit dry matter harvested in mg CH2O.
        harvest_dry_mg,
        /// Net heat entering all heat nodes in J.
        external_heat_j,
    }
}

impl StepTotals {
    fn accumulate(&mut self, flux: &FluxSet, dt_s: f64) {
        let co2 = &flux.co2;
        self.heating_j += dt_s * flux.heat.h_boil_pipe;
        self.lamp_j += dt_s * flux.heat.q_lamp_in;
        self.co2_injected_mg += dt_s * co2.mc_ext_air;
        self.co2_vented_mg += dt_s * (co2.mc_air_out + co2.mc_top_out);
        self.co2_assimilated_mg += dt_s * co2.mc_air_can;
        self.harvest_dry_mg += dt_s * flux.crop.mc_fruit_har;
        self.external_heat_j += dt_s * flux.external_heat_input();
    }

    /// Field-wise sum.
    pub fn add(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }
}

/// Result of advancing one recording step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub state: State,
    /// Fluxes at the start of the step.
    pub flux: FluxSet,
    pub totals: StepTotals,
    /// Components clamped during the step, most extreme value per component.
    pub clamps: Vec<ClampFlag>,
    pub substeps: usize,
}

/// Sub-stepping explicit integrator bound to one parameter set.
#[derive(Debug, Clone)]
pub struct ClimateEngine {
    model: FluxModel,
    max_substep_s: f64,
}

impl ClimateEngine {
    /// Validates parameters and horizon and fixes the sub-step bound.
    ///
    /// A horizon that asks for a sub-step above the stability bound is
    /// rejected.
    pub fn new(params: Arc<ParameterSet>, horizon: &Horizon) -> Result<Self, ConfigurationError> {
        params.validate()?;
        horizon.validate()?;
        let bound = integrator::stable_step_s(&params);
        let max_substep_s = match horizon.max_substep_s {
            Some(requested) if requested > bound => {
                return Err(ConfigurationError::Horizon(format!(
                    "max_substep_s = {requested} exceeds the stability bound {bound:.4} s"
                )));
            }
            Some(requested) => requested,
            None => bound,
        };
        Ok(Self {
            model: FluxModel::new(params),
            max_substep_s,
        })
    }

    pub fn params(&self) -> &ParameterSet {
        self.model.params()
    }

    pub fn model(&self) -> &FluxModel {
        &self.model
    }

    pub fn max_substep_s(&self) -> f64 {
        self.max_substep_s
    }

    /// Number of sub-steps used for a recording step of `step_s` seconds.
    pub fn substeps(&self, step_s: f64) -> usize {
        ((step_s / self.max_substep_s).ceil() as usize).max(1)
    }

    /// Advances `state` by `step_s` seconds.
    ///
    /// `envelope` replaces the cover exchange terms on every sub-step.
    pub fn advance(
        &self,
        state: &State,
        actuators: &ActuatorPosition,
        weather: &WeatherSample,
        envelope: Option<&EnvelopeFluxes>,
        step_s: f64,
    ) -> Result<StepOutcome, ComputationError> {
        let n = self.substeps(step_s);
        let dt = step_s / n as f64;
        let params = self.model.params();
        let derived = self.model.derived();

        let mut x = *state;
        let mut first = None;
        let mut totals = StepTotals::default();
        let mut clamps: Vec<ClampFlag> = Vec::new();

        for _ in 0..n {
            let mut flux = self.model.compute(&x, actuators, weather)?;
            if let Some(e) = envelope {
                e.apply(&mut flux);
            }
            let caps = integrator::capacities(params, derived, &x);
            let (next, flags) = integrator::advance(&x, &flux, &caps, dt);
            if let Some((name, value)) = next.first_non_finite() {
                return Err(ComputationError::new(format!("state.{name}"), value));
            }
            totals.accumulate(&flux, dt);
            merge_clamps(&mut clamps, flags);
            first.get_or_insert(flux);
            x = next;
        }

        Ok(StepOutcome {
            state: x,
            flux: first.unwrap_or_default(),
            totals,
            clamps,
            substeps: n,
        })
    }
}

fn merge_clamps(acc: &mut Vec<ClampFlag>, flags: Vec<ClampFlag>) {
    for flag in flags {
        match acc.iter_mut().find(|f| f.component == flag.component) {
            Some(existing) if flag.value < existing.value => *existing = flag,
            Some(_) => {}
            None => acc.push(flag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::integrator::{capacities, stored_co2, stored_heat};
    use crate::sim::greenhouse::params::LampType;
    use approx::assert_relative_eq;

    fn weather() -> WeatherSample {
        WeatherSample {
            time_s: 40.0 * 86400.0 + 12.0 * 3600.0,
            i_glob: 300.0,
            t_out: 6.0,
            vp_out: 700.0,
            co2_out: 740.0,
            wind: 3.0,
            t_sky: -8.0,
            t_so_out: 9.0,
            day_rad_sum: 8.0,
            is_day: 1.0,
            is_day_smooth: 1.0,
        }
    }

    fn engine(params: ParameterSet) -> ClimateEngine {
        ClimateEngine::new(Arc::new(params), &Horizon::from_days(40.0, 1.0, 60.0)).unwrap()
    }

    #[test]
    fn test_substep_bound_from_horizon() {
        let p = Arc::new(ParameterSet::new());
        let bound = integrator::stable_step_s(&p);
        let e = ClimateEngine::new(p.clone(), &Horizon::from_days(1.0, 1.0, 60.0)).unwrap();
        assert_relative_eq!(e.max_substep_s(), bound);
        assert_eq!(e.substeps(60.0), (60.0 / bound).ceil() as usize);

        let tighter = Horizon::from_days(1.0, 1.0, 60.0).with_max_substep(0.5 * bound);
        let e = ClimateEngine::new(p.clone(), &tighter).unwrap();
        assert_relative_eq!(e.max_substep_s(), 0.5 * bound);

        let too_long = Horizon::from_days(1.0, 1.0, 60.0).with_max_substep(2.0 * bound);
        assert!(matches!(
            ClimateEngine::new(p, &too_long),
            Err(ConfigurationError::Horizon(_))
        ));
    }

    #[test]
    fn test_step_conserves_energy_and_co2() {
        let p = ParameterSet::new().with_lamps(LampType::Hps);
        let e = engine(p.clone());
        let mut state = State::mature(&p, &weather());
        state.c_buf = 5e3;
        let u = ActuatorPosition {
            roof: 0.2,
            th_scr: 0.0,
            boil: 0.5,
            lamp: 1.0,
            ext_co2: 1.0,
        };
        let out = e.advance(&state, &u, &weather(), None, 60.0).unwrap();
        assert!(out.clamps.is_empty());
        assert_eq!(out.substeps, e.substeps(60.0));

        let caps = capacities(&p, e.model().derived(), &state);
        let heat = stored_heat(&caps, &out.state) - stored_heat(&caps, &state);
        assert_relative_eq!(heat, out.totals.external_heat_j, max_relative = 1e-4, epsilon = 1.0);

        let co2 = stored_co2(&caps, &out.state) - stored_co2(&caps, &state);
        let expected =
            out.totals.co2_injected_mg - out.totals.co2_vented_mg - out.totals.co2_assimilated_mg;
        assert_relative_eq!(co2, expected, max_relative = 1e-9, epsilon = 1e-6);

        assert_relative_eq!(
            out.totals.heating_j,
            60.0 * 0.5 * p.heating.boiler_capacity,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            out.totals.lamp_j,
            60.0 * p.lamps.max_intensity,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_envelope_values_are_used() {
        let p = ParameterSet::new();
        let e = engine(p.clone());
        let state = State::mature(&p, &weather());
        let u = ActuatorPosition::default();
        let envelope = EnvelopeFluxes {
            h_cov_e_out: Some(0.0),
            r_cov_e_sky: Some(0.0),
            ..EnvelopeFluxes::default()
        };
        let free = e.advance(&state, &u, &weather(), None, 60.0).unwrap();
        let insulated = e.advance(&state, &u, &weather(), Some(&envelope), 60.0).unwrap();
        assert_eq!(insulated.flux.heat.h_cov_e_out, 0.0);
        assert_eq!(insulated.flux.radiation.r_cov_e_sky, 0.0);
        assert!(insulated.state.t_cov_e > free.state.t_cov_e);
    }

    #[test]
    fn test_non_finite_weather_names_the_term() {
        let p = ParameterSet::new();
        let e = engine(p.clone());
        let state = State::mature(&p, &weather());
        let w = WeatherSample {
            t_out: f64::NAN,
            ..weather()
        };
        let err = e
            .advance(&state, &ActuatorPosition::default(), &w, None, 60.0)
            .unwrap_err();
        assert_eq!(err.term, "weather.t_out");
    }

    #[test]
    fn test_merge_clamps_keeps_most_extreme() {
        use crate::sim::greenhouse::integrator::ClampKind;
        let flag = |component, value| ClampFlag {
            component,
            value,
            kind: ClampKind::Negative,
        };
        let mut acc = Vec::new();
        merge_clamps(&mut acc, vec![flag("c_buf", -1.0)]);
        merge_clamps(&mut acc, vec![flag("c_buf", -3.0), flag("vp_air", -0.5)]);
        merge_clamps(&mut acc, vec![flag("c_buf", -2.0)]);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc[0].value, -3.0);
        assert_eq!(acc[1].component, "vp_air");
    }

    #[test]
    fn test_totals_add() {
        let a = StepTotals {
            heating_j: 1.0,
            lamp_j: 2.0,
            ..StepTotals::default()
        };
        let b = a.add(&a);
        assert_eq!(b.heating_j, 2.0);
        assert_eq!(b.lamp_j, 4.0);
        assert_eq!(b.co2_vented_mg, 0.0);
    }
}
